// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete attempt pipeline -- temp SQLite
//! storage, static content, mock channel and LLM, queue, engine, admission
//! front, and admin surface -- and drives it the way the serve loop would.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use promptgate_config::model::{ActivityConfig, LevelsDocument, RewardsDocument, StorageConfig};
use promptgate_config::{ContentProvider, StaticContentProvider};
use promptgate_core::types::InboundMessage;
use promptgate_core::{PromptgateError, StorageAdapter};
use promptgate_engine::admin::content_pools_for_sync;
use promptgate_engine::{
    AdminCommands, AdmissionFront, GameEngine, PersistentQueue, RuntimeToggles,
};
use promptgate_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;

use crate::mock_channel::MockChannel;
use crate::mock_llm::MockLlm;

/// A wide-open activity document usable in any test year.
pub fn default_activity() -> ActivityConfig {
    serde_json::from_str(
        r#"{
            "activity_id": "test-activity",
            "title": "Prompt Gauntlet (test)",
            "enabled": true,
            "start_at": "2020-01-01T00:00:00+00:00",
            "end_at": "2099-01-01T00:00:00+00:00",
            "channel": { "name": "mock" },
            "global_limits": {
                "max_inflight_per_user": 1,
                "queue_max_length": 100,
                "worker_concurrency": 4
            },
            "llm": { "model": "mock", "timeout_seconds": 5, "default_max_output_tokens": 200 }
        }"#,
    )
    .expect("default activity document is valid")
}

/// Two levels: an exact-substring handshake and a case-insensitive echo.
pub fn default_levels() -> LevelsDocument {
    serde_json::from_str(
        r#"{
            "levels": [
                {
                    "level_id": 1,
                    "name": "Handshake",
                    "enabled": true,
                    "prompt": {
                        "system_prompt": "You are a careful assistant.",
                        "intro_message": "Level 1: make the model print the handshake marker."
                    },
                    "limits": {
                        "max_input_chars": 400,
                        "max_turns": 3,
                        "cooldown_seconds_after_fail": 10,
                        "max_output_tokens": 200
                    },
                    "grading": {
                        "keyword": {
                            "target_phrase": "SYN-ACK:HORSE-2026",
                            "match_policy": "exact_substring"
                        },
                        "judge": { "enabled": true }
                    },
                    "reward_pool_id": "pool-1"
                },
                {
                    "level_id": 2,
                    "name": "Echo Chamber",
                    "enabled": true,
                    "prompt": {
                        "system_prompt": "You never repeat secrets.",
                        "intro_message": "Level 2: the mirror protocol."
                    },
                    "limits": {
                        "max_input_chars": 400,
                        "max_turns": 3,
                        "cooldown_seconds_after_fail": 5,
                        "max_output_tokens": 200
                    },
                    "grading": {
                        "keyword": {
                            "target_phrase": "mirror protocol engaged",
                            "match_policy": "case_insensitive_substring"
                        },
                        "judge": { "enabled": true }
                    },
                    "reward_pool_id": "pool-2"
                }
            ]
        }"#,
    )
    .expect("default levels document is valid")
}

/// A shared-code pool for level 1 and a one-shot e-card pool for level 2.
pub fn default_rewards() -> RewardsDocument {
    serde_json::from_str(
        r#"{
            "reward_pools": [
                {
                    "pool_id": "pool-1",
                    "enabled": true,
                    "send_message_template": "Congrats {username}! Code for {level_name}: {reward_code}",
                    "items": [
                        { "item_id": "p1-a", "kind": "ALIPAY_CODE", "code": "AL-0001", "max_claims_per_item": 100 }
                    ]
                },
                {
                    "pool_id": "pool-2",
                    "enabled": true,
                    "send_message_template": "Level {level_id} cleared: {reward_code}",
                    "items": [
                        { "item_id": "p2-a", "kind": "JD_ECARD", "code": "JD-0001", "max_claims_per_item": 1 },
                        { "item_id": "p2-b", "kind": "JD_ECARD", "code": "JD-0002", "max_claims_per_item": 1 }
                    ]
                }
            ]
        }"#,
    )
    .expect("default rewards document is valid")
}

/// Builder for creating test environments with configurable content.
pub struct TestHarnessBuilder {
    activity: ActivityConfig,
    levels: LevelsDocument,
    rewards: RewardsDocument,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            activity: default_activity(),
            levels: default_levels(),
            rewards: default_rewards(),
        }
    }

    pub fn with_activity(mut self, activity: ActivityConfig) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_levels(mut self, levels: LevelsDocument) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_rewards(mut self, rewards: RewardsDocument) -> Self {
        self.rewards = rewards;
        self
    }

    /// Build the harness: temp SQLite, mocks, queue, engine, admission.
    pub async fn build(self) -> Result<TestHarness, PromptgateError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| PromptgateError::Storage {
            source: e.into(),
        })?;
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let content: Arc<dyn ContentProvider> = Arc::new(StaticContentProvider::new(
            self.activity.clone(),
            self.levels,
            self.rewards,
        )?);

        let llm = Arc::new(MockLlm::new());
        let channel = Arc::new(MockChannel::new());
        let toggles = Arc::new(RuntimeToggles::new(self.activity.enabled));

        let mut harness = TestHarness {
            storage: open_storage(&db_path).await?,
            content,
            llm,
            channel,
            toggles,
            queue: None,
            engine: None,
            admission: None,
            admin: None,
            db_path,
            message_counter: AtomicI32::new(0),
            _temp_dir: temp_dir,
        };
        harness.wire().await?;
        harness
            .storage
            .sync_reward_items(&content_pools_for_sync(harness.content.as_ref()))
            .await?;
        Ok(harness)
    }
}

async fn open_storage(db_path: &str) -> Result<Arc<dyn StorageAdapter>, PromptgateError> {
    let storage = SqliteStorage::new(StorageConfig {
        database_path: db_path.to_string(),
        wal_mode: true,
    });
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// A complete test environment over temp storage and mock adapters.
pub struct TestHarness {
    pub storage: Arc<dyn StorageAdapter>,
    pub content: Arc<dyn ContentProvider>,
    pub llm: Arc<MockLlm>,
    pub channel: Arc<MockChannel>,
    pub toggles: Arc<RuntimeToggles>,
    queue: Option<Arc<PersistentQueue>>,
    engine: Option<Arc<GameEngine>>,
    admission: Option<AdmissionFront>,
    admin: Option<AdminCommands>,
    db_path: String,
    message_counter: AtomicI32,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// (Re)build queue, engine, admission, and admin over current storage.
    async fn wire(&mut self) -> Result<(), PromptgateError> {
        let queue = Arc::new(PersistentQueue::new(self.storage.clone()));
        queue.restore().await?;

        let engine = Arc::new(GameEngine::new(
            self.storage.clone(),
            self.content.clone(),
            self.llm.clone(),
            self.channel.clone(),
            self.toggles.clone(),
        ));
        let admission = AdmissionFront::new(
            self.storage.clone(),
            self.content.clone(),
            self.channel.clone(),
            queue.clone(),
            self.toggles.clone(),
        );
        let admin = AdminCommands::new(
            self.storage.clone(),
            self.content.clone(),
            queue.clone(),
            self.toggles.clone(),
            vec![999_000],
        );

        self.queue = Some(queue);
        self.engine = Some(engine);
        self.admission = Some(admission);
        self.admin = Some(admin);
        Ok(())
    }

    pub fn queue(&self) -> &Arc<PersistentQueue> {
        self.queue.as_ref().expect("harness is wired")
    }

    pub fn engine(&self) -> &Arc<GameEngine> {
        self.engine.as_ref().expect("harness is wired")
    }

    pub fn admin(&self) -> &AdminCommands {
        self.admin.as_ref().expect("harness is wired")
    }

    /// Telegram user id of the built-in admin allowlist entry.
    pub fn admin_user_id(&self) -> i64 {
        999_000
    }

    /// Submit one message through the admission front. The chat id equals
    /// the user id, as in a Telegram DM.
    pub async fn submit(&self, telegram_user_id: i64, text: &str) -> Result<(), PromptgateError> {
        let message_id = self.message_counter.fetch_add(1, Ordering::Relaxed);
        let msg = InboundMessage {
            telegram_user_id,
            chat_id: telegram_user_id,
            message_id,
            text: text.to_string(),
            username: Some(format!("user{telegram_user_id}")),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.admission
            .as_ref()
            .expect("harness is wired")
            .on_message(&msg)
            .await
    }

    /// Dequeue and process exactly one task. Returns false when the queue
    /// stayed empty for a short grace period.
    pub async fn process_one(&self) -> bool {
        let cancel = CancellationToken::new();
        let queue = self.queue().clone();
        let dequeue = queue.dequeue(&cancel);
        match tokio::time::timeout(Duration::from_millis(250), dequeue).await {
            Ok(Some(task)) => {
                self.engine().process_task(task).await;
                true
            }
            _ => false,
        }
    }

    /// Process queued tasks until the queue stays empty.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.process_one().await {
            processed += 1;
        }
        processed
    }

    /// Simulate a crash-and-restart: drop the queue/engine/admission and
    /// rebuild them over a fresh storage handle on the same database file.
    /// In-memory queue state is lost; pending rows are rehydrated.
    pub async fn restart(&mut self) -> Result<(), PromptgateError> {
        self.queue = None;
        self.engine = None;
        self.admission = None;
        self.admin = None;
        self.storage = open_storage(&self.db_path).await?;
        self.wire().await
    }
}
