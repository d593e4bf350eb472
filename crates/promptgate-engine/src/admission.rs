// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission front: receives inbound messages, enforces input limits and
//! the inflight lock, and enqueues attempt tasks.
//!
//! Per-user serialization happens here: the "check state, flip INFLIGHT,
//! enqueue" sequence runs under a per-user mutex, and the storage-side
//! compare-and-set backs it up against channel-level races. Workers never
//! take these locks.

use std::sync::Arc;

use chrono::Utc;
use promptgate_config::ContentProvider;
use promptgate_core::types::{
    AdmitOutcome, AdmitRequest, EventType, InboundMessage, NewLogEvent, Session, SessionState,
    TaskPayload, User,
};
use promptgate_core::{ChannelAdapter, PromptgateError, StorageAdapter};
use tracing::{debug, info};

use crate::messages;
use crate::policies::{ban, cooldown, input, turns, window};
use crate::queue::PersistentQueue;
use crate::toggles::RuntimeToggles;
use crate::user_locks::UserLockMap;

/// The admission front for one channel.
pub struct AdmissionFront {
    storage: Arc<dyn StorageAdapter>,
    content: Arc<dyn ContentProvider>,
    channel: Arc<dyn ChannelAdapter>,
    queue: Arc<PersistentQueue>,
    toggles: Arc<RuntimeToggles>,
    locks: UserLockMap,
}

impl AdmissionFront {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        content: Arc<dyn ContentProvider>,
        channel: Arc<dyn ChannelAdapter>,
        queue: Arc<PersistentQueue>,
        toggles: Arc<RuntimeToggles>,
    ) -> Self {
        Self {
            storage,
            content,
            channel,
            queue,
            toggles,
            locks: UserLockMap::new(),
        }
    }

    /// Entry point for every inbound message on the channel.
    pub async fn on_message(&self, msg: &InboundMessage) -> Result<(), PromptgateError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        debug!(
            trace_id = trace_id.as_str(),
            user = msg.telegram_user_id,
            "inbound message"
        );

        match msg.text.trim() {
            "/start" => self.handle_start(msg, &trace_id).await,
            "/status" => self.handle_status(msg, &trace_id).await,
            "/rules" => self.handle_rules(msg, &trace_id).await,
            "/help" => self.handle_help(msg, &trace_id).await,
            text if text.starts_with('/') => {
                self.reply(msg, "Unknown command. Send /help for the command list.", &trace_id)
                    .await
            }
            _ => self.handle_attempt(msg, &trace_id).await,
        }
    }

    /// An answer submission: the admission checks of the state machine.
    async fn handle_attempt(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        let user = self
            .storage
            .get_or_create_user(msg.telegram_user_id, msg.username.as_deref())
            .await?;

        if let Err(notice) = ban::check(&user) {
            return self.reply(msg, &notice, trace_id).await;
        }
        if let Some(notice) = self.activity_closed_notice() {
            return self.reply(msg, &notice, trace_id).await;
        }

        let levels = self.content.levels();
        let total_levels = levels.len() as i64;
        let current_level = self
            .storage
            .get_current_level(user.id, total_levels)
            .await?;
        if current_level > total_levels {
            return self.reply(msg, messages::all_levels_passed(), trace_id).await;
        }

        let Some(level) = self.content.level(current_level) else {
            return self.reply(msg, messages::level_unavailable(), trace_id).await;
        };
        if !level.enabled {
            return self.reply(msg, messages::level_unavailable(), trace_id).await;
        }

        // Input errors are surfaced inline with no state change.
        let prompt = match input::validate(&msg.text, level.limits.max_input_chars) {
            Ok(prompt) => prompt,
            Err(reason) => return self.reply(msg, &reason, trace_id).await,
        };

        // Everything from the state check to the enqueue is serialized per
        // user; the admission transaction's compare-and-set is the backstop.
        let lock = self.locks.acquire(user.id);
        let guard = lock.lock().await;
        let result = self
            .admit_locked(msg, trace_id, &user, current_level, &level, prompt)
            .await;
        drop(guard);
        self.locks.release(user.id, lock);
        result
    }

    async fn admit_locked(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
        user: &User,
        current_level: i64,
        level: &promptgate_config::model::LevelConfig,
        prompt: String,
    ) -> Result<(), PromptgateError> {
        let mut session = match self.storage.get_session(user.id, current_level).await? {
            Some(session) => session,
            None => {
                // Lazily created on first contact with the level.
                self.storage
                    .upsert_session(&Session {
                        id: 0,
                        user_id: user.id,
                        level_id: current_level,
                        state: SessionState::Ready,
                        turn_count: 0,
                        inflight_task_id: None,
                        cooldown_until: None,
                        created_at: String::new(),
                        updated_at: String::new(),
                    })
                    .await?
            }
        };

        let now = Utc::now();
        match session.state {
            SessionState::Inflight => {
                return self.reply(msg, messages::still_processing(), trace_id).await;
            }
            SessionState::Passed => {
                return self.reply(msg, messages::already_passed(), trace_id).await;
            }
            SessionState::FailedOut => {
                return self.reply(msg, messages::failed_out(), trace_id).await;
            }
            SessionState::Cooldown => {
                if let Some(remaining) = cooldown::remaining(&session, now) {
                    return self
                        .reply(msg, &messages::cooldown_wait(remaining), trace_id)
                        .await;
                }
                // Cooldown expired: normalize to READY so the admission
                // compare-and-set can flip it.
                session.state = SessionState::Ready;
                session.cooldown_until = None;
                session = self.storage.upsert_session(&session).await?;
            }
            SessionState::Ready => {}
        }

        if turns::exhausted(&session, level.limits.max_turns) {
            session.state = SessionState::FailedOut;
            self.storage.upsert_session(&session).await?;
            return self.reply(msg, messages::failed_out(), trace_id).await;
        }

        let task = TaskPayload {
            task_id: trace_id.to_string(),
            user_id: user.id,
            telegram_user_id: msg.telegram_user_id,
            chat_id: msg.chat_id,
            message_id: msg.message_id,
            username: msg.username.clone(),
            level_id: current_level,
            session_id: session.id,
            user_prompt: prompt.clone(),
            // Fixed-width form so the durable queue's enqueued_at ordering
            // is stable under string comparison.
            enqueued_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };
        let request = AdmitRequest {
            task,
            queue_max_length: self.content.activity().global_limits.queue_max_length,
            event: NewLogEvent {
                trace_id: trace_id.to_string(),
                event_type: EventType::UserIn,
                telegram_user_id: msg.telegram_user_id,
                chat_id: msg.chat_id,
                level_id: Some(current_level),
                session_id: Some(session.id),
                turn_index: Some(session.turn_count),
                content: prompt,
                metadata: None,
            },
        };

        match self.queue.enqueue(request).await? {
            AdmitOutcome::Queued { depth } => {
                info!(
                    trace_id,
                    user_id = user.id,
                    level_id = current_level,
                    depth,
                    "attempt admitted"
                );
                self.reply(msg, &messages::queued(depth), trace_id).await
            }
            AdmitOutcome::AlreadyInflight => {
                self.reply(msg, messages::still_processing(), trace_id).await
            }
            AdmitOutcome::QueueFull => self.reply(msg, messages::queue_full(), trace_id).await,
        }
    }

    // --- Command handlers ---

    async fn handle_start(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        self.log_command(msg, trace_id, "/start").await?;
        if let Some(notice) = self.activity_closed_notice() {
            return self.reply(msg, &notice, trace_id).await;
        }

        let user = self
            .storage
            .get_or_create_user(msg.telegram_user_id, msg.username.as_deref())
            .await?;
        let activity = self.content.activity();
        let levels = self.content.levels();
        let current = self
            .storage
            .get_current_level(user.id, levels.len() as i64)
            .await?;

        let welcome = format!(
            "Welcome to {title}!\n\n\
             How it works:\n\
             - {count} levels, cleared in order\n\
             - each level: send a prompt, make the AI output the target\n\
             - a pass dispenses a reward automatically\n\n\
             Your progress: level {current}\n\
             /status shows details, /rules shows the current level.\n\n\
             Send any text to make your first attempt. Good luck!",
            title = activity.title,
            count = levels.len(),
        );
        self.reply(msg, &welcome, trace_id).await?;

        if let Some(level) = self.content.level(current) {
            self.reply(msg, &level.prompt.intro_message, trace_id).await?;
        }
        Ok(())
    }

    async fn handle_status(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        self.log_command(msg, trace_id, "/status").await?;
        if let Some(notice) = self.activity_closed_notice() {
            return self.reply(msg, &notice, trace_id).await;
        }

        let user = self
            .storage
            .get_or_create_user(msg.telegram_user_id, msg.username.as_deref())
            .await?;
        let levels = self.content.levels();
        let total = levels.len() as i64;
        let current = self.storage.get_current_level(user.id, total).await?;
        let progress = self.storage.get_user_progress(user.id).await?;
        let passed: std::collections::HashSet<i64> =
            progress.iter().map(|p| p.level_id).collect();

        let mut lines = vec!["Your progress:".to_string()];
        for level in &levels {
            let line = if passed.contains(&level.level_id) {
                format!("[done] Level {}: {}", level.level_id, level.name)
            } else if level.level_id == current {
                let session = self.storage.get_session(user.id, level.level_id).await?;
                let used = session.map(|s| s.turn_count).unwrap_or(0);
                format!(
                    "[now]  Level {}: {} ({used}/{} attempts used)",
                    level.level_id, level.name, level.limits.max_turns
                )
            } else {
                format!("[lock] Level {}: {}", level.level_id, level.name)
            };
            lines.push(line);
        }
        if current > total {
            lines.push("\nAll levels cleared -- congratulations!".to_string());
        } else {
            lines.push(format!("\nSend text to attempt level {current}."));
        }

        self.reply(msg, &lines.join("\n"), trace_id).await
    }

    async fn handle_rules(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        self.log_command(msg, trace_id, "/rules").await?;
        if let Some(notice) = self.activity_closed_notice() {
            return self.reply(msg, &notice, trace_id).await;
        }

        let user = self
            .storage
            .get_or_create_user(msg.telegram_user_id, msg.username.as_deref())
            .await?;
        let total = self.content.levels().len() as i64;
        let current = self.storage.get_current_level(user.id, total).await?;
        if current > total {
            return self.reply(msg, messages::all_levels_passed(), trace_id).await;
        }

        let Some(level) = self.content.level(current) else {
            return self.reply(msg, messages::level_unavailable(), trace_id).await;
        };
        let rules = format!(
            "Level {} rules\n\n{}\n\nLimits:\n- input: at most {} chars\n- attempts: {}\n- cooldown after a fail: {} s",
            level.level_id,
            level.prompt.intro_message,
            level.limits.max_input_chars,
            level.limits.max_turns,
            level.limits.cooldown_seconds_after_fail,
        );
        self.reply(msg, &rules, trace_id).await
    }

    async fn handle_help(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        self.log_command(msg, trace_id, "/help").await?;
        let help = "Goal: make the AI include the target phrase naturally in its reply.\n\n\
             Notes:\n\
             - the AI may refuse a blunt \"please say X\"; be creative\n\
             - a reply that mentions the phrase while refusing does not count\n\n\
             Commands:\n\
             /start - begin\n\
             /status - your progress\n\
             /rules - current level rules\n\
             /help - this text";
        self.reply(msg, help, trace_id).await
    }

    // --- Helpers ---

    /// The user-facing reason the activity is closed, if it is.
    fn activity_closed_notice(&self) -> Option<String> {
        if !self.toggles.activity_enabled() {
            return Some("the activity is currently disabled".to_string());
        }
        window::activity_active(&self.content.activity(), Utc::now()).err()
    }

    async fn log_command(
        &self,
        msg: &InboundMessage,
        trace_id: &str,
        command: &str,
    ) -> Result<(), PromptgateError> {
        self.storage
            .append_log_event(&NewLogEvent {
                trace_id: trace_id.to_string(),
                event_type: EventType::UserIn,
                telegram_user_id: msg.telegram_user_id,
                chat_id: msg.chat_id,
                level_id: None,
                session_id: None,
                turn_index: None,
                content: command.to_string(),
                metadata: None,
            })
            .await
    }

    /// Reply to the inbound message and record the SYSTEM_OUT event.
    async fn reply(
        &self,
        msg: &InboundMessage,
        text: &str,
        trace_id: &str,
    ) -> Result<(), PromptgateError> {
        self.channel
            .reply_to(msg.chat_id, msg.message_id, text)
            .await?;
        self.storage
            .append_log_event(&NewLogEvent {
                trace_id: trace_id.to_string(),
                event_type: EventType::SystemOut,
                telegram_user_id: msg.telegram_user_id,
                chat_id: msg.chat_id,
                level_id: None,
                session_id: None,
                turn_index: None,
                content: text.to_string(),
                metadata: None,
            })
            .await
    }
}
