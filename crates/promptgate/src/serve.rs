// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process bootstrap: configuration, adapter wiring, the inbound loop, and
//! graceful shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use promptgate_config::model::AppConfig;
use promptgate_config::{loader, validation, ContentProvider, JsonContentProvider};
use promptgate_core::{ChannelAdapter, PromptgateError, StorageAdapter};
use promptgate_engine::admin::content_pools_for_sync;
use promptgate_engine::{
    AdminCommands, AdmissionFront, GameEngine, PersistentQueue, RuntimeToggles, WorkerPool,
};
use promptgate_llm::OpenAiCompatClient;
use promptgate_storage::SqliteStorage;
use promptgate_telegram::TelegramChannel;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for busy workers before interrupting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_app_config() -> Result<AppConfig, PromptgateError> {
    promptgate_config::load_app_config()
        .map_err(|e| PromptgateError::Config(format!("failed to load app config: {e}")))
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Run the bot until a shutdown signal arrives.
pub async fn run() -> Result<(), PromptgateError> {
    let config = load_app_config()?;
    init_tracing(&config.log_level);

    // Content documents, validated as a set.
    let content: Arc<dyn ContentProvider> = Arc::new(JsonContentProvider::open(
        &config.content.activity_path,
        &config.content.levels_path,
        &config.content.rewards_path,
    )?);
    let activity = content.activity();
    info!(activity_id = activity.activity_id.as_str(), "content loaded");

    // Storage.
    let storage_adapter = SqliteStorage::new(config.storage.clone());
    storage_adapter.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage_adapter);
    storage
        .sync_reward_items(&content_pools_for_sync(content.as_ref()))
        .await?;

    // LLM client.
    let api_key = config.llm.api_key.as_deref().ok_or_else(|| {
        PromptgateError::Config("llm.api_key is required (set PROMPTGATE_LLM_API_KEY)".into())
    })?;
    let llm = Arc::new(OpenAiCompatClient::new(
        api_key,
        &config.llm.base_url,
        &activity.llm.model,
        Duration::from_secs(activity.llm.timeout_seconds),
    )?);

    // Telegram channel.
    let bot_token = config.telegram.bot_token.as_deref().ok_or_else(|| {
        PromptgateError::Config(
            "telegram.bot_token is required (set PROMPTGATE_TELEGRAM_BOT_TOKEN)".into(),
        )
    })?;
    let mut telegram = TelegramChannel::new(bot_token)?;
    telegram.connect().await?;
    let channel: Arc<dyn ChannelAdapter> = Arc::new(telegram);

    // Queue, engine, admission, admin.
    let queue = Arc::new(PersistentQueue::new(storage.clone()));
    let restored = queue.restore().await?;
    if restored > 0 {
        info!(restored, "rehydrated queue from previous run");
    }

    let toggles = Arc::new(RuntimeToggles::new(activity.enabled));
    let engine = Arc::new(GameEngine::new(
        storage.clone(),
        content.clone(),
        llm.clone(),
        channel.clone(),
        toggles.clone(),
    ));
    let admission = AdmissionFront::new(
        storage.clone(),
        content.clone(),
        channel.clone(),
        queue.clone(),
        toggles.clone(),
    );
    let admin = AdminCommands::new(
        storage.clone(),
        content.clone(),
        queue.clone(),
        toggles.clone(),
        config.telegram.admin_user_ids.clone(),
    );

    let cancel = install_signal_handler();
    let workers = WorkerPool::spawn(
        queue.clone(),
        engine,
        activity.global_limits.worker_concurrency,
        cancel.clone(),
    );

    info!("promptgate serving");

    // Inbound loop: the channel delivers updates sequentially; per-user
    // serialization happens inside the admission front.
    loop {
        tokio::select! {
            msg = channel.receive() => {
                match msg {
                    Ok(inbound) => {
                        let text = inbound.text.trim();
                        if text.starts_with("/admin") {
                            match admin.handle(inbound.telegram_user_id, text).await {
                                Ok(Some(reply)) => {
                                    if let Err(e) = channel.send(inbound.chat_id, &reply).await {
                                        error!(error = %e, "failed to send admin reply");
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => error!(error = %e, "admin command failed"),
                            }
                            continue;
                        }
                        if let Err(e) = admission.on_message(&inbound).await {
                            error!(error = %e, "failed to handle inbound message");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "channel receive error");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!("shutdown signal received, stopping inbound loop");
                break;
            }
        }
    }

    // Drain workers; surviving pending tasks replay on the next run.
    workers.shutdown(DRAIN_TIMEOUT).await;
    storage.close().await?;
    info!("promptgate stopped");
    Ok(())
}

/// Validate the three content documents and report every problem found.
pub async fn validate() -> Result<(), PromptgateError> {
    let config = load_app_config()?;
    let activity = loader::load_activity(Path::new(&config.content.activity_path))?;
    let levels = loader::load_levels(Path::new(&config.content.levels_path))?;
    let rewards = loader::load_rewards(Path::new(&config.content.rewards_path))?;

    let errors = validation::validate_content(&activity, &levels, &rewards);
    if errors.is_empty() {
        println!(
            "ok: {} levels, {} reward pools",
            levels.levels.len(),
            rewards.reward_pools.len()
        );
        Ok(())
    } else {
        for error in &errors {
            eprintln!("invalid: {error}");
        }
        Err(PromptgateError::Config(format!(
            "{} validation error(s)",
            errors.len()
        )))
    }
}

/// Print one day of audit events as JSON lines.
pub async fn export_logs(date: &str) -> Result<(), PromptgateError> {
    let config = load_app_config()?;
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;

    let events = storage.export_logs(date).await?;
    for event in &events {
        let line = serde_json::to_string(event)
            .map_err(|e| PromptgateError::Internal(format!("serialize log event: {e}")))?;
        println!("{line}");
    }
    storage.close().await?;
    Ok(())
}
