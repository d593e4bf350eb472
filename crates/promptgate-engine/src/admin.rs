// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin operations, consumed through a command surface outside the core
//! engine flow. Only user ids on the configured allowlist reach these.

use std::sync::Arc;

use promptgate_config::ContentProvider;
use promptgate_core::traits::storage::{RewardItemSync, RewardPoolSync};
use promptgate_core::{PromptgateError, StorageAdapter};
use tracing::info;

use crate::queue::PersistentQueue;
use crate::toggles::RuntimeToggles;

/// Admin command handler.
pub struct AdminCommands {
    storage: Arc<dyn StorageAdapter>,
    content: Arc<dyn ContentProvider>,
    queue: Arc<PersistentQueue>,
    toggles: Arc<RuntimeToggles>,
    admin_user_ids: Vec<i64>,
}

impl AdminCommands {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        content: Arc<dyn ContentProvider>,
        queue: Arc<PersistentQueue>,
        toggles: Arc<RuntimeToggles>,
        admin_user_ids: Vec<i64>,
    ) -> Self {
        Self {
            storage,
            content,
            queue,
            toggles,
            admin_user_ids,
        }
    }

    pub fn is_admin(&self, telegram_user_id: i64) -> bool {
        self.admin_user_ids.contains(&telegram_user_id)
    }

    /// Dispatch an admin command line. Returns the reply text, or `None`
    /// when the text is not an admin command.
    pub async fn handle(
        &self,
        telegram_user_id: i64,
        text: &str,
    ) -> Result<Option<String>, PromptgateError> {
        let mut parts = text.trim().split_whitespace();
        let command = match parts.next() {
            Some(c) if c.starts_with("/admin") => c,
            _ => return Ok(None),
        };
        if !self.is_admin(telegram_user_id) {
            return Ok(Some("You are not an admin.".to_string()));
        }

        let args: Vec<&str> = parts.collect();
        let reply = match command {
            "/admin_toggle" => self.toggle(args.first().copied()).await?,
            "/admin_togglereward" => self.toggle_reward(args.first().copied()).await?,
            "/admin_reload" => self.reload().await?,
            "/admin_stats" => self.stats().await?,
            "/admin_user" => self.user_info(&args).await?,
            "/admin_ban" => self.ban(&args, true).await?,
            "/admin_unban" => self.ban(&args, false).await?,
            "/admin_reset" => self.reset(&args).await?,
            "/admin_clear_queue" => self.clear_queue().await?,
            "/admin_export" => self.export(&args).await?,
            _ => concat!(
                "Admin commands:\n",
                "/admin_toggle on|off\n",
                "/admin_togglereward on|off|none\n",
                "/admin_reload\n",
                "/admin_stats\n",
                "/admin_user <telegram_user_id>\n",
                "/admin_ban <telegram_user_id> [reason]\n",
                "/admin_unban <telegram_user_id>\n",
                "/admin_reset <telegram_user_id> <level_id>\n",
                "/admin_clear_queue\n",
                "/admin_export <YYYY-MM-DD>"
            )
            .to_string(),
        };
        Ok(Some(reply))
    }

    async fn toggle(&self, arg: Option<&str>) -> Result<String, PromptgateError> {
        match arg {
            Some("on") => {
                self.toggles.set_activity_enabled(true);
                info!("activity enabled by admin");
                Ok("Activity enabled.".to_string())
            }
            Some("off") => {
                self.toggles.set_activity_enabled(false);
                info!("activity disabled by admin");
                Ok("Activity disabled.".to_string())
            }
            _ => Ok("Usage: /admin_toggle on|off".to_string()),
        }
    }

    /// Pin reward payout on or off independently of the activity toggle,
    /// or clear the pin so the reward window decides again. Passes still
    /// count while payout is off; only the claim is skipped.
    async fn toggle_reward(&self, arg: Option<&str>) -> Result<String, PromptgateError> {
        match arg {
            Some("on") => {
                self.toggles.set_reward_override(Some(true));
                info!("reward payout forced on by admin");
                Ok("Reward payout forced on (ignores the reward window).".to_string())
            }
            Some("off") => {
                self.toggles.set_reward_override(Some(false));
                info!("reward payout forced off by admin");
                Ok("Reward payout forced off. Passes still count; no codes go out.".to_string())
            }
            Some("none") => {
                self.toggles.set_reward_override(None);
                info!("reward payout override cleared by admin");
                Ok("Reward override cleared; payout follows the configured window.".to_string())
            }
            _ => {
                let current = match self.toggles.reward_override() {
                    Some(true) => "on (forced)",
                    Some(false) => "off (forced)",
                    None => "none (follows the reward window)",
                };
                Ok(format!(
                    "Current reward override: {current}\nUsage: /admin_togglereward on|off|none"
                ))
            }
        }
    }

    /// Per-user lookup for support: identity, ban status, progress, claims.
    async fn user_info(&self, args: &[&str]) -> Result<String, PromptgateError> {
        let Some(telegram_user_id) = args.first().and_then(|s| s.parse::<i64>().ok()) else {
            return Ok("Usage: /admin_user <telegram_user_id>".to_string());
        };
        let Some(user) = self.storage.get_user(telegram_user_id).await? else {
            return Ok(format!("User {telegram_user_id} not found."));
        };

        let total_levels = self.content.levels().len() as i64;
        let current = self
            .storage
            .get_current_level(user.id, total_levels)
            .await?;
        let progress = self.storage.get_user_progress(user.id).await?;
        let claims = self.storage.list_claims(user.id).await?;

        let mut lines = vec![
            format!(
                "user {telegram_user_id} (@{})",
                user.username.as_deref().unwrap_or("none")
            ),
            if user.banned {
                format!(
                    "banned: yes ({})",
                    user.ban_reason.as_deref().unwrap_or("no reason recorded")
                )
            } else {
                "banned: no".to_string()
            },
            format!("registered: {}", user.created_at),
            if current > total_levels {
                "progress: all levels passed".to_string()
            } else {
                format!("current level: {current}")
            },
        ];

        if progress.is_empty() {
            lines.push("passed: none".to_string());
        } else {
            for p in &progress {
                lines.push(format!(
                    "passed level {} in {} turns at {}",
                    p.level_id, p.turns_used, p.passed_at
                ));
            }
        }

        // Item ids only; codes stay out of the admin channel like they
        // stay out of the audit log.
        if claims.is_empty() {
            lines.push("claims: none".to_string());
        } else {
            for claim in &claims {
                lines.push(format!(
                    "claim: level {} item {} from pool {}",
                    claim.level_id, claim.item_id, claim.pool_id
                ));
            }
        }

        Ok(lines.join("\n"))
    }

    /// Reload the three content documents and re-sync reward inventory.
    /// A validation failure keeps the old config and reports the errors.
    async fn reload(&self) -> Result<String, PromptgateError> {
        if let Err(e) = self.content.reload() {
            return Ok(format!("Reload rejected: {e}"));
        }
        let pools = content_pools_for_sync(self.content.as_ref());
        self.storage.sync_reward_items(&pools).await?;
        self.toggles
            .set_activity_enabled(self.content.activity().enabled);
        info!("content config reloaded");
        Ok("Config reloaded and reward items synced.".to_string())
    }

    async fn stats(&self) -> Result<String, PromptgateError> {
        let stats = self.storage.stats().await?;
        let queue_depth = self.queue.len().await;

        let mut lines = vec![
            format!("users: {}", stats.total_users),
            format!("queue depth: {queue_depth} (durable rows: {})", stats.pending_tasks),
            format!("attempts today: {}", stats.today_attempts),
            format!("claims today: {}", stats.today_claims),
        ];
        for (level_id, count) in &stats.passed_by_level {
            lines.push(format!("level {level_id} passed by {count}"));
        }
        for stock in &stats.pool_stock {
            lines.push(format!(
                "pool {}: {}/{} claimed",
                stock.pool_id, stock.claimed, stock.total
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn ban(&self, args: &[&str], banned: bool) -> Result<String, PromptgateError> {
        let Some(user_id) = args.first().and_then(|s| s.parse::<i64>().ok()) else {
            return Ok("Usage: /admin_ban <telegram_user_id> [reason]".to_string());
        };
        let reason = if banned && args.len() > 1 {
            Some(args[1..].join(" "))
        } else {
            None
        };
        let changed = self
            .storage
            .set_user_banned(user_id, banned, reason.as_deref())
            .await?;
        if changed {
            info!(user_id, banned, "ban status changed by admin");
            Ok(format!(
                "User {user_id} {}.",
                if banned { "banned" } else { "unbanned" }
            ))
        } else {
            Ok(format!("User {user_id} not found."))
        }
    }

    /// Reset one (user, level) session. Prior reward claims stay.
    async fn reset(&self, args: &[&str]) -> Result<String, PromptgateError> {
        let (Some(user_arg), Some(level_arg)) = (args.first(), args.get(1)) else {
            return Ok("Usage: /admin_reset <telegram_user_id> <level_id>".to_string());
        };
        let (Ok(telegram_user_id), Ok(level_id)) =
            (user_arg.parse::<i64>(), level_arg.parse::<i64>())
        else {
            return Ok("Usage: /admin_reset <telegram_user_id> <level_id>".to_string());
        };

        let Some(user) = self.storage.get_user(telegram_user_id).await? else {
            return Ok(format!("User {telegram_user_id} not found."));
        };
        if self.storage.reset_session(user.id, level_id).await? {
            info!(telegram_user_id, level_id, "session reset by admin");
            Ok(format!(
                "Session for user {telegram_user_id}, level {level_id} reset to READY."
            ))
        } else {
            Ok("No such session.".to_string())
        }
    }

    /// Drop all pending tasks and release their sessions back to READY.
    async fn clear_queue(&self) -> Result<String, PromptgateError> {
        let in_memory = self.queue.clear().await;
        let durable = self.storage.clear_pending_tasks().await?;
        info!(in_memory, durable, "queue cleared by admin");
        Ok(format!(
            "Queue cleared: {durable} pending tasks dropped, sessions released."
        ))
    }

    /// Export one day of audit events as JSON lines.
    async fn export(&self, args: &[&str]) -> Result<String, PromptgateError> {
        let Some(date) = args.first() else {
            return Ok("Usage: /admin_export <YYYY-MM-DD>".to_string());
        };
        let events = self.storage.export_logs(date).await?;
        if events.is_empty() {
            return Ok(format!("No events on {date}."));
        }
        let mut lines = Vec::with_capacity(events.len());
        for event in &events {
            lines.push(serde_json::to_string(event).map_err(|e| {
                PromptgateError::Internal(format!("failed to serialize log event: {e}"))
            })?);
        }
        Ok(lines.join("\n"))
    }
}

/// Flatten the current reward pools into the storage sync shape.
pub fn content_pools_for_sync(content: &dyn ContentProvider) -> Vec<RewardPoolSync> {
    content
        .reward_pools()
        .into_iter()
        .map(|pool| RewardPoolSync {
            pool_id: pool.pool_id,
            items: pool
                .items
                .into_iter()
                .map(|item| RewardItemSync {
                    item_id: item.item_id,
                    kind: item.kind,
                    code: item.code,
                    max_claims: item.max_claims_per_item,
                })
                .collect(),
        })
        .collect()
}
