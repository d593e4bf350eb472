// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the persistence backend (SQLite today).

use async_trait::async_trait;

use crate::error::PromptgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AdmitOutcome, AdmitRequest, Attempt, ClaimOutcome, FinalizeAttempt, LevelProgress, LogEvent,
    NewLogEvent, RewardClaim, Session, StorageStats, TaskPayload, User,
};

/// A reward pool as fed into storage on config (re)load.
#[derive(Debug, Clone)]
pub struct RewardPoolSync {
    pub pool_id: String,
    pub items: Vec<RewardItemSync>,
}

/// One reward item to upsert; `claimed_count` is preserved across syncs.
#[derive(Debug, Clone)]
pub struct RewardItemSync {
    pub item_id: String,
    pub kind: crate::types::RewardKind,
    pub code: String,
    pub max_claims: i64,
}

/// Adapter for the transactional persistence backend.
///
/// Every mutating call either commits or has no visible effect. The calls
/// that must be atomic across multiple tables (`admit_attempt`,
/// `finalize_attempt`, `claim_reward`) run inside a single transaction.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), PromptgateError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), PromptgateError>;

    // --- Users ---

    /// Idempotent: returns the existing user or creates one.
    async fn get_or_create_user(
        &self,
        telegram_user_id: i64,
        username: Option<&str>,
    ) -> Result<User, PromptgateError>;

    async fn get_user(&self, telegram_user_id: i64) -> Result<Option<User>, PromptgateError>;

    /// Returns false if no such user exists.
    async fn set_user_banned(
        &self,
        telegram_user_id: i64,
        banned: bool,
        reason: Option<&str>,
    ) -> Result<bool, PromptgateError>;

    // --- Sessions ---

    async fn get_session(
        &self,
        user_id: i64,
        level_id: i64,
    ) -> Result<Option<Session>, PromptgateError>;

    /// Replaces by (user_id, level_id); returns the row with its id populated.
    async fn upsert_session(&self, session: &Session) -> Result<Session, PromptgateError>;

    /// Clears state, turns, and cooldown for one (user, level) back to READY.
    /// Does not revoke a prior reward claim.
    async fn reset_session(&self, user_id: i64, level_id: i64) -> Result<bool, PromptgateError>;

    // --- Level progress ---

    async fn is_level_passed(&self, user_id: i64, level_id: i64)
        -> Result<bool, PromptgateError>;

    /// Idempotent: a duplicate insert is a no-op.
    async fn mark_level_passed(
        &self,
        user_id: i64,
        level_id: i64,
        turns_used: i64,
    ) -> Result<(), PromptgateError>;

    /// Smallest level id without a progress row, or `total_levels + 1` when
    /// every level is passed.
    async fn get_current_level(
        &self,
        user_id: i64,
        total_levels: i64,
    ) -> Result<i64, PromptgateError>;

    async fn get_user_progress(&self, user_id: i64)
        -> Result<Vec<LevelProgress>, PromptgateError>;

    // --- Attempts ---

    /// Append-only; returns the attempt id.
    async fn record_attempt(&self, attempt: &Attempt) -> Result<i64, PromptgateError>;

    // --- Atomic multi-table operations ---

    /// Atomic admission: compare-and-set the session READY -> INFLIGHT,
    /// check the queue bound, insert the pending task, and append the
    /// USER_IN log event. One transaction.
    async fn admit_attempt(&self, req: AdmitRequest) -> Result<AdmitOutcome, PromptgateError>;

    /// Atomic finalization: attempt row, optional claim + level progress,
    /// session update, pending-task delete, and log events. One transaction.
    async fn finalize_attempt(
        &self,
        req: FinalizeAttempt,
    ) -> Result<Option<ClaimOutcome>, PromptgateError>;

    /// Atomic reward claim for (pool, user, level); see the claim protocol.
    /// Also inserts the level-progress row on success.
    async fn claim_reward(
        &self,
        pool_id: &str,
        user_id: i64,
        level_id: i64,
    ) -> Result<ClaimOutcome, PromptgateError>;

    // --- Rewards ---

    /// Upserts items by item_id preserving `claimed_count`; items absent
    /// from `pools` are disabled, not deleted.
    async fn sync_reward_items(&self, pools: &[RewardPoolSync]) -> Result<(), PromptgateError>;

    async fn get_claim(
        &self,
        user_id: i64,
        level_id: i64,
    ) -> Result<Option<RewardClaim>, PromptgateError>;

    /// All claims for one user, oldest first.
    async fn list_claims(&self, user_id: i64) -> Result<Vec<RewardClaim>, PromptgateError>;

    // --- Pending tasks (queue backing) ---

    async fn delete_pending_task(&self, task_id: &str) -> Result<bool, PromptgateError>;

    /// Ascending `enqueued_at`, tiebreak `task_id`: the rehydration order.
    async fn list_pending_tasks(&self) -> Result<Vec<TaskPayload>, PromptgateError>;

    /// Deletes every pending task and flips its session back to READY.
    /// Returns the number of tasks dropped.
    async fn clear_pending_tasks(&self) -> Result<i64, PromptgateError>;

    // --- Audit log ---

    /// Append-only; content is truncated to 500 chars at write time.
    async fn append_log_event(&self, event: &NewLogEvent) -> Result<(), PromptgateError>;

    /// Events for one calendar date (UTC, `YYYY-MM-DD`), oldest first.
    async fn export_logs(&self, date: &str) -> Result<Vec<LogEvent>, PromptgateError>;

    // --- Stats ---

    async fn stats(&self) -> Result<StorageStats, PromptgateError>;
}
