// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal storage stub for unit tests that only exercise queue mechanics.
//! Full-stack behavior is covered by the end-to-end suite against real
//! SQLite storage.

use async_trait::async_trait;
use promptgate_core::traits::storage::RewardPoolSync;
use promptgate_core::types::{
    AdmitOutcome, AdmitRequest, Attempt, ClaimOutcome, FinalizeAttempt, LevelProgress, LogEvent,
    NewLogEvent, RewardClaim, Session, StorageStats, TaskPayload, User,
};
use promptgate_core::{
    AdapterType, HealthStatus, PluginAdapter, PromptgateError, StorageAdapter,
};

/// Storage stub: admission always queues, reads are empty, everything else
/// is unreachable from the tests that use it.
pub(crate) struct NoopStorage;

#[async_trait]
impl PluginAdapter for NoopStorage {
    fn name(&self) -> &str {
        "noop"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }
    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        Ok(HealthStatus::Healthy)
    }
    async fn shutdown(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for NoopStorage {
    async fn initialize(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
    async fn close(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
    async fn get_or_create_user(
        &self,
        _: i64,
        _: Option<&str>,
    ) -> Result<User, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn get_user(&self, _: i64) -> Result<Option<User>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn set_user_banned(
        &self,
        _: i64,
        _: bool,
        _: Option<&str>,
    ) -> Result<bool, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn get_session(&self, _: i64, _: i64) -> Result<Option<Session>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn upsert_session(&self, _: &Session) -> Result<Session, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn reset_session(&self, _: i64, _: i64) -> Result<bool, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn is_level_passed(&self, _: i64, _: i64) -> Result<bool, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn mark_level_passed(&self, _: i64, _: i64, _: i64) -> Result<(), PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn get_current_level(&self, _: i64, _: i64) -> Result<i64, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn get_user_progress(&self, _: i64) -> Result<Vec<LevelProgress>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn record_attempt(&self, _: &Attempt) -> Result<i64, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn admit_attempt(&self, _: AdmitRequest) -> Result<AdmitOutcome, PromptgateError> {
        Ok(AdmitOutcome::Queued { depth: 1 })
    }
    async fn finalize_attempt(
        &self,
        _: FinalizeAttempt,
    ) -> Result<Option<ClaimOutcome>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn claim_reward(
        &self,
        _: &str,
        _: i64,
        _: i64,
    ) -> Result<ClaimOutcome, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn sync_reward_items(&self, _: &[RewardPoolSync]) -> Result<(), PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn get_claim(&self, _: i64, _: i64) -> Result<Option<RewardClaim>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn list_claims(&self, _: i64) -> Result<Vec<RewardClaim>, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
    async fn delete_pending_task(&self, _: &str) -> Result<bool, PromptgateError> {
        Ok(true)
    }
    async fn list_pending_tasks(&self) -> Result<Vec<TaskPayload>, PromptgateError> {
        Ok(vec![])
    }
    async fn clear_pending_tasks(&self) -> Result<i64, PromptgateError> {
        Ok(0)
    }
    async fn append_log_event(&self, _: &NewLogEvent) -> Result<(), PromptgateError> {
        Ok(())
    }
    async fn export_logs(&self, _: &str) -> Result<Vec<LogEvent>, PromptgateError> {
        Ok(vec![])
    }
    async fn stats(&self) -> Result<StorageStats, PromptgateError> {
        unimplemented!("not reachable from queue tests")
    }
}
