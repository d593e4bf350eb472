// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use promptgate_config::model::StorageConfig;
use promptgate_core::traits::storage::RewardPoolSync;
use promptgate_core::types::{
    AdapterType, AdmitOutcome, AdmitRequest, Attempt, ClaimOutcome, FinalizeAttempt, HealthStatus,
    LevelProgress, LogEvent, NewLogEvent, RewardClaim, Session, StorageStats, TaskPayload, User,
};
use promptgate_core::{PluginAdapter, PromptgateError, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, PromptgateError> {
        self.db.get().ok_or_else(|| PromptgateError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptgateError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), PromptgateError> {
        let db = Database::open(&self.config.database_path).await?;
        self.db.set(db).map_err(|_| PromptgateError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PromptgateError> {
        self.db()?.close().await
    }

    // --- Users ---

    async fn get_or_create_user(
        &self,
        telegram_user_id: i64,
        username: Option<&str>,
    ) -> Result<User, PromptgateError> {
        queries::users::get_or_create_user(self.db()?, telegram_user_id, username).await
    }

    async fn get_user(&self, telegram_user_id: i64) -> Result<Option<User>, PromptgateError> {
        queries::users::get_user(self.db()?, telegram_user_id).await
    }

    async fn set_user_banned(
        &self,
        telegram_user_id: i64,
        banned: bool,
        reason: Option<&str>,
    ) -> Result<bool, PromptgateError> {
        queries::users::set_user_banned(self.db()?, telegram_user_id, banned, reason).await
    }

    // --- Sessions ---

    async fn get_session(
        &self,
        user_id: i64,
        level_id: i64,
    ) -> Result<Option<Session>, PromptgateError> {
        queries::sessions::get_session(self.db()?, user_id, level_id).await
    }

    async fn upsert_session(&self, session: &Session) -> Result<Session, PromptgateError> {
        queries::sessions::upsert_session(self.db()?, session).await
    }

    async fn reset_session(&self, user_id: i64, level_id: i64) -> Result<bool, PromptgateError> {
        queries::sessions::reset_session(self.db()?, user_id, level_id).await
    }

    // --- Level progress ---

    async fn is_level_passed(
        &self,
        user_id: i64,
        level_id: i64,
    ) -> Result<bool, PromptgateError> {
        queries::progress::is_level_passed(self.db()?, user_id, level_id).await
    }

    async fn mark_level_passed(
        &self,
        user_id: i64,
        level_id: i64,
        turns_used: i64,
    ) -> Result<(), PromptgateError> {
        queries::progress::mark_level_passed(self.db()?, user_id, level_id, turns_used).await
    }

    async fn get_current_level(
        &self,
        user_id: i64,
        total_levels: i64,
    ) -> Result<i64, PromptgateError> {
        queries::progress::get_current_level(self.db()?, user_id, total_levels).await
    }

    async fn get_user_progress(
        &self,
        user_id: i64,
    ) -> Result<Vec<LevelProgress>, PromptgateError> {
        queries::progress::get_user_progress(self.db()?, user_id).await
    }

    // --- Attempts ---

    async fn record_attempt(&self, attempt: &Attempt) -> Result<i64, PromptgateError> {
        queries::attempts::record_attempt(self.db()?, attempt).await
    }

    // --- Atomic flows ---

    async fn admit_attempt(&self, req: AdmitRequest) -> Result<AdmitOutcome, PromptgateError> {
        queries::attempt_flow::admit(self.db()?, req).await
    }

    async fn finalize_attempt(
        &self,
        req: FinalizeAttempt,
    ) -> Result<Option<ClaimOutcome>, PromptgateError> {
        queries::attempt_flow::finalize(self.db()?, req).await
    }

    async fn claim_reward(
        &self,
        pool_id: &str,
        user_id: i64,
        level_id: i64,
    ) -> Result<ClaimOutcome, PromptgateError> {
        queries::rewards::claim_reward(self.db()?, pool_id, user_id, level_id).await
    }

    // --- Rewards ---

    async fn sync_reward_items(&self, pools: &[RewardPoolSync]) -> Result<(), PromptgateError> {
        queries::rewards::sync_reward_items(self.db()?, pools).await
    }

    async fn get_claim(
        &self,
        user_id: i64,
        level_id: i64,
    ) -> Result<Option<RewardClaim>, PromptgateError> {
        queries::rewards::get_claim(self.db()?, user_id, level_id).await
    }

    async fn list_claims(&self, user_id: i64) -> Result<Vec<RewardClaim>, PromptgateError> {
        queries::rewards::list_claims(self.db()?, user_id).await
    }

    // --- Pending tasks ---

    async fn delete_pending_task(&self, task_id: &str) -> Result<bool, PromptgateError> {
        queries::tasks::delete_pending_task(self.db()?, task_id).await
    }

    async fn list_pending_tasks(&self) -> Result<Vec<TaskPayload>, PromptgateError> {
        queries::tasks::list_pending_tasks(self.db()?).await
    }

    async fn clear_pending_tasks(&self) -> Result<i64, PromptgateError> {
        queries::tasks::clear_pending_tasks(self.db()?).await
    }

    // --- Audit log ---

    async fn append_log_event(&self, event: &NewLogEvent) -> Result<(), PromptgateError> {
        queries::logs::append_log_event(self.db()?, event).await
    }

    async fn export_logs(&self, date: &str) -> Result<Vec<LogEvent>, PromptgateError> {
        queries::logs::export_logs(self.db()?, date).await
    }

    // --- Stats ---

    async fn stats(&self) -> Result<StorageStats, PromptgateError> {
        queries::stats::stats(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_fails_when_not_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
    }

    #[tokio::test]
    async fn full_user_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);

        let user = storage.get_or_create_user(1001, Some("alice")).await.unwrap();
        assert!(!user.banned);

        assert_eq!(storage.get_current_level(user.id, 3).await.unwrap(), 1);
        storage.mark_level_passed(user.id, 1, 2).await.unwrap();
        assert_eq!(storage.get_current_level(user.id, 3).await.unwrap(), 2);
        assert!(storage.is_level_passed(user.id, 1).await.unwrap());

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_users, 1);

        storage.close().await.unwrap();
    }
}
