// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate counters for the admin stats surface.

use promptgate_core::types::{PoolStock, StorageStats};
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Collect activity-wide counters in one snapshot.
pub async fn stats(db: &Database) -> Result<StorageStats, PromptgateError> {
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    db.connection()
        .call(move |conn| {
            let total_users: i64 =
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let pending_tasks: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_tasks", [], |row| row.get(0))?;
            let today_attempts: i64 = conn.query_row(
                "SELECT COUNT(*) FROM attempts WHERE date(created_at) = ?1",
                params![today],
                |row| row.get(0),
            )?;
            let today_claims: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reward_claims WHERE date(claimed_at) = ?1",
                params![today],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT level_id, COUNT(*) FROM level_progress GROUP BY level_id ORDER BY level_id",
            )?;
            let passed_by_level: Vec<(i64, i64)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT pool_id, SUM(max_claims), SUM(claimed_count)
                 FROM reward_items WHERE enabled = 1
                 GROUP BY pool_id ORDER BY pool_id",
            )?;
            let pool_stock: Vec<PoolStock> = stmt
                .query_map([], |row| {
                    Ok(PoolStock {
                        pool_id: row.get(0)?,
                        total: row.get(1)?,
                        claimed: row.get(2)?,
                    })
                })?
                .collect::<Result<_, _>>()?;

            Ok(StorageStats {
                total_users,
                pending_tasks,
                today_attempts,
                today_claims,
                passed_by_level,
                pool_stock,
            })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{progress, users};
    use tempfile::tempdir;

    #[tokio::test]
    async fn stats_counts_users_and_progress() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let u1 = users::get_or_create_user(&db, 1, None).await.unwrap();
        let u2 = users::get_or_create_user(&db, 2, None).await.unwrap();
        progress::mark_level_passed(&db, u1.id, 1, 1).await.unwrap();
        progress::mark_level_passed(&db, u2.id, 1, 2).await.unwrap();
        progress::mark_level_passed(&db, u1.id, 2, 1).await.unwrap();

        let snapshot = stats(&db).await.unwrap();
        assert_eq!(snapshot.total_users, 2);
        assert_eq!(snapshot.pending_tasks, 0);
        assert_eq!(snapshot.passed_by_level, vec![(1, 2), (2, 1)]);

        db.close().await.unwrap();
    }
}
