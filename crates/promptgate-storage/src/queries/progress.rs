// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Level progress operations.

use promptgate_core::types::LevelProgress;
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

/// Insert the progress row inside an open transaction. Idempotent: a
/// duplicate insert is a no-op and the original `passed_at` stands.
pub(crate) fn mark_level_passed_tx(
    conn: &rusqlite::Connection,
    user_id: i64,
    level_id: i64,
    turns_used: i64,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO level_progress (user_id, level_id, turns_used, passed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, level_id) DO NOTHING",
        params![user_id, level_id, turns_used, now],
    )?;
    Ok(())
}

/// Idempotently record that a user passed a level.
pub async fn mark_level_passed(
    db: &Database,
    user_id: i64,
    level_id: i64,
    turns_used: i64,
) -> Result<(), PromptgateError> {
    db.connection()
        .call(move |conn| {
            mark_level_passed_tx(conn, user_id, level_id, turns_used, &now_rfc3339())?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a progress row exists for (user, level).
pub async fn is_level_passed(
    db: &Database,
    user_id: i64,
    level_id: i64,
) -> Result<bool, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM level_progress WHERE user_id = ?1 AND level_id = ?2",
                params![user_id, level_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Smallest level id the user has not passed, or `total_levels + 1` when
/// everything is passed.
pub async fn get_current_level(
    db: &Database,
    user_id: i64,
    total_levels: i64,
) -> Result<i64, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT level_id FROM level_progress WHERE user_id = ?1 ORDER BY level_id",
            )?;
            let passed: std::collections::HashSet<i64> = stmt
                .query_map(params![user_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            for level_id in 1..=total_levels {
                if !passed.contains(&level_id) {
                    return Ok(level_id);
                }
            }
            Ok(total_levels + 1)
        })
        .await
        .map_err(map_tr_err)
}

/// All progress rows for a user, ordered by level.
pub async fn get_user_progress(
    db: &Database,
    user_id: i64,
) -> Result<Vec<LevelProgress>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, level_id, turns_used, passed_at
                 FROM level_progress WHERE user_id = ?1 ORDER BY level_id",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(LevelProgress {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    level_id: row.get(2)?,
                    turns_used: row.get(3)?,
                    passed_at: row.get(4)?,
                })
            })?;
            let mut progress = Vec::new();
            for row in rows {
                progress.push(row?);
            }
            Ok(progress)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn mark_passed_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let user = users::get_or_create_user(&db, 1, None).await.unwrap();

        mark_level_passed(&db, user.id, 1, 2).await.unwrap();
        mark_level_passed(&db, user.id, 1, 3).await.unwrap();

        assert!(is_level_passed(&db, user.id, 1).await.unwrap());
        let progress = get_user_progress(&db, user.id).await.unwrap();
        assert_eq!(progress.len(), 1);
        // The first write wins.
        assert_eq!(progress[0].turns_used, 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn current_level_is_smallest_unpassed() {
        let (db, _dir) = setup_db().await;
        let user = users::get_or_create_user(&db, 2, None).await.unwrap();

        assert_eq!(get_current_level(&db, user.id, 3).await.unwrap(), 1);

        mark_level_passed(&db, user.id, 1, 1).await.unwrap();
        assert_eq!(get_current_level(&db, user.id, 3).await.unwrap(), 2);

        mark_level_passed(&db, user.id, 2, 1).await.unwrap();
        mark_level_passed(&db, user.id, 3, 1).await.unwrap();
        // All passed: one past the end.
        assert_eq!(get_current_level(&db, user.id, 3).await.unwrap(), 4);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unpassed_level_reports_false() {
        let (db, _dir) = setup_db().await;
        let user = users::get_or_create_user(&db, 3, None).await.unwrap();
        assert!(!is_level_passed(&db, user.id, 1).await.unwrap());
        db.close().await.unwrap();
    }
}
