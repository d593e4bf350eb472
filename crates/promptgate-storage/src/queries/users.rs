// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User row operations.

use promptgate_core::types::User;
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        telegram_user_id: row.get(1)?,
        username: row.get(2)?,
        banned: row.get::<_, i64>(3)? != 0,
        ban_reason: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const USER_COLUMNS: &str =
    "id, telegram_user_id, username, banned, ban_reason, created_at, updated_at";

/// Idempotent lookup-or-insert by channel identity. A changed username is
/// written back on lookup.
pub async fn get_or_create_user(
    db: &Database,
    telegram_user_id: i64,
    username: Option<&str>,
) -> Result<User, PromptgateError> {
    let username = username.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let existing = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_user_id = ?1"),
                    params![telegram_user_id],
                    row_to_user,
                );

            match existing {
                Ok(mut user) => {
                    if user.username != username {
                        let now = now_rfc3339();
                        conn.execute(
                            "UPDATE users SET username = ?1, updated_at = ?2 WHERE id = ?3",
                            params![username, now, user.id],
                        )?;
                        user.username = username;
                        user.updated_at = now;
                    }
                    Ok(user)
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    let now = now_rfc3339();
                    conn.execute(
                        "INSERT INTO users (telegram_user_id, username, banned, created_at, updated_at)
                         VALUES (?1, ?2, 0, ?3, ?3)",
                        params![telegram_user_id, username, now],
                    )?;
                    Ok(User {
                        id: conn.last_insert_rowid(),
                        telegram_user_id,
                        username,
                        banned: false,
                        ban_reason: None,
                        created_at: now.clone(),
                        updated_at: now,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Get a user by channel identity.
pub async fn get_user(
    db: &Database,
    telegram_user_id: i64,
) -> Result<Option<User>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_user_id = ?1"),
                params![telegram_user_id],
                row_to_user,
            );
            match result {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Update ban status. Returns false when the user does not exist.
pub async fn set_user_banned(
    db: &Database,
    telegram_user_id: i64,
    banned: bool,
    reason: Option<&str>,
) -> Result<bool, PromptgateError> {
    let reason = reason.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET banned = ?1, ban_reason = ?2, updated_at = ?3
                 WHERE telegram_user_id = ?4",
                params![banned as i64, reason, now_rfc3339(), telegram_user_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn create_then_lookup_is_idempotent() {
        let (db, _dir) = setup_db().await;

        let u1 = get_or_create_user(&db, 1001, Some("alice")).await.unwrap();
        let u2 = get_or_create_user(&db, 1001, Some("alice")).await.unwrap();
        assert_eq!(u1.id, u2.id);
        assert_eq!(u2.username.as_deref(), Some("alice"));
        assert!(!u2.banned);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn changed_username_is_written_back() {
        let (db, _dir) = setup_db().await;

        let u1 = get_or_create_user(&db, 1002, Some("old")).await.unwrap();
        let u2 = get_or_create_user(&db, 1002, Some("new")).await.unwrap();
        assert_eq!(u1.id, u2.id);
        assert_eq!(u2.username.as_deref(), Some("new"));

        let fetched = get_user(&db, 1002).await.unwrap().unwrap();
        assert_eq!(fetched.username.as_deref(), Some("new"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_user_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_user(&db, 999).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ban_and_unban() {
        let (db, _dir) = setup_db().await;
        get_or_create_user(&db, 42, None).await.unwrap();

        assert!(set_user_banned(&db, 42, true, Some("abuse")).await.unwrap());
        let user = get_user(&db, 42).await.unwrap().unwrap();
        assert!(user.banned);
        assert_eq!(user.ban_reason.as_deref(), Some("abuse"));

        assert!(set_user_banned(&db, 42, false, None).await.unwrap());
        let user = get_user(&db, 42).await.unwrap().unwrap();
        assert!(!user.banned);

        // Unknown user is a no-op.
        assert!(!set_user_banned(&db, 777, true, None).await.unwrap());

        db.close().await.unwrap();
    }
}
