// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations.
//!
//! Sessions are keyed by (user_id, level_id). State flips into INFLIGHT go
//! through the atomic admission flow in `attempt_flow`, never here.

use std::str::FromStr;

use promptgate_core::types::{Session, SessionState};
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

pub(crate) const SESSION_COLUMNS: &str =
    "id, user_id, level_id, state, turn_count, inflight_task_id, cooldown_until, created_at, updated_at";

pub(crate) fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    let state_raw: String = row.get(3)?;
    let state = SessionState::from_str(&state_raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown session state {state_raw:?}").into(),
        )
    })?;
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        level_id: row.get(2)?,
        state,
        turn_count: row.get(4)?,
        inflight_task_id: row.get(5)?,
        cooldown_until: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Get the session for (user, level).
pub async fn get_session(
    db: &Database,
    user_id: i64,
    level_id: i64,
) -> Result<Option<Session>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 AND level_id = ?2"
                ),
                params![user_id, level_id],
                row_to_session,
            );
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Create or replace the session for (user, level), returning the stored row.
pub async fn upsert_session(db: &Database, session: &Session) -> Result<Session, PromptgateError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO sessions
                   (user_id, level_id, state, turn_count, inflight_task_id, cooldown_until, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(user_id, level_id) DO UPDATE SET
                   state = excluded.state,
                   turn_count = excluded.turn_count,
                   inflight_task_id = excluded.inflight_task_id,
                   cooldown_until = excluded.cooldown_until,
                   updated_at = excluded.updated_at",
                params![
                    session.user_id,
                    session.level_id,
                    session.state.to_string(),
                    session.turn_count,
                    session.inflight_task_id,
                    session.cooldown_until,
                    now,
                ],
            )?;
            let stored = conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 AND level_id = ?2"
                ),
                params![session.user_id, session.level_id],
                row_to_session,
            )?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Reset a session to READY with zero turns and no cooldown.
///
/// Admin-only escape hatch; the prior reward claim, if any, stays.
pub async fn reset_session(
    db: &Database,
    user_id: i64,
    level_id: i64,
) -> Result<bool, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET state = 'READY', turn_count = 0, inflight_task_id = NULL,
                     cooldown_until = NULL, updated_at = ?1
                 WHERE user_id = ?2 AND level_id = ?3",
                params![now_rfc3339(), user_id, level_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
