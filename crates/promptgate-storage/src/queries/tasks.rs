// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending task rows: the durable mirror of the in-memory attempt queue.
//!
//! Rows are inserted by the atomic admission flow (`attempt_flow::admit`)
//! and deleted when an attempt is finalized. Rows that survive a crash are
//! rehydrated in enqueue order on the next start.

use promptgate_core::types::TaskPayload;
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

pub(crate) fn row_to_task(row: &rusqlite::Row<'_>) -> Result<TaskPayload, rusqlite::Error> {
    Ok(TaskPayload {
        task_id: row.get(0)?,
        user_id: row.get(1)?,
        telegram_user_id: row.get(2)?,
        chat_id: row.get(3)?,
        message_id: row.get(4)?,
        username: row.get(5)?,
        level_id: row.get(6)?,
        session_id: row.get(7)?,
        user_prompt: row.get(8)?,
        enqueued_at: row.get(9)?,
    })
}

pub(crate) const TASK_COLUMNS: &str = "task_id, user_id, telegram_user_id, chat_id, message_id, \
     username, level_id, session_id, user_prompt, enqueued_at";

/// Insert a pending task inside an open transaction.
pub(crate) fn insert_task_tx(
    conn: &rusqlite::Connection,
    task: &TaskPayload,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO pending_tasks
           (task_id, user_id, telegram_user_id, chat_id, message_id, username,
            level_id, session_id, user_prompt, enqueued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            task.task_id,
            task.user_id,
            task.telegram_user_id,
            task.chat_id,
            task.message_id,
            task.username,
            task.level_id,
            task.session_id,
            task.user_prompt,
            task.enqueued_at,
        ],
    )?;
    Ok(())
}

/// Delete a pending task by id. Returns false if it was already gone.
pub async fn delete_pending_task(db: &Database, task_id: &str) -> Result<bool, PromptgateError> {
    let task_id = task_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM pending_tasks WHERE task_id = ?1",
                params![task_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// All pending tasks in rehydration order: ascending enqueued_at, tiebreak
/// by task_id.
pub async fn list_pending_tasks(db: &Database) -> Result<Vec<TaskPayload>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM pending_tasks ORDER BY enqueued_at ASC, task_id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
        .map_err(map_tr_err)
}

/// Drop every pending task and release its session back to READY.
///
/// Admin-only: the queue facade must be cleared alongside this.
pub async fn clear_pending_tasks(db: &Database) -> Result<i64, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();
            tx.execute(
                "UPDATE sessions
                 SET state = 'READY', inflight_task_id = NULL, updated_at = ?1
                 WHERE state = 'INFLIGHT'
                   AND inflight_task_id IN (SELECT task_id FROM pending_tasks)",
                params![now],
            )?;
            let dropped = tx.execute("DELETE FROM pending_tasks", [])?;
            tx.commit()?;
            Ok(dropped as i64)
        })
        .await
        .map_err(map_tr_err)
}
