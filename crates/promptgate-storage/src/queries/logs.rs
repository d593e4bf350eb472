// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log operations.

use std::str::FromStr;

use promptgate_core::types::{EventType, LogEvent, NewLogEvent};
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

/// Hard cap on persisted event content; longer text is truncated with an
/// ellipsis marker.
const MAX_CONTENT_LEN: usize = 500;

pub(crate) fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LEN {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(MAX_CONTENT_LEN).collect();
    truncated.push_str("...");
    truncated
}

/// Insert a log event inside an open transaction.
pub(crate) fn append_log_event_tx(
    conn: &rusqlite::Connection,
    event: &NewLogEvent,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO log_events
           (trace_id, event_type, telegram_user_id, chat_id, level_id,
            session_id, turn_index, content, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.trace_id,
            event.event_type.to_string(),
            event.telegram_user_id,
            event.chat_id,
            event.level_id,
            event.session_id,
            event.turn_index,
            truncate_content(&event.content),
            event.metadata,
            now,
        ],
    )?;
    Ok(())
}

/// Append one audit event.
pub async fn append_log_event(db: &Database, event: &NewLogEvent) -> Result<(), PromptgateError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            append_log_event_tx(conn, &event, &now_rfc3339())?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Events for one UTC calendar date (`YYYY-MM-DD`), oldest first.
pub async fn export_logs(db: &Database, date: &str) -> Result<Vec<LogEvent>, PromptgateError> {
    let date = date.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, trace_id, event_type, telegram_user_id, chat_id, level_id,
                        session_id, turn_index, content, metadata, created_at
                 FROM log_events
                 WHERE date(created_at) = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![date], |row| {
                let type_raw: String = row.get(2)?;
                let event_type = EventType::from_str(&type_raw).map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        format!("unknown event type {type_raw:?}").into(),
                    )
                })?;
                Ok(LogEvent {
                    id: row.get(0)?,
                    trace_id: row.get(1)?,
                    event_type,
                    telegram_user_id: row.get(3)?,
                    chat_id: row.get(4)?,
                    level_id: row.get(5)?,
                    session_id: row.get(6)?,
                    turn_index: row.get(7)?,
                    content: row.get(8)?,
                    metadata: row.get(9)?,
                    created_at: row.get(10)?,
                })
            })?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
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

    fn make_event(trace_id: &str, content: &str) -> NewLogEvent {
        NewLogEvent {
            trace_id: trace_id.to_string(),
            event_type: EventType::UserIn,
            telegram_user_id: 1001,
            chat_id: 1001,
            level_id: Some(1),
            session_id: None,
            turn_index: Some(0),
            content: content.to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn append_and_export_today() {
        let (db, _dir) = setup_db().await;
        append_log_event(&db, &make_event("t1", "hello")).await.unwrap();
        append_log_event(&db, &make_event("t1", "world")).await.unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let events = export_logs(&db, &today).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content, "hello");
        assert_eq!(events[0].event_type, EventType::UserIn);

        // Nothing on a different date.
        let events = export_logs(&db, "1999-01-01").await.unwrap();
        assert!(events.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn content_is_truncated_to_500_chars() {
        let (db, _dir) = setup_db().await;
        let long = "x".repeat(1200);
        append_log_event(&db, &make_event("t2", &long)).await.unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let events = export_logs(&db, &today).await.unwrap();
        assert_eq!(events[0].content.len(), 503); // 500 + "..."
        assert!(events[0].content.ends_with("..."));

        db.close().await.unwrap();
    }

    #[test]
    fn truncate_handles_multibyte_boundaries() {
        let s = "日".repeat(600);
        let t = truncate_content(&s);
        assert_eq!(t.chars().count(), 503);
    }
}
