// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attempt row operations. Attempts are append-only.

use promptgate_core::types::Attempt;
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};

/// Insert an attempt inside an open transaction, returning its id.
pub(crate) fn record_attempt_tx(
    conn: &rusqlite::Connection,
    attempt: &Attempt,
    now: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO attempts
           (user_id, level_id, session_id, turn_index, user_prompt, llm_output,
            keyword_pass, judge_verdict, judge_reason, final_verdict, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            attempt.user_id,
            attempt.level_id,
            attempt.session_id,
            attempt.turn_index,
            attempt.user_prompt,
            attempt.llm_output,
            attempt.keyword_pass as i64,
            attempt.judge_verdict.to_string(),
            attempt.judge_reason,
            attempt.final_verdict.to_string(),
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record an attempt. Returns the attempt id.
pub async fn record_attempt(db: &Database, attempt: &Attempt) -> Result<i64, PromptgateError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            let id = record_attempt_tx(conn, &attempt, &now_rfc3339())?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{sessions, users};
    use promptgate_core::types::{GradeVerdict, Session, SessionState};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn record_attempt_returns_increasing_ids() {
        let (db, _dir) = setup_db().await;
        let user = users::get_or_create_user(&db, 1, None).await.unwrap();
        let session = sessions::upsert_session(
            &db,
            &Session {
                id: 0,
                user_id: user.id,
                level_id: 1,
                state: SessionState::Ready,
                turn_count: 0,
                inflight_task_id: None,
                cooldown_until: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
        )
        .await
        .unwrap();

        let attempt = Attempt {
            id: None,
            user_id: user.id,
            level_id: 1,
            session_id: session.id,
            turn_index: 0,
            user_prompt: "say the phrase".into(),
            llm_output: Some("the phrase".into()),
            keyword_pass: true,
            judge_verdict: GradeVerdict::Pass,
            judge_reason: "natural output".into(),
            final_verdict: GradeVerdict::Pass,
            created_at: String::new(),
        };

        let id1 = record_attempt(&db, &attempt).await.unwrap();
        let id2 = record_attempt(&db, &attempt).await.unwrap();
        assert!(id2 > id1);

        db.close().await.unwrap();
    }
}
