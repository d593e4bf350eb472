// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two multi-table transactions of the attempt lifecycle.
//!
//! `admit` is the anti-double-submit barrier: the session flip to INFLIGHT,
//! the queue-bound check, the pending-task insert, and the USER_IN event
//! commit together or not at all. `finalize` is its counterpart at the end
//! of an attempt: the attempt row, the optional reward claim with level
//! progress, the session update, the pending-task delete, and grade events
//! commit as one unit, so a crash at any point leaves a replayable state.

use promptgate_core::types::{AdmitOutcome, AdmitRequest, ClaimOutcome, FinalizeAttempt};
use promptgate_core::PromptgateError;
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};
use crate::queries::{attempts, logs, progress, rewards};

/// Atomic admission. The compare-and-set succeeds only from READY, which
/// makes a racing second submission observe `AlreadyInflight` instead of
/// enqueueing twice.
pub async fn admit(db: &Database, req: AdmitRequest) -> Result<AdmitOutcome, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();

            // Bound check first: a full queue must reject with no side
            // effects at all, including the session flip.
            let depth: i64 =
                tx.query_row("SELECT COUNT(*) FROM pending_tasks", [], |row| row.get(0))?;
            if depth >= req.queue_max_length {
                tx.commit()?;
                return Ok(AdmitOutcome::QueueFull);
            }

            let flipped = tx.execute(
                "UPDATE sessions
                 SET state = 'INFLIGHT', inflight_task_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND state = 'READY'",
                params![req.task.task_id, now, req.task.session_id],
            )?;
            if flipped == 0 {
                tx.commit()?;
                return Ok(AdmitOutcome::AlreadyInflight);
            }

            super::tasks::insert_task_tx(&tx, &req.task)?;
            logs::append_log_event_tx(&tx, &req.event, &now)?;

            tx.commit()?;
            Ok(AdmitOutcome::Queued { depth: depth + 1 })
        })
        .await
        .map_err(map_tr_err)
}

/// Atomic finalization of one attempt. Returns the claim outcome when a
/// reward was requested.
pub async fn finalize(
    db: &Database,
    req: FinalizeAttempt,
) -> Result<Option<ClaimOutcome>, PromptgateError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();

            attempts::record_attempt_tx(&tx, &req.attempt, &now)?;

            // A pass marks the level regardless of inventory; the claim
            // itself may still come back exhausted.
            if req.mark_passed {
                progress::mark_level_passed_tx(
                    &tx,
                    req.attempt.user_id,
                    req.attempt.level_id,
                    req.attempt.turn_index + 1,
                    &now,
                )?;
            }
            let claim = match &req.claim_pool_id {
                Some(pool_id) => Some(rewards::claim_reward_tx(
                    &tx,
                    pool_id,
                    req.attempt.user_id,
                    req.attempt.level_id,
                    &now,
                )?),
                None => None,
            };

            tx.execute(
                "UPDATE sessions
                 SET state = ?1, turn_count = ?2, inflight_task_id = NULL,
                     cooldown_until = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    req.session.state.to_string(),
                    req.session.turn_count,
                    req.session.cooldown_until,
                    now,
                    req.session.id,
                ],
            )?;

            tx.execute(
                "DELETE FROM pending_tasks WHERE task_id = ?1",
                params![req.task_id],
            )?;

            for event in &req.events {
                logs::append_log_event_tx(&tx, event, &now)?;
            }

            tx.commit()?;
            Ok(claim)
        })
        .await
        .map_err(map_tr_err)
}
