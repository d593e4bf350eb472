// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-attempt orchestration: LLM generation, grading, reward claim, state
//! transition, and the user-facing reply.
//!
//! Workers call [`GameEngine::process_task`] with a dequeued task. The
//! grade outcome, the claim, the session transition, and the pending-task
//! delete commit in one storage transaction; only the LLM calls and the
//! outbound sends sit outside it.

use std::sync::Arc;

use chrono::Utc;
use promptgate_config::model::{JudgeErrorStrategy, LevelConfig};
use promptgate_config::ContentProvider;
use promptgate_core::types::{
    Attempt, ClaimOutcome, EventType, FinalizeAttempt, GradeResult, GradeVerdict, NewLogEvent,
    Session, SessionState, TaskPayload,
};
use promptgate_core::{ChannelAdapter, LlmClient, PromptgateError, StorageAdapter};
use tracing::{error, info, warn};

use crate::grader::CompositeGrader;
use crate::messages;
use crate::policies::{cooldown, turns, window};
use crate::toggles::RuntimeToggles;

/// The attempt-processing engine.
pub struct GameEngine {
    storage: Arc<dyn StorageAdapter>,
    content: Arc<dyn ContentProvider>,
    llm: Arc<dyn LlmClient>,
    channel: Arc<dyn ChannelAdapter>,
    toggles: Arc<RuntimeToggles>,
    grader: CompositeGrader,
}

impl GameEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        content: Arc<dyn ContentProvider>,
        llm: Arc<dyn LlmClient>,
        channel: Arc<dyn ChannelAdapter>,
        toggles: Arc<RuntimeToggles>,
    ) -> Self {
        let grader = CompositeGrader::new(llm.clone());
        Self {
            storage,
            content,
            llm,
            channel,
            toggles,
            grader,
        }
    }

    /// Process one dequeued task to a terminal state.
    ///
    /// Never panics the worker: internal failures release the session back
    /// to READY without consuming the turn and delete the task row so a
    /// poisoned payload cannot cause a replay storm.
    pub async fn process_task(&self, task: TaskPayload) {
        if let Err(e) = self.run_task(&task).await {
            error!(
                trace_id = task.task_id.as_str(),
                error = %e,
                "task processing failed"
            );
            self.recover_failed_task(&task).await;
        }
    }

    async fn run_task(&self, task: &TaskPayload) -> Result<(), PromptgateError> {
        let trace_id = task.task_id.as_str();

        let Some(level) = self.content.level(task.level_id) else {
            return Err(PromptgateError::Internal(format!(
                "level {} not found in content config",
                task.level_id
            )));
        };

        let Some(session) = self
            .storage
            .get_session(task.user_id, task.level_id)
            .await?
        else {
            // No session means nothing to transition; drop the orphan task.
            warn!(trace_id, "session missing for task, dropping");
            self.log_dropped_task(task, "session missing for task").await;
            self.storage.delete_pending_task(&task.task_id).await?;
            return Ok(());
        };

        // Idempotent recovery path: only the task holding the inflight lock
        // may transition the session. Anything else is a stale replay.
        if session.state != SessionState::Inflight
            || session.inflight_task_id.as_deref() != Some(trace_id)
        {
            warn!(
                trace_id,
                state = %session.state,
                "session not inflight for this task, dropping"
            );
            self.log_dropped_task(task, "session not inflight for this task")
                .await;
            self.storage.delete_pending_task(&task.task_id).await?;
            return Ok(());
        }

        // LLM generation. Errors here are transient: the turn is not
        // consumed and the user is asked to retry.
        let generation = self
            .llm
            .generate(
                &level.prompt.system_prompt,
                &task.user_prompt,
                level.limits.max_output_tokens,
                level.generate_model.as_deref(),
            )
            .await;

        let llm_result = match generation {
            Ok(result) => result,
            Err(e) => {
                warn!(trace_id, error = %e, "LLM generation failed, not counting turn");
                self.finalize_transient(task, &session, None, format!("llm generate failed: {e}"))
                    .await?;
                return Ok(());
            }
        };

        self.storage
            .append_log_event(&NewLogEvent {
                trace_id: trace_id.to_string(),
                event_type: EventType::LlmCall,
                telegram_user_id: task.telegram_user_id,
                chat_id: task.chat_id,
                level_id: Some(task.level_id),
                session_id: Some(task.session_id),
                turn_index: Some(session.turn_count),
                content: llm_result.output.clone(),
                metadata: Some(
                    serde_json::json!({
                        "model": llm_result.model,
                        "latency_ms": llm_result.latency_ms,
                    })
                    .to_string(),
                ),
            })
            .await?;

        let grade = self
            .grader
            .grade(&level, &task.user_prompt, &llm_result.output)
            .await;

        if grade.judge_verdict == GradeVerdict::Error {
            let strategy = self.content.activity().judge_error_strategy;
            if strategy == JudgeErrorStrategy::FailNoCount {
                warn!(trace_id, reason = grade.judge_reason.as_str(), "judge error, not counting turn");
                self.finalize_transient(
                    task,
                    &session,
                    Some((&grade, llm_result.output.as_str())),
                    format!("judge error: {}", grade.judge_reason),
                )
                .await?;
                return Ok(());
            }
            // count_as_fail: fall through, final verdict is already FAIL.
        }

        let attempt = Attempt {
            id: None,
            user_id: task.user_id,
            level_id: task.level_id,
            session_id: task.session_id,
            turn_index: session.turn_count,
            user_prompt: task.user_prompt.clone(),
            llm_output: Some(llm_result.output.clone()),
            keyword_pass: grade.keyword_pass,
            judge_verdict: grade.judge_verdict,
            judge_reason: grade.judge_reason.clone(),
            final_verdict: grade.final_verdict,
            created_at: String::new(),
        };

        info!(
            trace_id,
            user_id = task.user_id,
            level_id = task.level_id,
            verdict = %grade.final_verdict,
            "attempt graded"
        );

        match grade.final_verdict {
            GradeVerdict::Pass => self.handle_pass(task, &session, &level, attempt, &grade).await,
            _ => self.handle_fail(task, &session, &level, attempt, &grade).await,
        }
    }

    async fn handle_pass(
        &self,
        task: &TaskPayload,
        session: &Session,
        level: &LevelConfig,
        attempt: Attempt,
        grade: &GradeResult,
    ) -> Result<(), PromptgateError> {
        let activity = self.content.activity();
        // An admin override pins payout on or off; otherwise the reward
        // window decides.
        let reward_active = match self.toggles.reward_override() {
            Some(forced) => forced,
            None => window::reward_active(&activity, Utc::now()),
        };
        let pool = self.content.reward_pool(&level.reward_pool_id);
        let pool_open = pool.as_ref().map(|p| p.enabled).unwrap_or(false);

        let mut target = session.clone();
        target.state = SessionState::Passed;
        target.cooldown_until = None;

        let claim = self
            .storage
            .finalize_attempt(FinalizeAttempt {
                task_id: task.task_id.clone(),
                attempt: attempt.clone(),
                session: target,
                mark_passed: true,
                claim_pool_id: (reward_active && pool_open)
                    .then(|| level.reward_pool_id.clone()),
                events: vec![self.grade_event(task, session, grade)],
            })
            .await?;

        if let Some(outcome) = &claim {
            let (result, item_id) = match outcome {
                ClaimOutcome::Success { item_id, .. } => ("SUCCESS", Some(item_id.clone())),
                ClaimOutcome::AlreadyClaimed { .. } => ("ALREADY_CLAIMED", None),
                ClaimOutcome::PoolExhausted => ("POOL_EXHAUSTED", None),
            };
            // Item id only; the code itself never reaches the audit log.
            self.storage
                .append_log_event(&NewLogEvent {
                    trace_id: task.task_id.clone(),
                    event_type: EventType::RewardClaim,
                    telegram_user_id: task.telegram_user_id,
                    chat_id: task.chat_id,
                    level_id: Some(task.level_id),
                    session_id: Some(task.session_id),
                    turn_index: Some(session.turn_count),
                    content: format!("result={result}"),
                    metadata: Some(
                        serde_json::json!({
                            "pool_id": level.reward_pool_id,
                            "item_id": item_id,
                            "result": result,
                        })
                        .to_string(),
                    ),
                })
                .await?;
        }

        let mut reply = messages::pass_header(
            level.level_id,
            &level.name,
            attempt.llm_output.as_deref().unwrap_or_default(),
        );

        if reward_active {
            match &claim {
                Some(ClaimOutcome::Success { code, .. }) => {
                    if let Some(pool) = &pool {
                        let username = task.username.as_deref().unwrap_or("player");
                        reply.push('\n');
                        reply.push_str(&messages::render_reward_template(
                            &pool.send_message_template,
                            code,
                            level.level_id,
                            &level.name,
                            username,
                        ));
                    }
                }
                Some(ClaimOutcome::AlreadyClaimed { code }) => {
                    reply.push('\n');
                    reply.push_str(&messages::reward_already_claimed(code));
                }
                Some(ClaimOutcome::PoolExhausted) => {
                    reply.push('\n');
                    reply.push_str(messages::reward_exhausted());
                }
                None => {
                    // Pool disabled or missing from config.
                    reply.push('\n');
                    reply.push_str(messages::reward_pool_closed());
                }
            }
        }

        // Next level hint: its session is created lazily on first contact.
        let next_level = self.content.level(level.level_id + 1);
        match &next_level {
            Some(_) => {
                reply.push_str("\n\n");
                reply.push_str(messages::next_level_unlocked());
            }
            None => {
                reply.push_str("\n\n");
                reply.push_str(messages::all_levels_passed());
            }
        }

        self.send_to_user(task, session, &reply).await;
        if let Some(next) = next_level {
            self.send_to_user(task, session, &next.prompt.intro_message)
                .await;
        }
        Ok(())
    }

    async fn handle_fail(
        &self,
        task: &TaskPayload,
        session: &Session,
        level: &LevelConfig,
        attempt: Attempt,
        grade: &GradeResult,
    ) -> Result<(), PromptgateError> {
        let mut target = session.clone();
        target.turn_count = session.turn_count + 1;

        let remaining = turns::remaining(&target, level.limits.max_turns);
        if remaining <= 0 {
            target.state = SessionState::FailedOut;
            target.cooldown_until = None;
        } else {
            target.state = SessionState::Cooldown;
            target.cooldown_until = Some(cooldown::until(
                level.limits.cooldown_seconds_after_fail,
                Utc::now(),
            ));
        }

        self.storage
            .finalize_attempt(FinalizeAttempt {
                task_id: task.task_id.clone(),
                attempt: attempt.clone(),
                session: target,
                mark_passed: false,
                claim_pool_id: None,
                events: vec![self.grade_event(task, session, grade)],
            })
            .await?;

        let reply = messages::fail_body(
            attempt.llm_output.as_deref().unwrap_or_default(),
            !grade.keyword_pass,
            remaining,
            level.limits.cooldown_seconds_after_fail,
        );
        self.send_to_user(task, session, &reply).await;
        Ok(())
    }

    /// Transient failure: record the attempt with a FAIL/ERROR verdict,
    /// return the session to READY without consuming the turn, and drop the
    /// task, all in one transaction.
    async fn finalize_transient(
        &self,
        task: &TaskPayload,
        session: &Session,
        grade: Option<(&GradeResult, &str)>,
        reason: String,
    ) -> Result<(), PromptgateError> {
        let (keyword_pass, llm_output) = match grade {
            Some((g, output)) => (g.keyword_pass, Some(output.to_string())),
            None => (false, None),
        };

        let attempt = Attempt {
            id: None,
            user_id: task.user_id,
            level_id: task.level_id,
            session_id: task.session_id,
            turn_index: session.turn_count,
            user_prompt: task.user_prompt.clone(),
            llm_output,
            keyword_pass,
            judge_verdict: GradeVerdict::Error,
            judge_reason: reason.clone(),
            final_verdict: GradeVerdict::Fail,
            created_at: String::new(),
        };

        let mut target = session.clone();
        target.state = SessionState::Ready;
        target.cooldown_until = None;

        self.storage
            .finalize_attempt(FinalizeAttempt {
                task_id: task.task_id.clone(),
                attempt,
                session: target,
                mark_passed: false,
                claim_pool_id: None,
                events: vec![NewLogEvent {
                    trace_id: task.task_id.clone(),
                    event_type: EventType::Error,
                    telegram_user_id: task.telegram_user_id,
                    chat_id: task.chat_id,
                    level_id: Some(task.level_id),
                    session_id: Some(task.session_id),
                    turn_index: Some(session.turn_count),
                    content: reason,
                    metadata: None,
                }],
            })
            .await?;

        self.send_to_user(task, session, messages::system_busy_not_counted())
            .await;
        Ok(())
    }

    /// Last-resort cleanup after an internal error: release the session,
    /// drop the task to avoid a replay storm, tell the user to retry.
    async fn recover_failed_task(&self, task: &TaskPayload) {
        if let Ok(Some(session)) = self
            .storage
            .get_session(task.user_id, task.level_id)
            .await
        {
            if session.state == SessionState::Inflight
                && session.inflight_task_id.as_deref() == Some(task.task_id.as_str())
            {
                let mut released = session.clone();
                released.state = SessionState::Ready;
                released.inflight_task_id = None;
                if let Err(e) = self.storage.upsert_session(&released).await {
                    error!(trace_id = task.task_id.as_str(), error = %e, "failed to release session");
                }
            }
        }
        if let Err(e) = self.storage.delete_pending_task(&task.task_id).await {
            error!(trace_id = task.task_id.as_str(), error = %e, "failed to delete task row");
        }
        let _ = self
            .storage
            .append_log_event(&NewLogEvent {
                trace_id: task.task_id.clone(),
                event_type: EventType::Error,
                telegram_user_id: task.telegram_user_id,
                chat_id: task.chat_id,
                level_id: Some(task.level_id),
                session_id: Some(task.session_id),
                turn_index: None,
                content: "internal error while processing task".to_string(),
                metadata: None,
            })
            .await;
        self.send_to_user_raw(task, messages::processing_error()).await;
    }

    async fn log_dropped_task(&self, task: &TaskPayload, reason: &str) {
        let _ = self
            .storage
            .append_log_event(&NewLogEvent {
                trace_id: task.task_id.clone(),
                event_type: EventType::Error,
                telegram_user_id: task.telegram_user_id,
                chat_id: task.chat_id,
                level_id: Some(task.level_id),
                session_id: Some(task.session_id),
                turn_index: None,
                content: reason.to_string(),
                metadata: None,
            })
            .await;
    }

    fn grade_event(
        &self,
        task: &TaskPayload,
        session: &Session,
        grade: &GradeResult,
    ) -> NewLogEvent {
        let keyword = if grade.keyword_pass { "PASS" } else { "FAIL" };
        NewLogEvent {
            trace_id: task.task_id.clone(),
            event_type: EventType::Grade,
            telegram_user_id: task.telegram_user_id,
            chat_id: task.chat_id,
            level_id: Some(task.level_id),
            session_id: Some(task.session_id),
            turn_index: Some(session.turn_count),
            content: format!(
                "keyword={keyword}, judge={}, final={}",
                grade.judge_verdict, grade.final_verdict
            ),
            metadata: Some(
                serde_json::json!({
                    "keyword_reason": grade.keyword_reason,
                    "judge_reason": grade.judge_reason,
                })
                .to_string(),
            ),
        }
    }

    async fn send_to_user(&self, task: &TaskPayload, session: &Session, text: &str) {
        if let Err(e) = self.channel.send(task.chat_id, text).await {
            error!(trace_id = task.task_id.as_str(), error = %e, "outbound send failed");
            return;
        }
        let _ = self
            .storage
            .append_log_event(&NewLogEvent {
                trace_id: task.task_id.clone(),
                event_type: EventType::SystemOut,
                telegram_user_id: task.telegram_user_id,
                chat_id: task.chat_id,
                level_id: Some(task.level_id),
                session_id: Some(task.session_id),
                turn_index: Some(session.turn_count),
                content: text.to_string(),
                metadata: None,
            })
            .await;
    }

    async fn send_to_user_raw(&self, task: &TaskPayload, text: &str) {
        if let Err(e) = self.channel.send(task.chat_id, text).await {
            error!(trace_id = task.task_id.as_str(), error = %e, "outbound send failed");
        }
    }
}
