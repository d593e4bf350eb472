// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Promptgate engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Llm,
    Storage,
    Content,
}

/// State of a per-(user, level) session.
///
/// At most one session per user may be `Inflight` at any instant; the
/// admission front enforces this with a compare-and-set state flip.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[strum(serialize = "READY")]
    Ready,
    #[strum(serialize = "INFLIGHT")]
    Inflight,
    #[strum(serialize = "COOLDOWN")]
    Cooldown,
    #[strum(serialize = "PASSED")]
    Passed,
    #[strum(serialize = "FAILED_OUT")]
    FailedOut,
}

/// Verdict from a grading stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeVerdict {
    #[strum(serialize = "PASS")]
    Pass,
    #[strum(serialize = "FAIL")]
    Fail,
    /// The judge produced output that could not be parsed, or the call failed.
    #[strum(serialize = "ERROR")]
    Error,
}

/// Kind of a reward item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardKind {
    #[strum(serialize = "ALIPAY_CODE")]
    AlipayCode,
    /// Single-use e-card; `max_claims` is always 1.
    #[strum(serialize = "JD_ECARD")]
    JdEcard,
}

/// Audit log event types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    #[strum(serialize = "USER_IN")]
    UserIn,
    #[strum(serialize = "SYSTEM_OUT")]
    SystemOut,
    #[strum(serialize = "LLM_CALL")]
    LlmCall,
    #[strum(serialize = "GRADE")]
    Grade,
    #[strum(serialize = "REWARD_CLAIM")]
    RewardClaim,
    #[strum(serialize = "ERROR")]
    Error,
}

// --- Persisted rows ---

/// A participant. Created on first contact, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Internal autoincrement key.
    pub id: i64,
    /// Channel-scoped identity.
    pub telegram_user_id: i64,
    pub username: Option<String>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Per-(user, level) progress record with the attempt state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub level_id: i64,
    pub state: SessionState,
    /// Number of graded (counted) attempts so far, 0..max_turns.
    pub turn_count: i64,
    /// Task holding the inflight lock, if any.
    pub inflight_task_id: Option<String>,
    /// ISO 8601 timestamp until which submissions are refused after a fail.
    pub cooldown_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable record of one submit-and-grade cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Option<i64>,
    pub user_id: i64,
    pub level_id: i64,
    pub session_id: i64,
    /// Value of the session's turn counter when this attempt was graded.
    pub turn_index: i64,
    pub user_prompt: String,
    pub llm_output: Option<String>,
    pub keyword_pass: bool,
    pub judge_verdict: GradeVerdict,
    pub judge_reason: String,
    /// PASS iff keyword matched and the judge said PASS.
    pub final_verdict: GradeVerdict,
    pub created_at: String,
}

/// Record of a user having passed a level. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelProgress {
    pub id: i64,
    pub user_id: i64,
    pub level_id: i64,
    pub turns_used: i64,
    pub passed_at: String,
}

/// One dispensable reward as stored, synced from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardItem {
    pub id: i64,
    pub pool_id: String,
    pub item_id: String,
    pub kind: RewardKind,
    /// Opaque reward code; never written to log event content.
    pub code: String,
    pub max_claims: i64,
    pub claimed_count: i64,
    /// Items absent from a reloaded config are disabled, not deleted.
    pub enabled: bool,
}

/// The award a user received for a level. Unique on (user_id, level_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardClaim {
    pub id: i64,
    pub user_id: i64,
    pub level_id: i64,
    pub pool_id: String,
    pub item_id: String,
    /// Code copied at claim time so later config edits stay auditable.
    pub code_snapshot: String,
    pub claimed_at: String,
}

/// Durable queue row; mirrors the in-memory FIFO for crash recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// UUID; doubles as the trace id linking all log events of the attempt.
    pub task_id: String,
    pub user_id: i64,
    pub telegram_user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    pub username: Option<String>,
    pub level_id: i64,
    pub session_id: i64,
    pub user_prompt: String,
    pub enqueued_at: String,
}

/// Append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: i64,
    pub trace_id: String,
    pub event_type: EventType,
    pub telegram_user_id: i64,
    pub chat_id: i64,
    pub level_id: Option<i64>,
    pub session_id: Option<i64>,
    pub turn_index: Option<i64>,
    /// Truncated to 500 chars at write time. Reward codes never appear here.
    pub content: String,
    pub metadata: Option<String>,
    pub created_at: String,
}

/// A log event to be appended (no id/timestamp yet).
#[derive(Debug, Clone)]
pub struct NewLogEvent {
    pub trace_id: String,
    pub event_type: EventType,
    pub telegram_user_id: i64,
    pub chat_id: i64,
    pub level_id: Option<i64>,
    pub session_id: Option<i64>,
    pub turn_index: Option<i64>,
    pub content: String,
    pub metadata: Option<String>,
}

// --- Channel types ---

/// An inbound message received from the channel adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub telegram_user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub username: Option<String>,
    /// ISO 8601 receive timestamp.
    pub timestamp: String,
}

// --- LLM types ---

/// Result of an LLM generation call.
#[derive(Debug, Clone)]
pub struct LlmResult {
    pub output: String,
    pub model: String,
    pub latency_ms: i64,
}

// --- Grading types ---

/// Combined result of the keyword stage and the judge stage.
#[derive(Debug, Clone)]
pub struct GradeResult {
    pub keyword_pass: bool,
    pub keyword_reason: String,
    pub judge_verdict: GradeVerdict,
    pub judge_reason: String,
    pub final_verdict: GradeVerdict,
}

// --- Storage operation payloads ---

/// Outcome of the atomic reward-claim protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// An item was charged to (user, level).
    Success {
        item_id: String,
        code: String,
        kind: RewardKind,
    },
    /// A claim row already exists for (user, level); carries its code so the
    /// engine can remind the user.
    AlreadyClaimed { code: String },
    /// No enabled item in the pool has headroom left.
    PoolExhausted,
}

/// Request for the atomic admission step: flip the session to INFLIGHT,
/// persist the pending task, and append the USER_IN log event in one
/// transaction.
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub task: TaskPayload,
    /// Bound on pending tasks; exceeding it rejects without side effects.
    pub queue_max_length: i64,
    pub event: NewLogEvent,
}

/// Outcome of the atomic admission step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Task persisted; `depth` is the pending-task count at enqueue time.
    Queued { depth: i64 },
    /// The compare-and-set flip lost: another submission is already inflight.
    AlreadyInflight,
    /// The pending-task bound was reached.
    QueueFull,
}

/// Request for the single-transaction attempt finalization: attempt row,
/// optional reward claim + level progress, session update, pending-task
/// delete, and grade log events all commit together.
#[derive(Debug, Clone)]
pub struct FinalizeAttempt {
    pub task_id: String,
    pub attempt: Attempt,
    /// Session with its post-attempt state already applied.
    pub session: Session,
    /// Insert the level-progress row (idempotent). A pass sets this even
    /// when no claim runs, e.g. outside the reward window.
    pub mark_passed: bool,
    /// `Some(pool_id)` runs the claim protocol for this level's pool.
    pub claim_pool_id: Option<String>,
    pub events: Vec<NewLogEvent>,
}

/// Aggregate counters for the admin stats surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub total_users: i64,
    pub pending_tasks: i64,
    pub today_attempts: i64,
    pub today_claims: i64,
    pub passed_by_level: Vec<(i64, i64)>,
    pub pool_stock: Vec<PoolStock>,
}

/// Remaining inventory for one reward pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStock {
    pub pool_id: String,
    pub total: i64,
    pub claimed: i64,
}
