// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Promptgate activity engine.
//!
//! Two families of configuration exist:
//!
//! - [`AppConfig`]: deployment settings (tokens, paths, log level), loaded
//!   from an optional `promptgate.json` with `PROMPTGATE_*` env overrides.
//! - The three content documents (`activity.json`, `levels.json`,
//!   `rewards.json`) describing the running activity. These are reloadable
//!   at runtime via the admin surface.
//!
//! Content structs use `#[serde(deny_unknown_fields)]` so typos in config
//! keys fail loudly at load time.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// --- Deployment configuration ---

/// Top-level deployment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub llm: LlmApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub content: ContentPaths,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            llm: LlmApiConfig::default(),
            storage: StorageConfig::default(),
            content: ContentPaths::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram bot deployment settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables the Telegram adapter.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Telegram user ids allowed to run admin commands.
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
}

/// LLM API endpoint settings (the model itself comes from activity.json).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmApiConfig {
    /// API key. `None` requires an environment override before serving.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for LlmApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "promptgate.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Paths of the three content documents.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContentPaths {
    #[serde(default = "default_activity_path")]
    pub activity_path: String,
    #[serde(default = "default_levels_path")]
    pub levels_path: String,
    #[serde(default = "default_rewards_path")]
    pub rewards_path: String,
}

impl Default for ContentPaths {
    fn default() -> Self {
        Self {
            activity_path: default_activity_path(),
            levels_path: default_levels_path(),
            rewards_path: default_rewards_path(),
        }
    }
}

fn default_activity_path() -> String {
    "config/activity.json".to_string()
}

fn default_levels_path() -> String {
    "config/levels.json".to_string()
}

fn default_rewards_path() -> String {
    "config/rewards.json".to_string()
}

// --- Activity document ---

/// `activity.json`: identity, time window, and global limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub activity_id: String,
    pub title: String,
    pub enabled: bool,
    /// Activity window bounds carry their own UTC offsets; comparisons
    /// happen in absolute time with no implicit conversion.
    pub start_at: DateTime<FixedOffset>,
    pub end_at: DateTime<FixedOffset>,
    /// Optional reward window; defaults to the activity window.
    #[serde(default)]
    pub reward_start_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub reward_end_at: Option<DateTime<FixedOffset>>,
    pub channel: ChannelConfig,
    pub global_limits: GlobalLimits,
    pub llm: LlmConfig,
    /// What a judge ERROR does to the attempt.
    #[serde(default)]
    pub judge_error_strategy: JudgeErrorStrategy,
}

/// Channel section of the activity document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub bot_display_name: Option<String>,
}

/// Global concurrency and queue limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalLimits {
    #[serde(default = "default_max_inflight")]
    pub max_inflight_per_user: i64,
    #[serde(default = "default_queue_max_length")]
    pub queue_max_length: i64,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_max_inflight() -> i64 {
    1
}

fn default_queue_max_length() -> i64 {
    20_000
}

fn default_worker_concurrency() -> usize {
    8
}

/// LLM section of the activity document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_output_tokens")]
    pub default_max_output_tokens: u32,
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_max_output_tokens() -> u32 {
    256
}

/// How a malformed or failed judge call affects the attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeErrorStrategy {
    /// Transient: the turn is not consumed and the session returns to READY.
    #[default]
    FailNoCount,
    /// Count the attempt as a normal FAIL.
    CountAsFail,
}

// --- Levels document ---

/// `levels.json` root.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LevelsDocument {
    pub levels: Vec<LevelConfig>,
}

/// One ordered challenge level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    pub level_id: i64,
    pub name: String,
    pub enabled: bool,
    pub prompt: PromptConfig,
    pub limits: LevelLimits,
    pub grading: GradingConfig,
    pub reward_pool_id: String,
    /// Optional per-level generation model override.
    #[serde(default)]
    pub generate_model: Option<String>,
}

/// System prompt and user-facing intro for one level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub intro_message: String,
}

/// Per-level limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LevelLimits {
    pub max_input_chars: usize,
    pub max_turns: i64,
    pub cooldown_seconds_after_fail: i64,
    pub max_output_tokens: u32,
}

/// Composite grading configuration for one level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GradingConfig {
    pub keyword: KeywordGradingConfig,
    pub judge: JudgeGradingConfig,
}

/// Keyword stage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordGradingConfig {
    pub target_phrase: String,
    pub match_policy: MatchPolicy,
}

/// How the target phrase is matched against the LLM output.
///
/// Required per level; there is deliberately no global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    ExactSubstring,
    CaseInsensitiveSubstring,
    Regex,
}

/// Judge stage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JudgeGradingConfig {
    #[serde(default = "default_judge_enabled")]
    pub enabled: bool,
    #[serde(default = "default_judge_policy")]
    pub policy: String,
    /// Optional per-level judge model override.
    #[serde(default)]
    pub judge_model: Option<String>,
}

fn default_judge_enabled() -> bool {
    true
}

fn default_judge_policy() -> String {
    "pass_if_intended_and_not_refusal".to_string()
}

// --- Rewards document ---

/// `rewards.json` root.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewardsDocument {
    pub reward_pools: Vec<RewardPoolConfig>,
}

/// A pool of interchangeable reward items backing one level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewardPoolConfig {
    pub pool_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub enabled: bool,
    /// Rendered with `{reward_code}`, `{level_id}`, `{level_name}`, `{username}`.
    pub send_message_template: String,
    pub items: Vec<RewardItemConfig>,
}

/// One configured reward item.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewardItemConfig {
    pub item_id: String,
    pub kind: promptgate_core::types::RewardKind,
    pub code: String,
    pub max_claims_per_item: i64,
}
