// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loaders built on Figment.
//!
//! Deployment settings merge compiled defaults, an optional
//! `promptgate.json`, and `PROMPTGATE_*` environment variables. The three
//! content documents are plain JSON files parsed directly.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use promptgate_core::PromptgateError;

use crate::model::{ActivityConfig, AppConfig, LevelsDocument, RewardsDocument};

/// Load deployment configuration.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `./promptgate.json` (if present)
/// 3. `PROMPTGATE_*` environment variables
pub fn load_app_config() -> Result<AppConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Json::file("promptgate.json"))
        .merge(env_provider())
        .extract()
}

/// Load deployment configuration from a JSON string only (no env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_app_config_from_str(json: &str) -> Result<AppConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Json::string(json))
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so key names containing
/// underscores stay unambiguous: `PROMPTGATE_TELEGRAM_BOT_TOKEN` must map
/// to `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("PROMPTGATE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("telegram_", "telegram.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("content_", "content.", 1);
        mapped.into()
    })
}

fn read_file(path: &Path) -> Result<String, PromptgateError> {
    std::fs::read_to_string(path).map_err(|e| {
        PromptgateError::Config(format!("failed to read {}: {e}", path.display()))
    })
}

/// Parse `activity.json`.
pub fn load_activity(path: &Path) -> Result<ActivityConfig, PromptgateError> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        PromptgateError::Config(format!("invalid activity config {}: {e}", path.display()))
    })
}

/// Parse `levels.json`.
pub fn load_levels(path: &Path) -> Result<LevelsDocument, PromptgateError> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        PromptgateError::Config(format!("invalid levels config {}: {e}", path.display()))
    })
}

/// Parse `rewards.json`.
pub fn load_rewards(path: &Path) -> Result<RewardsDocument, PromptgateError> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        PromptgateError::Config(format!("invalid rewards config {}: {e}", path.display()))
    })
}
