// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-document validation for the three content configs.
//!
//! Runs at startup and before every admin-triggered reload; a reload with
//! any error is rejected wholesale.

use promptgate_core::types::RewardKind;

use crate::model::{ActivityConfig, LevelsDocument, RewardsDocument};

/// Validate the three content documents against each other.
///
/// Returns every problem found rather than stopping at the first, so an
/// operator can fix a config in one pass.
pub fn validate_content(
    activity: &ActivityConfig,
    levels: &LevelsDocument,
    rewards: &RewardsDocument,
) -> Vec<String> {
    let mut errors = Vec::new();

    // Level ids must be contiguous from 1.
    let mut ids: Vec<i64> = levels.levels.iter().map(|l| l.level_id).collect();
    ids.sort_unstable();
    let expected: Vec<i64> = (1..=levels.levels.len() as i64).collect();
    if ids != expected {
        errors.push(format!("level ids must be contiguous from 1, got {ids:?}"));
    }

    // Every referenced reward pool must exist.
    let pool_ids: std::collections::HashSet<&str> = rewards
        .reward_pools
        .iter()
        .map(|p| p.pool_id.as_str())
        .collect();
    for level in &levels.levels {
        if !pool_ids.contains(level.reward_pool_id.as_str()) {
            errors.push(format!(
                "level {} references non-existent reward pool {}",
                level.level_id, level.reward_pool_id
            ));
        }
    }

    // Item constraints: JD_ECARD is strictly one-shot; ALIPAY_CODE needs
    // at least one claim of headroom.
    for pool in &rewards.reward_pools {
        for item in &pool.items {
            match item.kind {
                RewardKind::JdEcard if item.max_claims_per_item != 1 => {
                    errors.push(format!(
                        "JD_ECARD item {} in pool {} must have max_claims_per_item=1, got {}",
                        item.item_id, pool.pool_id, item.max_claims_per_item
                    ));
                }
                RewardKind::AlipayCode if item.max_claims_per_item < 1 => {
                    errors.push(format!(
                        "ALIPAY_CODE item {} in pool {} must have max_claims_per_item >= 1, got {}",
                        item.item_id, pool.pool_id, item.max_claims_per_item
                    ));
                }
                _ => {}
            }
        }
    }

    // Per-level limits must be sane.
    for level in &levels.levels {
        let limits = &level.limits;
        if limits.max_input_chars == 0 {
            errors.push(format!("level {}: max_input_chars must be positive", level.level_id));
        }
        if limits.max_turns <= 0 {
            errors.push(format!("level {}: max_turns must be positive", level.level_id));
        }
        if limits.cooldown_seconds_after_fail < 0 {
            errors.push(format!(
                "level {}: cooldown_seconds_after_fail must be non-negative",
                level.level_id
            ));
        }
        if limits.max_output_tokens == 0 {
            errors.push(format!(
                "level {}: max_output_tokens must be positive",
                level.level_id
            ));
        }
    }

    // Global limits.
    let gl = &activity.global_limits;
    if gl.max_inflight_per_user != 1 {
        errors.push(format!(
            "global_limits.max_inflight_per_user must be 1, got {}",
            gl.max_inflight_per_user
        ));
    }
    if gl.queue_max_length <= 0 {
        errors.push("global_limits.queue_max_length must be positive".to_string());
    }
    if gl.worker_concurrency == 0 {
        errors.push("global_limits.worker_concurrency must be positive".to_string());
    }

    if activity.end_at <= activity.start_at {
        errors.push("activity end_at must be after start_at".to_string());
    }

    errors
}
