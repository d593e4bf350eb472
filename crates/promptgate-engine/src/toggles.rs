// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime switches the admin surface can flip without a config reload.

use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};

/// Process-wide toggles layered on top of the content config. The
/// effective activity state is this switch AND the config's `enabled` flag
/// AND the time window. The reward override, when set, replaces the
/// reward-window check entirely so payout can be frozen or forced while
/// the activity keeps running.
pub struct RuntimeToggles {
    activity_enabled: AtomicBool,
    // -1 = follow the reward window, 0 = forced off, 1 = forced on.
    reward_override: AtomicI8,
}

impl RuntimeToggles {
    pub fn new(activity_enabled: bool) -> Self {
        Self {
            activity_enabled: AtomicBool::new(activity_enabled),
            reward_override: AtomicI8::new(-1),
        }
    }

    pub fn activity_enabled(&self) -> bool {
        self.activity_enabled.load(Ordering::Relaxed)
    }

    pub fn set_activity_enabled(&self, enabled: bool) {
        self.activity_enabled.store(enabled, Ordering::Relaxed);
    }

    /// `Some(forced)` when an admin pinned reward payout on or off;
    /// `None` to follow the configured reward window.
    pub fn reward_override(&self) -> Option<bool> {
        match self.reward_override.load(Ordering::Relaxed) {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    pub fn set_reward_override(&self, forced: Option<bool>) {
        let value = match forced {
            Some(false) => 0,
            Some(true) => 1,
            None => -1,
        };
        self.reward_override.store(value, Ordering::Relaxed);
    }
}
