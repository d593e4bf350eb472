// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Game rules as pure functions: cooldowns, turn limits, input validation,
//! activity and reward time windows, and ban checks.

use chrono::{DateTime, Duration, Utc};
use promptgate_core::types::{Session, SessionState, User};
use promptgate_config::model::ActivityConfig;

/// Cooldown rules after a failed attempt.
pub mod cooldown {
    use super::*;

    /// Remaining cooldown seconds, or `None` when the session is not cooling.
    pub fn remaining(session: &Session, now: DateTime<Utc>) -> Option<i64> {
        if session.state != SessionState::Cooldown {
            return None;
        }
        let until = session.cooldown_until.as_deref()?;
        let until = DateTime::parse_from_rfc3339(until).ok()?;
        let secs = (until.with_timezone(&Utc) - now).num_seconds();
        if secs > 0 {
            Some(secs)
        } else {
            None
        }
    }

    /// Deadline after which a failed session may submit again.
    pub fn until(cooldown_seconds: i64, from: DateTime<Utc>) -> String {
        (from + Duration::seconds(cooldown_seconds)).to_rfc3339()
    }
}

/// Turn/attempt limits.
pub mod turns {
    use super::*;

    pub fn remaining(session: &Session, max_turns: i64) -> i64 {
        (max_turns - session.turn_count).max(0)
    }

    pub fn exhausted(session: &Session, max_turns: i64) -> bool {
        session.turn_count >= max_turns
    }
}

/// Input validation at admission time.
pub mod input {
    /// Maximum newlines allowed in one submission.
    const MAX_NEWLINES: usize = 100;
    /// Maximum run of one repeated character.
    const MAX_REPEAT_RUN: usize = 200;

    /// Validate a submission. Returns the trimmed text on success or a
    /// user-facing reason on rejection. No state is touched either way.
    pub fn validate(text: &str, max_chars: usize) -> Result<String, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err("input must not be empty".to_string());
        }

        let chars = trimmed.chars().count();
        if chars > max_chars {
            return Err(format!(
                "input too long: {chars} chars, limit is {max_chars}"
            ));
        }

        let newlines = trimmed.matches('\n').count();
        if newlines > MAX_NEWLINES {
            return Err(format!(
                "too many lines: limit is {MAX_NEWLINES} line breaks"
            ));
        }

        let mut run = 0usize;
        let mut last: Option<char> = None;
        for c in trimmed.chars() {
            if Some(c) == last {
                run += 1;
                if run > MAX_REPEAT_RUN {
                    return Err(format!(
                        "too many repeated characters: limit is {MAX_REPEAT_RUN} in a row"
                    ));
                }
            } else {
                run = 1;
                last = Some(c);
            }
        }

        Ok(trimmed.to_string())
    }
}

/// Activity and reward time windows.
pub mod window {
    use super::*;

    /// Whether the activity accepts submissions right now. Returns a
    /// user-facing reason when it does not.
    pub fn activity_active(config: &ActivityConfig, now: DateTime<Utc>) -> Result<(), String> {
        if !config.enabled {
            return Err("the activity is currently disabled".to_string());
        }
        if now < config.start_at {
            return Err(format!(
                "the activity has not started yet; it opens at {}",
                config.start_at.format("%Y-%m-%d %H:%M %:z")
            ));
        }
        if now > config.end_at {
            return Err("the activity has ended".to_string());
        }
        Ok(())
    }

    /// Whether rewards may be dispensed right now. Defaults to the
    /// activity window when no explicit reward window is configured.
    pub fn reward_active(config: &ActivityConfig, now: DateTime<Utc>) -> bool {
        let start = config.reward_start_at.unwrap_or(config.start_at);
        let end = config.reward_end_at.unwrap_or(config.end_at);
        now >= start && now <= end
    }
}

/// Ban checks.
pub mod ban {
    use super::*;

    /// Returns the user-facing ban notice when the user is banned.
    pub fn check(user: &User) -> Result<(), String> {
        if user.banned {
            let reason = user.ban_reason.as_deref().unwrap_or("policy violation");
            return Err(format!("you are banned: {reason}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session_with(state: SessionState, cooldown_until: Option<&str>) -> Session {
        Session {
            id: 1,
            user_id: 1,
            level_id: 1,
            state,
            turn_count: 0,
            inflight_task_id: None,
            cooldown_until: cooldown_until.map(|s| s.to_string()),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let session = session_with(SessionState::Cooldown, Some("2026-02-01T12:00:30+00:00"));
        assert_eq!(cooldown::remaining(&session, now), Some(30));

        // Expired cooldown.
        let later = Utc.with_ymd_and_hms(2026, 2, 1, 12, 1, 0).unwrap();
        assert_eq!(cooldown::remaining(&session, later), None);

        // Wrong state.
        let ready = session_with(SessionState::Ready, Some("2026-02-01T12:00:30+00:00"));
        assert_eq!(cooldown::remaining(&ready, now), None);

        // Missing deadline.
        let bare = session_with(SessionState::Cooldown, None);
        assert_eq!(cooldown::remaining(&bare, now), None);
    }

    #[test]
    fn cooldown_until_adds_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let until = cooldown::until(45, now);
        let parsed = DateTime::parse_from_rfc3339(&until).unwrap();
        assert_eq!((parsed.with_timezone(&Utc) - now).num_seconds(), 45);
    }

    #[test]
    fn turns_remaining_never_negative() {
        let mut session = session_with(SessionState::Ready, None);
        session.turn_count = 5;
        assert_eq!(turns::remaining(&session, 3), 0);
        assert!(turns::exhausted(&session, 3));
        session.turn_count = 1;
        assert_eq!(turns::remaining(&session, 3), 2);
        assert!(!turns::exhausted(&session, 3));
    }

    #[test]
    fn input_rejects_empty_and_whitespace() {
        assert!(input::validate("", 100).is_err());
        assert!(input::validate("   \n  ", 100).is_err());
    }

    #[test]
    fn input_enforces_char_limit_not_byte_limit() {
        // 10 CJK chars are 30 bytes but must pass a 10-char limit.
        let text = "关".repeat(10);
        assert!(input::validate(&text, 10).is_ok());
        assert!(input::validate(&text, 9).is_err());
    }

    #[test]
    fn input_trims_before_checking() {
        let ok = input::validate("  hello  ", 5).unwrap();
        assert_eq!(ok, "hello");
    }

    #[test]
    fn input_rejects_excessive_newlines_and_repeats() {
        let many_lines = "a\n".repeat(101);
        assert!(input::validate(&many_lines, 10_000).is_err());

        let repeat = "a".repeat(201);
        assert!(input::validate(&repeat, 10_000).is_err());
        let fine = "a".repeat(200);
        assert!(input::validate(&fine, 10_000).is_ok());
    }

    fn make_activity(enabled: bool) -> ActivityConfig {
        serde_json::from_str(&format!(
            r#"{{
                "activity_id": "a",
                "title": "t",
                "enabled": {enabled},
                "start_at": "2026-01-01T00:00:00+08:00",
                "end_at": "2026-03-01T00:00:00+08:00",
                "channel": {{ "name": "telegram" }},
                "global_limits": {{}},
                "llm": {{ "model": "m" }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn activity_window_bounds() {
        let config = make_activity(true);

        let before = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert!(window::activity_active(&config, before).is_err());

        let during = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert!(window::activity_active(&config, during).is_ok());

        let after = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        assert!(window::activity_active(&config, after).is_err());

        let disabled = make_activity(false);
        assert!(window::activity_active(&disabled, during).is_err());
    }

    #[test]
    fn reward_window_defaults_to_activity_window() {
        let mut config = make_activity(true);
        let during = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert!(window::reward_active(&config, during));

        // Explicit reward window narrower than the activity window.
        config.reward_start_at =
            Some(DateTime::parse_from_rfc3339("2026-02-10T00:00:00+08:00").unwrap());
        assert!(!window::reward_active(&config, during));
    }

    #[test]
    fn ban_notice_includes_reason() {
        let user = User {
            id: 1,
            telegram_user_id: 1,
            username: None,
            banned: true,
            ban_reason: Some("spamming".into()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let err = ban::check(&user).unwrap_err();
        assert!(err.contains("spamming"));
    }
}
