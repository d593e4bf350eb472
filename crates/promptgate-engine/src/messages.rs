// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing reply texts and reward template rendering.

/// Render a reward pool's `send_message_template`.
///
/// Recognized placeholders: `{reward_code}`, `{level_id}`, `{level_name}`,
/// `{username}`. Unknown placeholders pass through untouched.
pub fn render_reward_template(
    template: &str,
    reward_code: &str,
    level_id: i64,
    level_name: &str,
    username: &str,
) -> String {
    template
        .replace("{reward_code}", reward_code)
        .replace("{level_id}", &level_id.to_string())
        .replace("{level_name}", level_name)
        .replace("{username}", username)
}

pub fn queued(ahead: i64) -> String {
    format!("Answer received! Queued for grading (about {ahead} ahead of you). Hang tight...")
}

pub fn still_processing() -> &'static str {
    "Your previous answer is still being graded, please wait..."
}

pub fn cooldown_wait(seconds: i64) -> String {
    format!("Cooling down -- try again in {seconds} s.")
}

pub fn already_passed() -> &'static str {
    "You already passed this level! Send /status to see what's next."
}

pub fn failed_out() -> &'static str {
    "No attempts left for this level."
}

pub fn queue_full() -> &'static str {
    "The system is busy right now, please try again shortly."
}

pub fn system_busy_not_counted() -> &'static str {
    "The AI took too long to respond, please try again (this attempt was not counted)."
}

pub fn processing_error() -> &'static str {
    "Something went wrong while grading, please try again."
}

pub fn all_levels_passed() -> &'static str {
    "Congratulations -- you have cleared every level! Thanks for playing."
}

pub fn level_unavailable() -> &'static str {
    "This level is currently unavailable."
}

pub fn pass_header(level_id: i64, level_name: &str, llm_output: &str) -> String {
    format!(
        "AI replied:\n```\n{}\n```\n\nResult: PASS\n--------------------\nCongratulations, you cleared level {level_id}: {level_name}!",
        escape_code_block(llm_output)
    )
}

pub fn fail_body(
    llm_output: &str,
    keyword_missed: bool,
    remaining_turns: i64,
    cooldown_seconds: i64,
) -> String {
    let mut parts = vec![format!(
        "AI replied:\n```\n{}\n```\n\nResult: FAIL\n--------------------",
        escape_code_block(llm_output)
    )];

    if keyword_missed {
        parts.push("Hint: the reply did not contain the target phrase.".to_string());
    } else {
        parts.push(
            "Hint: the reply mentioned the phrase in the wrong way (refusal or quotation)."
                .to_string(),
        );
    }

    if remaining_turns > 0 {
        parts.push(format!("Attempts left: {remaining_turns}"));
        parts.push(format!("Cooldown: retry in {cooldown_seconds} s"));
    } else {
        parts.push("All attempts used -- this level is now closed for you.".to_string());
    }

    parts.join("\n")
}

pub fn reward_exhausted() -> &'static str {
    "You passed, but this level's rewards have run out. Sorry!"
}

pub fn reward_already_claimed(code: &str) -> String {
    format!("You already claimed this level's reward. Your code: {code}")
}

pub fn reward_pool_closed() -> &'static str {
    "The reward pool for this level is temporarily closed, please contact an admin."
}

pub fn next_level_unlocked() -> &'static str {
    "Next level unlocked!"
}

fn escape_code_block(text: &str) -> String {
    // Keep user-visible code blocks well-formed.
    text.replace("```", "'''")
}
