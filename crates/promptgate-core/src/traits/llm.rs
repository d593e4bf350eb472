// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM client trait for generation and judging calls.

use async_trait::async_trait;

use crate::error::PromptgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::LlmResult;

/// Client for the language model backing the challenge.
///
/// Both calls carry an output token cap and may fail with timeout or
/// transport errors, which the engine maps to a transient attempt failure
/// (the turn is not consumed). `generate` is not idempotent; a replayed
/// task re-generates, which is acceptable because no state was committed.
#[async_trait]
pub trait LlmClient: PluginAdapter {
    /// Generates a completion for a user prompt under a system prompt.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError>;

    /// Runs a judging call and returns the raw model output.
    ///
    /// Parsing the verdict JSON is the grader's concern, so malformed
    /// output is distinguishable from transport failure.
    async fn judge(
        &self,
        judge_prompt: &str,
        max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError>;
}
