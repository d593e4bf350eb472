// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM client for deterministic testing.
//!
//! Generation and judging are scripted by prompt substring, so tests can
//! pin exact outputs, inject timeouts, and feed the grader malformed judge
//! replies without any network.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use promptgate_core::types::{AdapterType, HealthStatus, LlmResult};
use promptgate_core::{LlmClient, PluginAdapter, PromptgateError};

#[derive(Default)]
struct Script {
    /// (needle in user prompt, canned output)
    generate_responses: Vec<(String, String)>,
    /// Needles in user prompt that simulate a timeout.
    generate_timeouts: Vec<String>,
    default_generate: String,
    /// (needle in judge prompt, raw judge output)
    judge_responses: Vec<(String, String)>,
    default_judge: String,
}

/// A scripted LLM client.
pub struct MockLlm {
    script: Mutex<Script>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                default_generate: "mock output".to_string(),
                default_judge: r#"{"verdict":"PASS","reason":"mock judge"}"#.to_string(),
                ..Script::default()
            }),
        }
    }

    /// Canned generation output for prompts containing `needle`.
    pub async fn on_generate(&self, needle: &str, output: &str) {
        self.script
            .lock()
            .await
            .generate_responses
            .push((needle.to_string(), output.to_string()));
    }

    /// Simulate a generation timeout for prompts containing `needle`.
    pub async fn timeout_generate(&self, needle: &str) {
        self.script
            .lock()
            .await
            .generate_timeouts
            .push(needle.to_string());
    }

    pub async fn set_default_generate(&self, output: &str) {
        self.script.lock().await.default_generate = output.to_string();
    }

    /// Raw judge output for judge prompts containing `needle`. Feed it
    /// non-JSON to exercise the parser's ERROR path.
    pub async fn on_judge(&self, needle: &str, raw_output: &str) {
        self.script
            .lock()
            .await
            .judge_responses
            .push((needle.to_string(), raw_output.to_string()));
    }

    pub async fn set_default_judge(&self, raw_output: &str) {
        self.script.lock().await.default_judge = raw_output.to_string();
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockLlm {
    fn name(&self) -> &str {
        "mock-llm"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Llm
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError> {
        let script = self.script.lock().await;

        for needle in &script.generate_timeouts {
            if user_prompt.contains(needle) {
                return Err(PromptgateError::Timeout {
                    duration: Duration::from_secs(30),
                });
            }
        }

        let output = script
            .generate_responses
            .iter()
            .find(|(needle, _)| user_prompt.contains(needle))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| script.default_generate.clone());

        Ok(LlmResult {
            output,
            model: model.unwrap_or("mock").to_string(),
            latency_ms: 10,
        })
    }

    async fn judge(
        &self,
        judge_prompt: &str,
        _max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError> {
        let script = self.script.lock().await;
        let output = script
            .judge_responses
            .iter()
            .find(|(needle, _)| judge_prompt.contains(needle))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| script.default_judge.clone());

        Ok(LlmResult {
            output,
            model: model.unwrap_or("mock-judge").to_string(),
            latency_ms: 10,
        })
    }
}
