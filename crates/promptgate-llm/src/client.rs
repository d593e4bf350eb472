// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an OpenAI-compatible chat completions API.
//!
//! Provides [`OpenAiCompatClient`] which handles request construction,
//! authentication, per-call timeouts, and transient error retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use promptgate_core::types::{AdapterType, HealthStatus, LlmResult};
use promptgate_core::{LlmClient, PluginAdapter, PromptgateError};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse};

/// System prompt for judging calls; the judge prompt itself carries the
/// evaluation criteria.
const JUDGE_SYSTEM_PROMPT: &str = "You are a strict judge that evaluates outputs. Respond ONLY \
     with a single-line JSON object containing 'verdict' (PASS or FAIL) and 'reason' (brief \
     explanation).";

/// HTTP client for OpenAI-compatible chat completions.
///
/// Manages the auth header, connection pooling, and retry logic for
/// transient errors (429, 500, 503).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    max_retries: u32,
}

impl OpenAiCompatClient {
    /// Creates a new client.
    ///
    /// `timeout` comes from the activity config; a call that exceeds it
    /// surfaces as [`PromptgateError::Timeout`], which the engine treats
    /// as transient.
    pub fn new(
        api_key: &str,
        base_url: &str,
        default_model: &str,
        timeout: Duration,
    ) -> Result<Self, PromptgateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                PromptgateError::Config(format!("invalid API key header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PromptgateError::Llm {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            max_retries: 1,
        })
    }

    /// Returns the default model identifier.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Sends a chat completions request, retrying once on transient errors.
    async fn complete(&self, request: &ChatRequest) -> Result<(String, i64), PromptgateError> {
        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying chat completion after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = match self.client.post(&url).json(request).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(PromptgateError::Timeout {
                        duration: started.elapsed(),
                    });
                }
                Err(e) => {
                    return Err(PromptgateError::Llm {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "chat completion response received");

            if status.is_success() {
                let body: ChatResponse =
                    response.json().await.map_err(|e| PromptgateError::Llm {
                        message: format!("invalid completion response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let output = body
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .unwrap_or_default();
                let latency_ms = started.elapsed().as_millis() as i64;
                return Ok((output, latency_ms));
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(PromptgateError::Llm {
                    message: format!("API returned {status}: {body}"),
                    source: None,
                });
                continue;
            }

            // Non-transient error or exhausted retries.
            let message = if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&body) {
                format!(
                    "API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                )
            } else {
                format!("API returned {status}: {body}")
            };
            return Err(PromptgateError::Llm {
                message,
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| PromptgateError::Llm {
            message: "chat completion failed after retries".into(),
            source: None,
        }))
    }
}

fn is_transient_error(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
    )
}

#[async_trait]
impl PluginAdapter for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Llm
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        // No cheap authoritative probe exists; the serving path surfaces
        // failures per call.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError> {
        let model = model.unwrap_or(&self.default_model).to_string();
        let request = ChatRequest {
            model: model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ],
            max_tokens: max_output_tokens,
            temperature: 0.7,
        };
        let (output, latency_ms) = self.complete(&request).await?;
        Ok(LlmResult {
            output,
            model,
            latency_ms,
        })
    }

    async fn judge(
        &self,
        judge_prompt: &str,
        max_output_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResult, PromptgateError> {
        let model = model.unwrap_or(&self.default_model).to_string();
        let request = ChatRequest {
            model: model.clone(),
            messages: vec![
                ChatMessage::system(JUDGE_SYSTEM_PROMPT),
                ChatMessage::user(judge_prompt),
            ],
            max_tokens: max_output_tokens,
            // Deterministic judging.
            temperature: 0.0,
        };
        let (output, latency_ms) = self.complete(&request).await?;
        Ok(LlmResult {
            output,
            model,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(is_transient_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_error(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_error(StatusCode::BAD_REQUEST));
        assert!(!is_transient_error(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = OpenAiCompatClient::new(
            "sk-test",
            "https://api.example.com/v1/",
            "gpt-4o-mini",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn invalid_api_key_is_a_config_error() {
        let result = OpenAiCompatClient::new(
            "bad\nkey",
            "https://api.example.com/v1",
            "m",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(PromptgateError::Config(_))));
    }
}
