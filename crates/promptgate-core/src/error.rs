// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Promptgate activity engine.

use thiserror::Error;

/// The primary error type used across all Promptgate adapter traits and core operations.
#[derive(Debug, Error)]
pub enum PromptgateError {
    /// Configuration errors (invalid JSON, missing required fields, failed validation).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (connection failure, message format, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM client errors (API failure, token limits, model not found).
    #[error("llm error: {message}")]
    Llm {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The attempt queue is at capacity; the submission was rejected without side effects.
    #[error("attempt queue is full")]
    QueueFull,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PromptgateError {
    /// Whether this error maps to a transient attempt failure: the turn is
    /// not consumed and the user is asked to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PromptgateError::Timeout { .. } | PromptgateError::Llm { .. }
        )
    }
}
