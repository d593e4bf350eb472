// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible LLM client for the Promptgate activity engine.
//!
//! Implements [`promptgate_core::LlmClient`] over the chat completions
//! HTTP API with per-call timeouts and transient-error retry.

pub mod client;
pub mod types;

pub use client::OpenAiCompatClient;
