// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound
//! messages and captured outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use promptgate_core::types::{AdapterType, HealthStatus, InboundMessage};
use promptgate_core::{ChannelAdapter, PluginAdapter, PromptgateError};

/// An outbound message captured by the mock.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    /// Message id replied to, when sent via `reply_to`.
    pub reply_to: Option<i32>,
}

/// A mock messaging channel for testing.
///
/// Provides two queues:
/// - **inbound**: messages injected via `inject_message()` are returned by `receive()`
/// - **sent**: messages passed to `send()`/`reply_to()` are captured for assertions
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    notify: Arc<Notify>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Inject an inbound message into the receive queue.
    pub async fn inject_message(&self, msg: InboundMessage) {
        self.inbound.lock().await.push_back(msg);
        self.notify.notify_one();
    }

    /// All captured outbound messages, in send order.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Captured outbound texts for one chat, in send order.
    pub async fn sent_texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PromptgateError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn connect(&mut self) -> Result<(), PromptgateError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, PromptgateError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(msg) = queue.pop_front() {
                    return Ok(msg);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), PromptgateError> {
        self.sent.lock().await.push(SentMessage {
            chat_id,
            text: text.to_string(),
            reply_to: None,
        });
        Ok(())
    }

    async fn reply_to(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<(), PromptgateError> {
        self.sent.lock().await.push(SentMessage {
            chat_id,
            text: text.to_string(),
            reply_to: Some(message_id),
        });
        Ok(())
    }
}
