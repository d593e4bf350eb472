// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the messaging transport (Telegram today).

use async_trait::async_trait;

use crate::error::PromptgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::InboundMessage;

/// Adapter for the bidirectional messaging channel.
///
/// The channel delivers user submissions to the admission front and carries
/// engine replies back. The engine only ever needs plain text sends.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Establishes a connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), PromptgateError>;

    /// Receives the next inbound message from the channel.
    async fn receive(&self) -> Result<InboundMessage, PromptgateError>;

    /// Sends a plain text message to a chat.
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), PromptgateError>;

    /// Sends a reply to a specific message.
    ///
    /// Default implementation falls back to a plain send for channels
    /// without reply threading.
    async fn reply_to(
        &self,
        chat_id: i64,
        _message_id: i32,
        text: &str,
    ) -> Result<(), PromptgateError> {
        self.send(chat_id, text).await
    }
}
