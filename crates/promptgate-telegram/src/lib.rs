// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Promptgate activity engine.
//!
//! Implements [`ChannelAdapter`] over the Telegram Bot API via teloxide:
//! long polling feeds inbound text messages into an mpsc channel that
//! `receive()` drains; replies go out as plain text.

pub mod handler;

use async_trait::async_trait;
use promptgate_core::types::{AdapterType, HealthStatus, InboundMessage};
use promptgate_core::{ChannelAdapter, PluginAdapter, PromptgateError};
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient, ReplyParameters};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Telegram channel adapter.
pub struct TelegramChannel {
    bot: Bot,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    polling_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TelegramChannel {
    /// Creates a new Telegram channel adapter from a bot token.
    pub fn new(bot_token: &str) -> Result<Self, PromptgateError> {
        if bot_token.is_empty() {
            return Err(PromptgateError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        let bot = Bot::new(bot_token);
        let (inbound_tx, inbound_rx) = mpsc::channel(100);
        Ok(Self {
            bot,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
            polling_handle: None,
        })
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, PromptgateError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), PromptgateError> {
        debug!("Telegram channel shutting down");
        if let Some(handle) = &self.polling_handle {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    async fn connect(&mut self) -> Result<(), PromptgateError> {
        if self.polling_handle.is_some() {
            return Ok(()); // Already connected
        }

        let bot = self.bot.clone();
        let tx = self.inbound_tx.clone();

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let tg_handler = Update::filter_message().endpoint(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    if !handler::is_dm(&msg) {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                        return respond(());
                    }
                    match handler::to_inbound_message(&msg) {
                        Some(inbound) => {
                            if tx.send(inbound).await.is_err() {
                                warn!("inbound channel closed, dropping message");
                            }
                        }
                        None => {
                            debug!(msg_id = msg.id.0, "ignoring non-text message");
                        }
                    }
                    respond(())
                }
            });

            Dispatcher::builder(bot, tg_handler)
                .default_handler(|_| async {}) // Silently ignore non-message updates
                .build()
                .dispatch()
                .await;
        });

        self.polling_handle = Some(handle);
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, PromptgateError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| PromptgateError::Channel {
            message: "inbound channel closed".into(),
            source: None,
        })
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), PromptgateError> {
        self.bot
            .send_message(Recipient::Id(ChatId(chat_id)), text)
            .await
            .map_err(|e| PromptgateError::Channel {
                message: format!("sendMessage failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }

    async fn reply_to(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<(), PromptgateError> {
        self.bot
            .send_message(Recipient::Id(ChatId(chat_id)), text)
            .reply_parameters(ReplyParameters::new(teloxide::types::MessageId(
                message_id,
            )))
            .await
            .map_err(|e| PromptgateError::Channel {
                message: format!("sendMessage (reply) failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}
