// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message filtering and conversion helpers for the Telegram adapter.

use promptgate_core::types::InboundMessage;
use teloxide::types::{ChatKind, Message};

/// Only direct messages participate; group chatter is ignored.
pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

/// Convert a Telegram message with text into the engine's inbound shape.
/// Returns `None` for stickers, media, and other non-text payloads.
pub fn to_inbound_message(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;
    let from = msg.from.as_ref()?;
    Some(InboundMessage {
        telegram_user_id: from.id.0 as i64,
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_string(),
        username: from.username.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
