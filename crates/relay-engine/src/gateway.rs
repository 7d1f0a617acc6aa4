//! The seam between the relay engine and the hosting chat runtime.
//!
//! The engine decides what to deliver; a [`ChatGateway`] delivers it and
//! answers questions about chats and users.

use serde::{Deserialize, Serialize};

use relay_core::chat::{ChatId, ChatInfo, MessageId, UserId};
use relay_core::error::Result;

/// A message in a specific chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Delivery flags for an outbound text message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Render the text as Markdown.
    #[serde(default)]
    pub markdown: bool,
    #[serde(default)]
    pub disable_link_preview: bool,
    /// Deliver without a notification sound.
    #[serde(default)]
    pub silent: bool,
    /// Thread the message as a reply to this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl SendOptions {
    /// A plain-text reply to `message_id`.
    #[must_use]
    pub fn reply(message_id: MessageId) -> Self {
        Self {
            reply_to: Some(message_id),
            ..Self::default()
        }
    }

    /// Quiet Markdown with link previews off.
    #[must_use]
    pub fn quiet_markdown() -> Self {
        Self {
            markdown: true,
            disable_link_preview: true,
            silent: true,
            reply_to: None,
        }
    }
}

/// Something the engine asked the gateway to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    Forward {
        message: MessageRef,
        target_chat_id: ChatId,
    },
    Send {
        chat_id: ChatId,
        text: String,
        options: SendOptions,
    },
}

/// Outbound primitives and chat queries provided by the host.
///
/// Failures are reported as [`relay_core::RelayError::Delivery`]; the engine
/// never retries them.
pub trait ChatGateway {
    /// Public handle, title, and kind of a chat.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::RelayError::Delivery`] if the chat cannot be read.
    fn chat_info(&self, chat_id: ChatId) -> Result<ChatInfo>;

    /// Whether `user_id` holds admin capability in `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::RelayError::Delivery`] if the check cannot be made.
    fn is_chat_admin(&self, user_id: UserId, chat_id: ChatId) -> Result<bool>;

    /// Forward `message` verbatim to `target_chat_id`.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::RelayError::Delivery`] if forwarding fails.
    fn forward_message(&mut self, message: MessageRef, target_chat_id: ChatId) -> Result<()>;

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::RelayError::Delivery`] if sending fails.
    fn send_message(&mut self, chat_id: ChatId, text: &str, options: SendOptions) -> Result<()>;
}
