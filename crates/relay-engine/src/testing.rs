//! Test doubles for driving a [`RelayEngine`](crate::RelayEngine) without a
//! live chat service.
//!
//! ```
//! use relay_core::{RelayConfig, SaveRequest};
//! use relay_engine::testing::{chat, RecordingGateway};
//! use relay_engine::{InboundEvent, IncomingMessage, Outcome, RelayEngine, Sender};
//! use relay_store::SqliteLinkStore;
//!
//! let gateway = RecordingGateway::new()
//!     .with_chat(chat(100, "Team", None))
//!     .with_admin(1, 100);
//! let mut engine = RelayEngine::new(
//!     SqliteLinkStore::in_memory().unwrap(),
//!     gateway,
//!     RelayConfig::default(),
//! );
//!
//! let outcome = engine.handle(InboundEvent::SaveCommand {
//!     message: IncomingMessage {
//!         chat: chat(100, "Team", None),
//!         message_id: 1,
//!         from: Sender { user_id: 1, first_name: "Ana".to_string() },
//!         reply_to: None,
//!     },
//!     request: SaveRequest::Link,
//! });
//! assert!(matches!(outcome, Outcome::LinkCode { .. }));
//! assert_eq!(engine.gateway().sent_to(100).len(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use relay_core::chat::{ChatId, ChatInfo, ChatKind, UserId};
use relay_core::error::{RelayError, Result};

use crate::gateway::{ChatGateway, Delivery, MessageRef, SendOptions};

/// A chat whose kind follows the id sign convention.
#[must_use]
pub fn chat(id: ChatId, title: &str, username: Option<&str>) -> ChatInfo {
    ChatInfo {
        id,
        kind: ChatKind::from_chat_id(id),
        title: Some(title.to_string()),
        first_name: None,
        username: username.map(str::to_string),
    }
}

/// A [`ChatGateway`] that records every delivery in memory.
///
/// Only registered chats can be described; forwarding and sending work for
/// any chat id unless forwards are set to fail.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    chats: HashMap<ChatId, ChatInfo>,
    admins: HashSet<(UserId, ChatId)>,
    deliveries: Vec<Delivery>,
    fail_forwards: bool,
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chat(mut self, chat: ChatInfo) -> Self {
        self.chats.insert(chat.id, chat);
        self
    }

    #[must_use]
    pub fn with_admin(mut self, user_id: UserId, chat_id: ChatId) -> Self {
        self.grant_admin(user_id, chat_id);
        self
    }

    pub fn grant_admin(&mut self, user_id: UserId, chat_id: ChatId) {
        self.admins.insert((user_id, chat_id));
    }

    /// Make every subsequent forward fail with a delivery error.
    pub fn fail_forwards(&mut self, fail: bool) {
        self.fail_forwards = fail;
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /// Texts sent to `chat_id`, in order.
    pub fn sent_to(&self, chat_id: ChatId) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Send {
                    chat_id: to, text, ..
                } if *to == chat_id => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Messages forwarded to `chat_id`, in order.
    pub fn forwarded_to(&self, chat_id: ChatId) -> Vec<MessageRef> {
        self.deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Forward {
                    message,
                    target_chat_id,
                } if *target_chat_id == chat_id => Some(*message),
                _ => None,
            })
            .collect()
    }
}

impl ChatGateway for RecordingGateway {
    fn chat_info(&self, chat_id: ChatId) -> Result<ChatInfo> {
        self.chats
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| RelayError::Delivery(format!("chat {chat_id} not found")))
    }

    fn is_chat_admin(&self, user_id: UserId, chat_id: ChatId) -> Result<bool> {
        Ok(self.admins.contains(&(user_id, chat_id)))
    }

    fn forward_message(&mut self, message: MessageRef, target_chat_id: ChatId) -> Result<()> {
        if self.fail_forwards {
            return Err(RelayError::Delivery(format!(
                "forward to {target_chat_id} refused"
            )));
        }
        self.deliveries.push(Delivery::Forward {
            message,
            target_chat_id,
        });
        Ok(())
    }

    fn send_message(&mut self, chat_id: ChatId, text: &str, options: SendOptions) -> Result<()> {
        self.deliveries.push(Delivery::Send {
            chat_id,
            text: text.to_string(),
            options,
        });
        Ok(())
    }
}
