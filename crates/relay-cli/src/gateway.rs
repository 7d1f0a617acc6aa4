//! A chat gateway backed by the configured chat directory.
//!
//! The CLI has no live chat service behind it. Chat details and admin lists
//! come from `[[chats]]` entries in the config file, and deliveries are
//! collected so they can be printed as JSON.

use relay_core::chat::{ChatId, ChatInfo, ChatKind, UserId};
use relay_core::config::RelayConfig;
use relay_core::error::Result;
use relay_engine::{ChatGateway, Delivery, MessageRef, SendOptions};
use tracing::info;

pub struct DirectoryGateway {
    config: RelayConfig,
    deliveries: Vec<Delivery>,
}

impl DirectoryGateway {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            deliveries: Vec::new(),
        }
    }

    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /// Describe a chat, inventing a title for chats not in the directory.
    pub fn describe(&self, chat_id: ChatId) -> ChatInfo {
        match self.config.chat(chat_id) {
            Some(entry) => entry.info(),
            None => ChatInfo {
                id: chat_id,
                kind: ChatKind::from_chat_id(chat_id),
                title: Some(format!("Chat {chat_id}")),
                first_name: None,
                username: None,
            },
        }
    }
}

impl ChatGateway for DirectoryGateway {
    fn chat_info(&self, chat_id: ChatId) -> Result<ChatInfo> {
        Ok(self.describe(chat_id))
    }

    fn is_chat_admin(&self, user_id: UserId, chat_id: ChatId) -> Result<bool> {
        Ok(self
            .config
            .chat(chat_id)
            .is_some_and(|entry| entry.admins.contains(&user_id)))
    }

    fn forward_message(&mut self, message: MessageRef, target_chat_id: ChatId) -> Result<()> {
        info!(
            from_chat_id = message.chat_id,
            message_id = message.message_id,
            target_chat_id,
            "forward"
        );
        self.deliveries.push(Delivery::Forward {
            message,
            target_chat_id,
        });
        Ok(())
    }

    fn send_message(&mut self, chat_id: ChatId, text: &str, options: SendOptions) -> Result<()> {
        info!(chat_id, text, "send");
        self.deliveries.push(Delivery::Send {
            chat_id,
            text: text.to_string(),
            options,
        });
        Ok(())
    }
}
