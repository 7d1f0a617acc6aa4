//! Inbound events and the outcomes the engine reports for them.

use serde::{Deserialize, Serialize};

use relay_core::chat::{ChatId, ChatInfo, MessageId, UserId};
use relay_core::error::RelayError;
use relay_core::request::SaveRequest;

use crate::gateway::MessageRef;

/// The user who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: UserId,
    pub first_name: String,
}

/// A message as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat: ChatInfo,
    pub message_id: MessageId,
    pub from: Sender,
    /// The message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl IncomingMessage {
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.chat.id
    }

    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// The replied-to message, if any.
    #[must_use]
    pub fn replied(&self) -> Option<MessageRef> {
        self.reply_to.map(|message_id| MessageRef {
            chat_id: self.chat.id,
            message_id,
        })
    }
}

/// Something the host asks the engine to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// An explicit `/save` command.
    SaveCommand {
        message: IncomingMessage,
        request: SaveRequest,
    },
    /// A message matching the trigger phrase.
    SaveTrigger { message: IncomingMessage },
    /// Chat `from_chat_id` has been permanently replaced by `to_chat_id`.
    ChatMigrated {
        from_chat_id: ChatId,
        to_chat_id: ChatId,
    },
}

/// Why an event produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Host-side: the message text did not contain the trigger phrase.
    NoTrigger,
    NotAReply,
    NoDestination,
}

/// A user validation failure, answered in the invoking chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    AlreadyLinked,
    NotLinked,
    InvalidCode,
    SelfLinkRejected,
    CodeAlreadyUsed,
    PermissionDenied,
}

impl Rejection {
    /// The rejection for a user validation error, `None` for system errors.
    #[must_use]
    pub fn from_error(err: &RelayError) -> Option<Self> {
        match err {
            RelayError::AlreadyLinked => Some(Self::AlreadyLinked),
            RelayError::NotLinked => Some(Self::NotLinked),
            RelayError::InvalidCode => Some(Self::InvalidCode),
            RelayError::SelfLinkRejected => Some(Self::SelfLinkRejected),
            RelayError::CodeAlreadyUsed => Some(Self::CodeAlreadyUsed),
            RelayError::PermissionDenied => Some(Self::PermissionDenied),
            _ => None,
        }
    }
}

/// Identity rewrites applied for one migration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub from_chat_id: ChatId,
    pub to_chat_id: ChatId,
    /// Links whose source or target was rewritten.
    pub rewritten: usize,
}

/// What the engine did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Relayed { target_chat_id: ChatId },
    Ignored { reason: IgnoreReason },
    LinkCode { code: String },
    Linked { source_chat_id: ChatId, target_chat_id: ChatId },
    Unlinked { source_chat_id: ChatId },
    Rejected { reason: Rejection },
    Failed { error: String },
    Migrated { report: MigrationReport },
    Help,
    Disabled,
}
