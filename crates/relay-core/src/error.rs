//! Error types for chatrelay.

use thiserror::Error;

use crate::chat::ChatId;

/// Top-level result type for chatrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Top-level error type for chatrelay.
///
/// Lookup misses are not errors: store lookups return `Ok(None)` or an
/// empty list. The first six variants are user validation failures and are
/// answered with a reply in the invoking chat; the rest are system failures.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("chat is already linked")]
    AlreadyLinked,

    #[error("chat is not linked")]
    NotLinked,

    #[error("invalid link code")]
    InvalidCode,

    #[error("a chat cannot be linked to itself")]
    SelfLinkRejected,

    #[error("link code has already been used")]
    CodeAlreadyUsed,

    #[error("user is not an admin of this chat")]
    PermissionDenied,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("chat {0} already has a link as source")]
    DuplicateSource(ChatId),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Whether this error is a user validation failure rather than a
    /// failure of the store, the delivery channel, or the deployment.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLinked
                | Self::NotLinked
                | Self::InvalidCode
                | Self::SelfLinkRejected
                | Self::CodeAlreadyUsed
                | Self::PermissionDenied
        )
    }

    /// Text replied to the invoking chat. System failures get a generic
    /// message so no internal detail leaks into the chat.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AlreadyLinked => "⚠ This chat is already linked.",
            Self::NotLinked => "❌ Chat is not linked.",
            Self::InvalidCode => "❌ You must provide a valid code.",
            Self::SelfLinkRejected => "❌ You must run this command in a different chat.",
            Self::CodeAlreadyUsed => "❌ You must provide a code that is not used.",
            Self::PermissionDenied => "❌ You must be an admin to do that.",
            Self::Persistence(_)
            | Self::DuplicateSource(_)
            | Self::Delivery(_)
            | Self::Config(_)
            | Self::Io(_) => "❌ Something went wrong, please try again later.",
        }
    }
}
