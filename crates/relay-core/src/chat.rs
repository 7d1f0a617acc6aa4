//! Chat identity types shared by the store, the engine, and hosts.

use serde::{Deserialize, Serialize};

/// Integer identity of a chat. Negative values are group-like chats.
pub type ChatId = i64;

/// Integer identity of a user.
pub type UserId = i64;

/// Identity of a message within its chat.
pub type MessageId = i64;

/// The kind of a chat, as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Guess the kind of a chat from its id alone.
    ///
    /// Positive ids are private chats, ids below `-1_000_000_000_000` are
    /// supergroups, and any other negative id is a basic group.
    #[must_use]
    pub fn from_chat_id(chat_id: ChatId) -> Self {
        if chat_id > 0 {
            Self::Private
        } else if chat_id <= -1_000_000_000_000 {
            Self::Supergroup
        } else {
            Self::Group
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host knows about a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    #[serde(default)]
    pub kind: ChatKind,
    /// Group or channel title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// First name of the other party in a private chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Public handle, without the leading `@`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ChatInfo {
    /// Title if present, otherwise the first name, otherwise the id.
    #[must_use]
    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .or(self.first_name.as_deref())
            .map_or_else(|| self.id.to_string(), str::to_string)
    }
}
