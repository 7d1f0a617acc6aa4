//! Link type: the durable pairing between a source chat and a target chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatId, UserId};

/// A pairing of a source chat with an optional target chat.
///
/// The `id` doubles as the one-time code that a second chat redeems to
/// become the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Opaque code assigned at creation. Never changes.
    pub id: String,

    /// Chat where saves are triggered. At most one link per source chat.
    pub source_chat_id: ChatId,

    /// Chat that receives saves. `None` while the link is pending.
    pub target_chat_id: Option<ChatId>,

    pub creator_user_id: UserId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_first_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Whether a link has been paired yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Pending,
    Active,
}

impl Link {
    #[must_use]
    pub fn state(&self) -> LinkState {
        if self.target_chat_id.is_some() {
            LinkState::Active
        } else {
            LinkState::Pending
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == LinkState::Active
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target_chat_id {
            Some(target) => write!(
                f,
                "{{ id = \"{}\", source_chat_id = {}, target_chat_id = {} }}",
                self.id, self.source_chat_id, target
            ),
            None => write!(
                f,
                "{{ id = \"{}\", source_chat_id = {}, target_chat_id = none }}",
                self.id, self.source_chat_id
            ),
        }
    }
}

/// A link that has not been stored yet. The store assigns `id` and
/// `created_at`, and every new link starts pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub source_chat_id: ChatId,
    pub creator_user_id: UserId,
    pub creator_first_name: Option<String>,
}
