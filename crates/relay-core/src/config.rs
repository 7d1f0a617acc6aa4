//! Deployment configuration for chatrelay.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! enabled = true
//! default_target_chat_id = -1001234567890
//!
//! [[chats]]
//! id = -1001234567890
//! title = "Archive"
//! username = "archive"
//! kind = "supergroup"
//! admins = [1]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chat::{ChatId, ChatInfo, ChatKind, UserId};
use crate::error::{RelayError, Result};

/// Configuration held by the relay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_short_name")]
    pub short_name: String,

    /// When false, every inbound event is ignored.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Where unlinked chats save to. `None` disables the fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target_chat_id: Option<ChatId>,

    /// Chat directory used by hosts that cannot ask a live chat service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chats: Vec<ChatEntry>,
}

fn default_short_name() -> String {
    "save_plugin".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            short_name: default_short_name(),
            enabled: default_enabled(),
            default_target_chat_id: None,
            chats: Vec::new(),
        }
    }
}

/// A known chat and who administers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: ChatId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChatKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admins: Vec<UserId>,
}

impl ChatEntry {
    #[must_use]
    pub fn info(&self) -> ChatInfo {
        ChatInfo {
            id: self.id,
            kind: self.kind.unwrap_or_else(|| ChatKind::from_chat_id(self.id)),
            title: self.title.clone(),
            first_name: self.first_name.clone(),
            username: self.username.clone(),
        }
    }
}

impl RelayConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the text is not valid configuration.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RelayError::Config(e.to_string()))?;
        config.warn_if_incomplete();
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the file exists but cannot be read, or
    /// [`RelayError::Config`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.warn_if_incomplete();
            return Ok(config);
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Look up a chat in the configured directory.
    #[must_use]
    pub fn chat(&self, chat_id: ChatId) -> Option<&ChatEntry> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    fn warn_if_incomplete(&self) {
        if self.default_target_chat_id.is_none() {
            warn!(
                plugin = %self.short_name,
                "default_target_chat_id not set, saving from unlinked chats is disabled"
            );
        }
    }
}
