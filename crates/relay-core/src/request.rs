//! The `/save` command as a tagged request.
//!
//! Flags and the free-form code argument are folded into a single
//! [`SaveRequest`] once, at the boundary, so the engine never re-inspects
//! loose arguments.

use serde::{Deserialize, Serialize};

/// What a `/save` invocation asks for, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "code", rename_all = "snake_case")]
pub enum SaveRequest {
    /// Issued as a reply: relay the replied-to message. Flags are ignored.
    ReplyRelay,
    /// `--link`: create or show the pairing code for this chat.
    Link,
    /// `--unlink`: delete this chat's link.
    Unlink,
    /// Bare code argument: make this chat the target of the code's link.
    Redeem(String),
    /// Nothing to do; the host may show help.
    Help,
}

impl SaveRequest {
    /// Build a request from parsed command arguments.
    ///
    /// Code fragments are trimmed and joined with single spaces. An empty
    /// code after trimming counts as no code.
    #[must_use]
    pub fn from_args<S: AsRef<str>>(
        is_reply: bool,
        link: bool,
        unlink: bool,
        code: &[S],
    ) -> Self {
        if is_reply {
            return Self::ReplyRelay;
        }
        if link {
            return Self::Link;
        }
        if unlink {
            return Self::Unlink;
        }

        let code = code
            .iter()
            .map(|fragment| fragment.as_ref().trim())
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if code.is_empty() {
            Self::Help
        } else {
            Self::Redeem(code)
        }
    }

    /// Whether this request needs chat-admin capability.
    #[must_use]
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Link | Self::Unlink | Self::Redeem(_))
    }
}
