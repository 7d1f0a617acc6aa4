//! User-facing texts sent by the relay.
//!
//! Validation failures are worded in [`relay_core::RelayError::user_message`].

use relay_core::chat::ChatInfo;

use crate::event::Sender;

pub const CHATS_LINKED: &str = "✅ Chats linked.";
pub const CHAT_UNLINKED: &str = "🚮 Chat unlinked.";

/// Instructions for redeeming a pairing code.
#[must_use]
pub fn link_code(code: &str) -> String {
    format!(
        "⚠️ Invite me to the chat where you want messages to be saved and run the following command there:\n/save {code}"
    )
}

/// Remove characters that would break Markdown formatting.
#[must_use]
pub fn trim_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '[' | ']'))
        .collect()
}

/// A Markdown mention of a user.
#[must_use]
pub fn mention_markdown(sender: &Sender) -> String {
    format!(
        "[{}](tg://user?id={})",
        trim_markdown(&sender.first_name),
        sender.user_id
    )
}

/// Annotation sent to the target after a forward.
#[must_use]
pub fn saved_by(sender: &Sender, origin: &ChatInfo) -> String {
    format!(
        "Saved by {} from {}",
        mention_markdown(sender),
        trim_markdown(&origin.display_title())
    )
}

/// Confirmation sent back to the origin. Links to the target when it has a
/// public handle. The `bool` is whether the text is Markdown.
#[must_use]
pub fn saved_to(target: &ChatInfo) -> (String, bool) {
    let title = trim_markdown(&target.display_title());
    match target.username.as_deref() {
        Some(username) => (
            format!(
                "✅ Saved to [{title}](https://t.me/{username}) ({}).",
                target.kind
            ),
            true,
        ),
        None => (format!("✅ Saved to {title} ({}).", target.kind), false),
    }
}
