//! Passive trigger phrase matching.
//!
//! A message containing a word like "saved" (or "saaave", "SAVED") marks the
//! message it replies to for saving.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::error::{RelayError, Result};

/// Pattern matched against incoming message text.
pub const DEFAULT_PATTERN: &str = r"sa+v+e+d*\b";

static DEFAULT_TRIGGER: LazyLock<TriggerPhrase> = LazyLock::new(|| {
    TriggerPhrase::new(DEFAULT_PATTERN).expect("DEFAULT_PATTERN is a valid regex")
});

/// A compiled, case-insensitive trigger phrase.
#[derive(Debug, Clone)]
pub struct TriggerPhrase {
    regex: Regex,
}

impl TriggerPhrase {
    /// Compile a case-insensitive trigger from a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RelayError::Config(format!("invalid trigger pattern: {e}")))?;
        Ok(Self { regex })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl Default for TriggerPhrase {
    fn default() -> Self {
        DEFAULT_TRIGGER.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_saved_variants() {
        let trigger = TriggerPhrase::default();
        assert!(trigger.matches("saved"));
        assert!(trigger.matches("SAVED"));
        assert!(trigger.matches("saaaved!"));
        assert!(trigger.matches("save"));
        assert!(trigger.matches("ok saveddd"));
    }

    #[test]
    fn ignores_unrelated_text() {
        let trigger = TriggerPhrase::default();
        assert!(!trigger.matches("hello"));
        assert!(!trigger.matches("savings"));
        assert!(!trigger.matches("sv"));
    }

    #[test]
    fn default_is_the_compiled_default_pattern() {
        let custom = TriggerPhrase::new(DEFAULT_PATTERN).unwrap();
        let default = TriggerPhrase::default();
        assert_eq!(default.regex.as_str(), custom.regex.as_str());
        for text in ["Saaaved", "unsaved", "sav", "save the date"] {
            assert_eq!(default.matches(text), custom.matches(text), "{text}");
        }
    }

    #[test]
    fn rejects_invalid_pattern() {
        let err = TriggerPhrase::new("sa(").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
