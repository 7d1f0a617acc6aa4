//! # relay-core
//!
//! Core types, errors, and configuration for chatrelay.
//!
//! This crate defines the foundational types used across all other chatrelay crates:
//! - [`Link`]: the persisted pairing between a source and a target chat
//! - Chat identity types ([`ChatId`], [`ChatKind`], [`ChatInfo`])
//! - [`SaveRequest`]: the `/save` command, decided once at the boundary
//! - [`TriggerPhrase`]: passive "saved" phrase matching
//! - [`RelayConfig`]: deployment configuration
//! - Error hierarchy ([`RelayError`])

pub mod chat;
pub mod config;
pub mod error;
pub mod link;
pub mod request;
pub mod trigger;

pub use chat::{ChatId, ChatInfo, ChatKind, MessageId, UserId};
pub use config::{ChatEntry, RelayConfig};
pub use error::{RelayError, Result};
pub use link::{Link, LinkState, NewLink};
pub use request::SaveRequest;
pub use trigger::TriggerPhrase;
