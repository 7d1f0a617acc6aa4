//! # relay-engine
//!
//! The linking state machine and relay dispatch for chatrelay.
//!
//! - [`RelayEngine`]: handles save triggers, `/save` commands, and chat
//!   migrations against a [`relay_store::LinkStore`]
//! - [`ChatGateway`]: outbound delivery and chat queries provided by the host
//! - [`RelayDispatcher`]: single-writer queue for hosts that receive events
//!   concurrently
//! - [`testing`]: an in-memory gateway for tests

pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod gateway;
pub mod messages;
pub mod testing;

pub use dispatcher::{DispatchError, RelayDispatcher};
pub use engine::RelayEngine;
pub use event::{
    IgnoreReason, InboundEvent, IncomingMessage, MigrationReport, Outcome, Rejection, Sender,
};
pub use gateway::{ChatGateway, Delivery, MessageRef, SendOptions};
