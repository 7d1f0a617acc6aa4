//! The linking state machine and relay dispatch.
//!
//! [`RelayEngine`] holds no state of its own beyond the store it mutates and
//! the configuration it was built with. Every event is handled to completion
//! before `handle` returns.

use tracing::{debug, error, info};

use relay_core::chat::ChatId;
use relay_core::config::RelayConfig;
use relay_core::error::{RelayError, Result};
use relay_core::link::{Link, NewLink};
use relay_core::request::SaveRequest;
use relay_store::LinkStore;

use crate::event::{
    IgnoreReason, InboundEvent, IncomingMessage, MigrationReport, Outcome, Rejection,
};
use crate::gateway::{ChatGateway, MessageRef, SendOptions};
use crate::messages;

/// Decides and performs the action for each inbound event.
pub struct RelayEngine<S, G> {
    store: S,
    gateway: G,
    config: RelayConfig,
}

impl<S: LinkStore, G: ChatGateway> RelayEngine<S, G> {
    pub fn new(store: S, gateway: G, config: RelayConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn into_parts(self) -> (S, G, RelayConfig) {
        (self.store, self.gateway, self.config)
    }

    /// Handle one inbound event.
    ///
    /// User validation failures are answered in the invoking chat and
    /// reported as [`Outcome::Rejected`]. Store and delivery failures are
    /// logged, answered with a generic message, and reported as
    /// [`Outcome::Failed`].
    pub fn handle(&mut self, event: InboundEvent) -> Outcome {
        if !self.config.enabled {
            debug!(plugin = %self.config.short_name, "relay disabled, ignoring event");
            return Outcome::Disabled;
        }

        match event {
            InboundEvent::ChatMigrated {
                from_chat_id,
                to_chat_id,
            } => Outcome::Migrated {
                report: self.migrate_chat(from_chat_id, to_chat_id),
            },
            InboundEvent::SaveTrigger { message } => {
                let result = self.save_reply(&message);
                self.settle(&message, result)
            }
            InboundEvent::SaveCommand { message, request } => {
                let result = self.save_command(&message, &request);
                self.settle(&message, result)
            }
        }
    }

    /// Rewrite every link that refers to `from_chat_id` so it refers to
    /// `to_chat_id` instead.
    ///
    /// The source rewrite and the target rewrites are independent: a chat
    /// can be the source of one link and the target of others. Never fails;
    /// links that cannot be rewritten are logged and not counted.
    pub fn migrate_chat(&mut self, from_chat_id: ChatId, to_chat_id: ChatId) -> MigrationReport {
        let mut rewritten = 0;

        match self.store.find_by_source(from_chat_id) {
            Ok(Some(mut link)) => {
                link.source_chat_id = to_chat_id;
                match self.store.save(&link) {
                    Ok(()) => rewritten += 1,
                    Err(err) => error!(
                        id = %link.id,
                        from_chat_id,
                        to_chat_id,
                        error = %err,
                        "failed to migrate link source"
                    ),
                }
            }
            Ok(None) => {}
            Err(err) => error!(from_chat_id, error = %err, "failed to look up link by source"),
        }

        match self.store.find_all_by_target(from_chat_id) {
            Ok(links) => {
                for mut link in links {
                    link.target_chat_id = Some(to_chat_id);
                    match self.store.save(&link) {
                        Ok(()) => rewritten += 1,
                        Err(err) => error!(
                            id = %link.id,
                            from_chat_id,
                            to_chat_id,
                            error = %err,
                            "failed to migrate link target"
                        ),
                    }
                }
            }
            Err(err) => error!(from_chat_id, error = %err, "failed to look up links by target"),
        }

        info!(
            migrations = rewritten,
            from_chat_id, to_chat_id, "migrated chat links"
        );
        MigrationReport {
            from_chat_id,
            to_chat_id,
            rewritten,
        }
    }

    /// Where saves from `chat_id` go: the linked target if the chat has an
    /// active link, otherwise the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if the store lookup fails.
    pub fn resolve_destination(&self, chat_id: ChatId) -> Result<Option<ChatId>> {
        let linked = self
            .store
            .find_by_source(chat_id)?
            .and_then(|link| link.target_chat_id);
        Ok(linked.or(self.config.default_target_chat_id))
    }

    /// Relay the message that `message` replies to.
    ///
    /// Messages that are not replies, and chats with no destination, are
    /// ignored without any answer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Persistence`] if resolving the destination
    /// fails, or [`RelayError::Delivery`] if any delivery fails.
    pub fn save_reply(&mut self, message: &IncomingMessage) -> Result<Outcome> {
        let Some(replied) = message.replied() else {
            debug!(chat_id = message.chat_id(), "save without reply, ignoring");
            return Ok(Outcome::Ignored {
                reason: IgnoreReason::NotAReply,
            });
        };

        let Some(target_chat_id) = self.resolve_destination(message.chat_id())? else {
            debug!(chat_id = message.chat_id(), "no destination for save, ignoring");
            return Ok(Outcome::Ignored {
                reason: IgnoreReason::NoDestination,
            });
        };

        self.relay(message, replied, target_chat_id)?;
        Ok(Outcome::Relayed { target_chat_id })
    }

    /// Handle an explicit `/save` command.
    ///
    /// A command issued as a reply always relays, whatever its arguments.
    /// Linking, unlinking, and redeeming need chat-admin capability.
    ///
    /// # Errors
    ///
    /// Returns the validation error for the request, or a system error.
    pub fn save_command(
        &mut self,
        message: &IncomingMessage,
        request: &SaveRequest,
    ) -> Result<Outcome> {
        if message.is_reply() {
            return self.save_reply(message);
        }

        match request {
            SaveRequest::ReplyRelay => self.save_reply(message),
            SaveRequest::Help => Ok(Outcome::Help),
            SaveRequest::Link => {
                self.require_admin(message)?;
                let link = self.link(message)?;
                Ok(Outcome::LinkCode { code: link.id })
            }
            SaveRequest::Unlink => {
                self.require_admin(message)?;
                let link = self.unlink(message)?;
                Ok(Outcome::Unlinked {
                    source_chat_id: link.source_chat_id,
                })
            }
            SaveRequest::Redeem(code) => {
                self.require_admin(message)?;
                let link = self.redeem(message, code)?;
                Ok(Outcome::Linked {
                    source_chat_id: link.source_chat_id,
                    target_chat_id: message.chat_id(),
                })
            }
        }
    }

    /// Find or create the pending link for the message's chat and answer
    /// with its code.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyLinked`] if the chat's link is active.
    pub fn link(&mut self, message: &IncomingMessage) -> Result<Link> {
        let chat_id = message.chat_id();
        let link = match self.store.find_by_source(chat_id)? {
            Some(link) => link,
            None => {
                let link = self.store.create(NewLink {
                    source_chat_id: chat_id,
                    creator_user_id: message.from.user_id,
                    creator_first_name: Some(message.from.first_name.clone()),
                })?;
                info!(id = %link.id, source_chat_id = chat_id, "created pending link");
                link
            }
        };

        if link.is_active() {
            return Err(RelayError::AlreadyLinked);
        }

        self.send_reply(message, &messages::link_code(&link.id))?;
        Ok(link)
    }

    /// Delete the link whose source is the message's chat.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotLinked`] if the chat has no link.
    pub fn unlink(&mut self, message: &IncomingMessage) -> Result<Link> {
        let chat_id = message.chat_id();
        let link = self
            .store
            .find_by_source(chat_id)?
            .ok_or(RelayError::NotLinked)?;

        self.store.delete(&link)?;
        info!(id = %link.id, source_chat_id = chat_id, "unlinked chat");

        self.send_reply(message, messages::CHAT_UNLINKED)?;
        Ok(link)
    }

    /// Make the message's chat the target of the pending link `code`.
    ///
    /// This is the only transition from pending to active.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidCode`] for an unknown code,
    /// [`RelayError::SelfLinkRejected`] when redeemed in the chat that
    /// created it, or [`RelayError::CodeAlreadyUsed`] if already active.
    pub fn redeem(&mut self, message: &IncomingMessage, code: &str) -> Result<Link> {
        let chat_id = message.chat_id();
        let mut link = self
            .store
            .find_by_id(code)?
            .ok_or(RelayError::InvalidCode)?;

        if link.source_chat_id == chat_id {
            return Err(RelayError::SelfLinkRejected);
        }
        if link.is_active() {
            return Err(RelayError::CodeAlreadyUsed);
        }

        link.target_chat_id = Some(chat_id);
        self.store.save(&link)?;
        info!(
            id = %link.id,
            source_chat_id = link.source_chat_id,
            target_chat_id = chat_id,
            "linked chats"
        );

        self.send_reply(message, messages::CHATS_LINKED)?;
        Ok(link)
    }

    fn require_admin(&self, message: &IncomingMessage) -> Result<()> {
        if self
            .gateway
            .is_chat_admin(message.from.user_id, message.chat_id())?
        {
            Ok(())
        } else {
            Err(RelayError::PermissionDenied)
        }
    }

    /// Forward, annotate in the target, confirm in the origin.
    fn relay(
        &mut self,
        message: &IncomingMessage,
        replied: MessageRef,
        target_chat_id: ChatId,
    ) -> Result<()> {
        let target = self.gateway.chat_info(target_chat_id)?;

        self.gateway.forward_message(replied, target_chat_id)?;
        self.gateway.send_message(
            target_chat_id,
            &messages::saved_by(&message.from, &message.chat),
            SendOptions::quiet_markdown(),
        )?;

        let (text, markdown) = messages::saved_to(&target);
        let options = if markdown {
            SendOptions {
                reply_to: Some(message.message_id),
                ..SendOptions::quiet_markdown()
            }
        } else {
            SendOptions::reply(message.message_id)
        };
        self.gateway
            .send_message(message.chat_id(), &text, options)?;

        info!(
            source_chat_id = message.chat_id(),
            target_chat_id, "relayed message"
        );
        Ok(())
    }

    fn send_reply(&mut self, message: &IncomingMessage, text: &str) -> Result<()> {
        self.gateway.send_message(
            message.chat_id(),
            text,
            SendOptions::reply(message.message_id),
        )
    }

    fn settle(&mut self, message: &IncomingMessage, result: Result<Outcome>) -> Outcome {
        let err = match result {
            Ok(outcome) => return outcome,
            Err(err) => err,
        };

        let outcome = match Rejection::from_error(&err) {
            Some(reason) => {
                debug!(chat_id = message.chat_id(), ?reason, "rejected save command");
                Outcome::Rejected { reason }
            }
            None => {
                error!(
                    chat_id = message.chat_id(),
                    user_id = message.from.user_id,
                    error = %err,
                    "save failed"
                );
                Outcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        if let Err(reply_err) = self.send_reply(message, err.user_message()) {
            error!(
                chat_id = message.chat_id(),
                error = %reply_err,
                "failed to answer save"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Sender;
    use crate::gateway::Delivery;
    use crate::testing::{chat, RecordingGateway};
    use relay_core::chat::{ChatInfo, ChatKind};
    use relay_store::SqliteLinkStore;

    const ADMIN: i64 = 1;
    const MEMBER: i64 = 2;

    fn gateway() -> RecordingGateway {
        RecordingGateway::new()
            .with_chat(chat(100, "Team", None))
            .with_chat(chat(150, "Team (migrated)", None))
            .with_chat(chat(200, "Archive", Some("archive")))
            .with_chat(chat(300, "Notes", None))
            .with_chat(chat(-500, "Default", None))
            .with_admin(ADMIN, 100)
            .with_admin(ADMIN, 200)
            .with_admin(ADMIN, 300)
    }

    fn engine_with(config: RelayConfig) -> RelayEngine<SqliteLinkStore, RecordingGateway> {
        RelayEngine::new(SqliteLinkStore::in_memory().unwrap(), gateway(), config)
    }

    fn engine() -> RelayEngine<SqliteLinkStore, RecordingGateway> {
        engine_with(RelayConfig::default())
    }

    fn message(chat_id: ChatId, user_id: i64, reply_to: Option<i64>) -> IncomingMessage {
        IncomingMessage {
            chat: ChatInfo {
                id: chat_id,
                kind: ChatKind::from_chat_id(chat_id),
                title: Some(format!("Chat {chat_id}")),
                first_name: None,
                username: None,
            },
            message_id: 1000_i64.wrapping_add(chat_id),
            from: Sender {
                user_id,
                first_name: "Ana".to_string(),
            },
            reply_to,
        }
    }

    fn command(chat_id: ChatId, request: SaveRequest) -> InboundEvent {
        InboundEvent::SaveCommand {
            message: message(chat_id, ADMIN, None),
            request,
        }
    }

    fn trigger(chat_id: ChatId, reply_to: Option<i64>) -> InboundEvent {
        InboundEvent::SaveTrigger {
            message: message(chat_id, MEMBER, reply_to),
        }
    }

    fn migrate(from_chat_id: ChatId, to_chat_id: ChatId) -> InboundEvent {
        InboundEvent::ChatMigrated {
            from_chat_id,
            to_chat_id,
        }
    }

    fn link_code(engine: &mut RelayEngine<SqliteLinkStore, RecordingGateway>, chat_id: ChatId) -> String {
        match engine.handle(command(chat_id, SaveRequest::Link)) {
            Outcome::LinkCode { code } => code,
            other => panic!("Expected LinkCode, got {other:?}"),
        }
    }

    fn pair(
        engine: &mut RelayEngine<SqliteLinkStore, RecordingGateway>,
        source: ChatId,
        target: ChatId,
    ) -> String {
        let code = link_code(engine, source);
        assert_eq!(
            engine.handle(command(target, SaveRequest::Redeem(code.clone()))),
            Outcome::Linked {
                source_chat_id: source,
                target_chat_id: target
            }
        );
        code
    }

    #[test]
    fn link_creates_pending_link_and_replies_with_code() {
        let mut engine = engine();
        let code = link_code(&mut engine, 100);

        let link = engine.store().find_by_source(100).unwrap().unwrap();
        assert_eq!(link.id, code);
        assert_eq!(link.target_chat_id, None);
        assert_eq!(link.creator_user_id, ADMIN);
        assert_eq!(link.creator_first_name.as_deref(), Some("Ana"));

        let replies = engine.gateway().sent_to(100);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].ends_with(&format!("/save {code}")));
    }

    #[test]
    fn link_twice_returns_same_pending_code() {
        let mut engine = engine();
        let first = link_code(&mut engine, 100);
        let second = link_code(&mut engine, 100);
        assert_eq!(first, second);
        assert_eq!(engine.store().list_all().unwrap().len(), 1);
    }

    #[test]
    fn link_on_active_chat_is_rejected() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);

        let outcome = engine.handle(command(100, SaveRequest::Link));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::AlreadyLinked
            }
        );
        let replies = engine.gateway().sent_to(100);
        assert_eq!(
            replies.last().copied(),
            Some(RelayError::AlreadyLinked.user_message())
        );
    }

    #[test]
    fn redeem_activates_link_once() {
        let mut engine = engine();
        let code = link_code(&mut engine, 100);

        let outcome = engine.handle(command(200, SaveRequest::Redeem(code.clone())));
        assert_eq!(
            outcome,
            Outcome::Linked {
                source_chat_id: 100,
                target_chat_id: 200
            }
        );
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.target_chat_id, Some(200));
        assert_eq!(engine.gateway().sent_to(200), vec![messages::CHATS_LINKED]);

        let outcome = engine.handle(command(300, SaveRequest::Redeem(code.clone())));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::CodeAlreadyUsed
            }
        );
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.target_chat_id, Some(200));
    }

    #[test]
    fn redeem_unknown_code_is_rejected() {
        let mut engine = engine();
        let outcome = engine.handle(command(200, SaveRequest::Redeem("nope".to_string())));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::InvalidCode
            }
        );
        assert_eq!(
            engine.gateway().sent_to(200),
            vec![RelayError::InvalidCode.user_message()]
        );
    }

    #[test]
    fn redeem_in_creating_chat_is_rejected() {
        let mut engine = engine();
        let code = link_code(&mut engine, 100);

        let outcome = engine.handle(command(100, SaveRequest::Redeem(code.clone())));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::SelfLinkRejected
            }
        );
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.target_chat_id, None);
    }

    #[test]
    fn admin_commands_require_admin() {
        let mut engine = engine();
        for request in [
            SaveRequest::Link,
            SaveRequest::Unlink,
            SaveRequest::Redeem("abc".to_string()),
        ] {
            let outcome = engine.handle(InboundEvent::SaveCommand {
                message: message(100, MEMBER, None),
                request,
            });
            assert_eq!(
                outcome,
                Outcome::Rejected {
                    reason: Rejection::PermissionDenied
                }
            );
        }
        assert!(engine.store().list_all().unwrap().is_empty());
        assert_eq!(engine.gateway().sent_to(100).len(), 3);
    }

    #[test]
    fn bare_command_is_help_without_reply() {
        let mut engine = engine();
        let outcome = engine.handle(InboundEvent::SaveCommand {
            message: message(100, MEMBER, None),
            request: SaveRequest::Help,
        });
        assert_eq!(outcome, Outcome::Help);
        assert!(engine.gateway().deliveries().is_empty());
    }

    #[test]
    fn unlink_without_link_is_rejected() {
        let mut engine = engine();
        let outcome = engine.handle(command(100, SaveRequest::Unlink));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::NotLinked
            }
        );
        assert_eq!(
            engine.gateway().sent_to(100),
            vec![RelayError::NotLinked.user_message()]
        );
    }

    #[test]
    fn unlink_deletes_link() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);

        let outcome = engine.handle(command(100, SaveRequest::Unlink));
        assert_eq!(
            outcome,
            Outcome::Unlinked {
                source_chat_id: 100
            }
        );
        assert!(engine.store().find_by_source(100).unwrap().is_none());
        assert_eq!(
            engine.gateway().sent_to(100).last().copied(),
            Some(messages::CHAT_UNLINKED)
        );
    }

    #[test]
    fn trigger_relays_to_linked_target() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);
        engine.gateway_mut().take_deliveries();

        let outcome = engine.handle(trigger(100, Some(55)));
        assert_eq!(
            outcome,
            Outcome::Relayed {
                target_chat_id: 200
            }
        );

        let deliveries = engine.gateway().deliveries();
        assert_eq!(deliveries.len(), 3);
        assert_eq!(
            deliveries[0],
            Delivery::Forward {
                message: MessageRef {
                    chat_id: 100,
                    message_id: 55
                },
                target_chat_id: 200
            }
        );
        match &deliveries[1] {
            Delivery::Send {
                chat_id,
                text,
                options,
            } => {
                assert_eq!(*chat_id, 200);
                assert_eq!(text, "Saved by [Ana](tg://user?id=2) from Chat 100");
                assert!(options.silent);
                assert!(options.disable_link_preview);
            }
            other => panic!("Expected Send, got {other:?}"),
        }
        match &deliveries[2] {
            Delivery::Send {
                chat_id,
                text,
                options,
            } => {
                assert_eq!(*chat_id, 100);
                assert_eq!(text, "✅ Saved to [Archive](https://t.me/archive) (private).");
                assert!(options.markdown);
                assert_eq!(options.reply_to, Some(1100));
            }
            other => panic!("Expected Send, got {other:?}"),
        }
    }

    #[test]
    fn confirmation_without_handle_uses_title() {
        let mut engine = engine();
        pair(&mut engine, 100, 300);
        engine.gateway_mut().take_deliveries();

        engine.handle(trigger(100, Some(55)));
        assert_eq!(
            engine.gateway().sent_to(100),
            vec!["✅ Saved to Notes (private)."]
        );
    }

    #[test]
    fn trigger_without_reply_is_silent() {
        let mut engine = engine_with(RelayConfig {
            default_target_chat_id: Some(-500),
            ..RelayConfig::default()
        });
        let outcome = engine.handle(trigger(100, None));
        assert_eq!(
            outcome,
            Outcome::Ignored {
                reason: IgnoreReason::NotAReply
            }
        );
        assert!(engine.gateway().deliveries().is_empty());
    }

    #[test]
    fn trigger_falls_back_to_default_target() {
        let mut engine = engine_with(RelayConfig {
            default_target_chat_id: Some(-500),
            ..RelayConfig::default()
        });
        assert_eq!(engine.resolve_destination(100).unwrap(), Some(-500));

        let outcome = engine.handle(trigger(100, Some(55)));
        assert_eq!(
            outcome,
            Outcome::Relayed {
                target_chat_id: -500
            }
        );
        assert_eq!(engine.gateway().forwarded_to(-500).len(), 1);
    }

    #[test]
    fn pending_link_falls_back_to_default_target() {
        let mut engine = engine_with(RelayConfig {
            default_target_chat_id: Some(-500),
            ..RelayConfig::default()
        });
        link_code(&mut engine, 100);
        assert_eq!(engine.resolve_destination(100).unwrap(), Some(-500));
    }

    #[test]
    fn trigger_without_destination_is_noop() {
        let mut engine = engine();
        let outcome = engine.handle(trigger(100, Some(55)));
        assert_eq!(
            outcome,
            Outcome::Ignored {
                reason: IgnoreReason::NoDestination
            }
        );
        assert!(engine.gateway().deliveries().is_empty());
    }

    #[test]
    fn command_as_reply_relays_and_ignores_arguments() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);
        engine.gateway_mut().take_deliveries();

        let outcome = engine.handle(InboundEvent::SaveCommand {
            message: message(100, MEMBER, Some(77)),
            request: SaveRequest::Unlink,
        });
        assert_eq!(
            outcome,
            Outcome::Relayed {
                target_chat_id: 200
            }
        );
        assert!(engine.store().find_by_source(100).unwrap().is_some());
        assert_eq!(engine.gateway().forwarded_to(200).len(), 1);
    }

    #[test]
    fn failed_forward_is_reported_generically() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);
        engine.gateway_mut().take_deliveries();
        engine.gateway_mut().fail_forwards(true);

        let outcome = engine.handle(trigger(100, Some(55)));
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert_eq!(
            engine.gateway().sent_to(100),
            vec!["❌ Something went wrong, please try again later."]
        );
        assert!(engine.gateway().sent_to(200).is_empty());
    }

    #[test]
    fn unknown_target_chat_is_a_delivery_failure() {
        let mut engine = engine_with(RelayConfig {
            default_target_chat_id: Some(999),
            ..RelayConfig::default()
        });
        let outcome = engine.handle(trigger(100, Some(55)));
        match outcome {
            Outcome::Failed { error } => assert!(error.contains("999")),
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert!(engine.gateway().forwarded_to(999).is_empty());
    }

    #[test]
    fn migrating_source_keeps_target() {
        let mut engine = engine();
        let code = pair(&mut engine, 100, 200);

        let outcome = engine.handle(migrate(100, 150));
        assert_eq!(
            outcome,
            Outcome::Migrated {
                report: MigrationReport {
                    from_chat_id: 100,
                    to_chat_id: 150,
                    rewritten: 1
                }
            }
        );
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.source_chat_id, 150);
        assert_eq!(link.target_chat_id, Some(200));

        engine.handle(migrate(200, 250));
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.source_chat_id, 150);
        assert_eq!(link.target_chat_id, Some(250));
        assert!(engine.store().find_by_source(100).unwrap().is_none());
    }

    #[test]
    fn migration_rewrites_source_and_targets_in_one_event() {
        let mut engine = engine();
        // 100 saves to 200, 300 saves to 100.
        let outgoing = pair(&mut engine, 100, 200);
        let incoming = pair(&mut engine, 300, 100);

        let report = engine.migrate_chat(100, 150);
        assert_eq!(report.rewritten, 2);

        let outgoing = engine.store().find_by_id(&outgoing).unwrap().unwrap();
        assert_eq!(outgoing.source_chat_id, 150);
        assert_eq!(outgoing.target_chat_id, Some(200));

        let incoming = engine.store().find_by_id(&incoming).unwrap().unwrap();
        assert_eq!(incoming.source_chat_id, 300);
        assert_eq!(incoming.target_chat_id, Some(150));
    }

    #[test]
    fn migration_rewrites_every_incoming_link() {
        let mut engine = engine();
        pair(&mut engine, 100, 200);
        pair(&mut engine, 300, 200);

        let report = engine.migrate_chat(200, 250);
        assert_eq!(report.rewritten, 2);
        assert_eq!(engine.store().find_all_by_target(250).unwrap().len(), 2);
        assert!(engine.store().find_all_by_target(200).unwrap().is_empty());
    }

    #[test]
    fn migration_of_unknown_chat_rewrites_nothing() {
        let mut engine = engine();
        let report = engine.migrate_chat(42, 43);
        assert_eq!(report.rewritten, 0);
    }

    #[test]
    fn migration_onto_existing_source_is_skipped() {
        let mut engine = engine();
        let code = pair(&mut engine, 100, 200);
        link_code(&mut engine, 300);

        let report = engine.migrate_chat(100, 300);
        assert_eq!(report.rewritten, 0);
        let link = engine.store().find_by_id(&code).unwrap().unwrap();
        assert_eq!(link.source_chat_id, 100);
    }

    #[test]
    fn disabled_engine_ignores_everything() {
        let mut engine = engine_with(RelayConfig {
            enabled: false,
            default_target_chat_id: Some(-500),
            ..RelayConfig::default()
        });
        assert_eq!(engine.handle(command(100, SaveRequest::Link)), Outcome::Disabled);
        assert_eq!(engine.handle(trigger(100, Some(55))), Outcome::Disabled);
        assert_eq!(engine.handle(migrate(100, 150)), Outcome::Disabled);
        assert!(engine.gateway().deliveries().is_empty());
        assert!(engine.store().list_all().unwrap().is_empty());
    }

    #[test]
    fn end_to_end_link_save_migrate_unlink() {
        let mut engine = engine();
        let code = link_code(&mut engine, 100);
        engine.handle(command(200, SaveRequest::Redeem(code)));
        engine.gateway_mut().take_deliveries();

        engine.handle(trigger(100, Some(55)));
        assert_eq!(engine.gateway().forwarded_to(200).len(), 1);
        assert!(engine.gateway().sent_to(100)[0].contains("archive"));

        engine.handle(migrate(100, 150));
        engine.gateway_mut().take_deliveries();
        let outcome = engine.handle(trigger(150, Some(56)));
        assert_eq!(
            outcome,
            Outcome::Relayed {
                target_chat_id: 200
            }
        );

        let outcome = engine.handle(command(150, SaveRequest::Unlink));
        assert_eq!(
            outcome,
            Outcome::Rejected {
                reason: Rejection::PermissionDenied
            }
        );
        engine.gateway_mut().grant_admin(ADMIN, 150);
        let outcome = engine.handle(command(150, SaveRequest::Unlink));
        assert_eq!(
            outcome,
            Outcome::Unlinked {
                source_chat_id: 150
            }
        );
        assert!(engine.store().list_all().unwrap().is_empty());
    }

    /// A store whose every operation fails.
    struct BrokenStore;

    impl LinkStore for BrokenStore {
        fn find_by_source(&self, _: ChatId) -> Result<Option<Link>> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn find_all_by_target(&self, _: ChatId) -> Result<Vec<Link>> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn find_by_id(&self, _: &str) -> Result<Option<Link>> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn create(&mut self, _: NewLink) -> Result<Link> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn save(&mut self, _: &Link) -> Result<()> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn delete(&mut self, _: &Link) -> Result<()> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
        fn list_all(&self) -> Result<Vec<Link>> {
            Err(RelayError::Persistence("store offline".to_string()))
        }
    }

    #[test]
    fn store_failure_is_answered_generically() {
        let mut engine = RelayEngine::new(BrokenStore, gateway(), RelayConfig::default());

        let outcome = engine.handle(command(100, SaveRequest::Link));
        assert!(matches!(outcome, Outcome::Failed { .. }));
        let replies = engine.gateway().sent_to(100);
        assert_eq!(replies.len(), 1);
        assert!(!replies[0].contains("offline"));
    }

    #[test]
    fn migration_never_raises_on_store_failure() {
        let mut engine = RelayEngine::new(BrokenStore, gateway(), RelayConfig::default());
        let outcome = engine.handle(migrate(100, 150));
        assert_eq!(
            outcome,
            Outcome::Migrated {
                report: MigrationReport {
                    from_chat_id: 100,
                    to_chat_id: 150,
                    rewritten: 0
                }
            }
        );
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn redeeming_in_the_creating_chat_always_fails(chat_id in any::<i64>()) {
                let gateway = RecordingGateway::new().with_admin(ADMIN, chat_id);
                let mut engine = RelayEngine::new(
                    SqliteLinkStore::in_memory().unwrap(),
                    gateway,
                    RelayConfig::default(),
                );

                let code = match engine.handle(command(chat_id, SaveRequest::Link)) {
                    Outcome::LinkCode { code } => code,
                    other => panic!("Expected LinkCode, got {other:?}"),
                };
                let outcome = engine.handle(command(chat_id, SaveRequest::Redeem(code.clone())));
                prop_assert_eq!(outcome, Outcome::Rejected { reason: Rejection::SelfLinkRejected });

                let link = engine.store().find_by_id(&code).unwrap().unwrap();
                prop_assert_eq!(link.target_chat_id, None);
            }

            #[test]
            fn redeemed_link_points_at_redeeming_chat(source in any::<i64>(), target in any::<i64>()) {
                prop_assume!(source != target);
                let gateway = RecordingGateway::new()
                    .with_admin(ADMIN, source)
                    .with_admin(ADMIN, target);
                let mut engine = RelayEngine::new(
                    SqliteLinkStore::in_memory().unwrap(),
                    gateway,
                    RelayConfig::default(),
                );

                let code = match engine.handle(command(source, SaveRequest::Link)) {
                    Outcome::LinkCode { code } => code,
                    other => panic!("Expected LinkCode, got {other:?}"),
                };
                engine.handle(command(target, SaveRequest::Redeem(code)));

                let link = engine.store().find_by_source(source).unwrap().unwrap();
                prop_assert_eq!(link.target_chat_id, Some(target));
            }
        }
    }
}
