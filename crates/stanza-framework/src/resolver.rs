//! Dispatch resolution.
//!
//! Given a classified update, the [`DispatchResolver`] walks the registry
//! and produces the ordered list of handlers to invoke. Resolution is pure
//! apart from one read of the conversation store; it never mutates
//! conversation state.
//!
//! # Resolution order
//!
//! For a message: an exact command or text match is the sole specific
//! handler and suppresses the conversation lookup entirely — a literal
//! command sent mid-conversation interrupts predictably and leaves the
//! pending step untouched. Otherwise a pending conversation step whose key
//! is registered joins the list (and, when the step was stored with
//! `skip_others`, *is* the whole list). Message catch-alls follow in
//! registration order, then the generic any-update handlers.
//!
//! For a callback query: the first registered exact/pattern trigger that
//! matches the query text is the sole specific handler, followed by the
//! callback-query catch-alls and the generic handlers.
//!
//! For every other kind: the catch-alls for that exact kind, then the
//! generic handlers. An empty result means nobody registered anything for
//! this update, and dispatch is a silent no-op.

use std::sync::Arc;

use tracing::trace;

use stanza_core::{ConversationStore, KeyStrategy, Update, UpdateKind};

use crate::handler::Handler;
use crate::registry::HandlerRegistry;

/// Walks the registry and orders the handlers for one update.
pub struct DispatchResolver {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn ConversationStore>,
    key_strategy: KeyStrategy,
}

impl DispatchResolver {
    /// Creates a resolver over a frozen registry and a conversation store.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn ConversationStore>,
        key_strategy: KeyStrategy,
    ) -> Self {
        Self {
            registry,
            store,
            key_strategy,
        }
    }

    /// The key strategy this resolver derives conversation keys with.
    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    /// The registry snapshot this resolver reads.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Produces the ordered handler list for `update`.
    pub async fn resolve(&self, update: &Update) -> Vec<Arc<Handler>> {
        let mut selected = match update.kind() {
            UpdateKind::Message => {
                match self.resolve_message_specific(update).await {
                    MessageResolution::Exclusive(handler) => {
                        // skip_others: the step handler is the entire list.
                        return vec![handler];
                    }
                    MessageResolution::Specific(handler) => vec![handler],
                    MessageResolution::None => Vec::new(),
                }
            }
            UpdateKind::CallbackQuery => update
                .callback_text()
                .and_then(|text| self.registry.callback_for(text))
                .map(Arc::clone)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        selected.extend(self.registry.catch_alls(update.kind()).iter().cloned());
        selected.extend(self.registry.any_update().iter().cloned());

        trace!(
            update_id = update.id(),
            kind = %update.kind(),
            handler_count = selected.len(),
            "resolved handlers"
        );
        selected
    }

    async fn resolve_message_specific(&self, update: &Update) -> MessageResolution {
        // Exact command, then exact text. A hit is the sole specific match
        // and skips the conversation lookup: the pending step, if any, is
        // neither consumed nor advanced.
        if let Some(handler) = update.command().and_then(|c| self.registry.command(c)) {
            return MessageResolution::Specific(Arc::clone(handler));
        }
        if let Some(handler) = update.text().and_then(|t| self.registry.text(t)) {
            return MessageResolution::Specific(Arc::clone(handler));
        }

        let Some(key) = self.key_strategy.key_for(update) else {
            return MessageResolution::None;
        };
        let Some(entry) = self.store.get(&key).await else {
            return MessageResolution::None;
        };

        // A pending step only matters if its key is still registered.
        match self.registry.step(&entry.step) {
            Some(handler) if entry.skip_others => {
                MessageResolution::Exclusive(Arc::clone(handler))
            }
            Some(handler) => MessageResolution::Specific(Arc::clone(handler)),
            None => {
                trace!(step = %entry.step, "pending step has no registered handler");
                MessageResolution::None
            }
        }
    }
}

enum MessageResolution {
    /// A specific handler that heads the list, catch-alls still follow.
    Specific(Arc<Handler>),
    /// A conversation step stored with `skip_others`: nothing else runs.
    Exclusive(Arc<Handler>),
    /// No specific handler; only catch-alls apply.
    None,
}

impl std::fmt::Debug for DispatchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchResolver")
            .field("registry", &self.registry)
            .field("key_strategy", &self.key_strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use serde_json::json;
    use stanza_core::{
        ConversationEntry, ConversationKey, Context, MemoryConversationStore, classify,
    };

    async fn noop(_ctx: Arc<Context>) -> stanza_core::HandlerResult {
        Ok(())
    }

    fn message(chat_id: i64, text: &str) -> Update {
        classify(json!({
            "update_id": 1,
            "message": {"chat": {"id": chat_id}, "from": {"id": 99}, "text": text}
        }))
        .unwrap()
    }

    fn resolver_with(
        registry: HandlerRegistry,
        store: Arc<MemoryConversationStore>,
    ) -> DispatchResolver {
        DispatchResolver::new(Arc::new(registry), store, KeyStrategy::Chat)
    }

    fn ids(handlers: &[Arc<Handler>]) -> Vec<String> {
        handlers
            .iter()
            .map(|h| h.id().unwrap_or("<unnamed>").to_string())
            .collect()
    }

    #[tokio::test]
    async fn plain_text_resolves_to_catch_alls_then_generic() {
        let mut builder = RegistryBuilder::new();
        builder.on_message(noop).with_id("msg_a");
        builder.on_message(noop).with_id("msg_b");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let handlers = resolver.resolve(&message(1, "hello")).await;
        assert_eq!(ids(&handlers), vec!["msg_a", "msg_b", "generic"]);
    }

    #[tokio::test]
    async fn exact_command_heads_the_list() {
        let mut builder = RegistryBuilder::new();
        builder.on_message(noop).with_id("catch");
        builder.on_command("start", noop).unwrap().with_id("start");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let handlers = resolver.resolve(&message(1, "/start")).await;
        assert_eq!(ids(&handlers), vec!["start", "catch"]);
    }

    #[tokio::test]
    async fn exact_text_heads_the_list() {
        let mut builder = RegistryBuilder::new();
        builder.on_text("ping", noop).unwrap().with_id("ping");
        builder.on_message(noop).with_id("catch");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let handlers = resolver.resolve(&message(1, "ping")).await;
        assert_eq!(ids(&handlers), vec!["ping", "catch"]);
    }

    #[tokio::test]
    async fn pending_step_is_included_for_next_message() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(ConversationKey::chat(7), ConversationEntry::new("ask_age"))
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_conversation_step("ask_age", noop).with_id("step");
        builder.on_message(noop).with_id("catch");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), store);

        let handlers = resolver.resolve(&message(7, "31")).await;
        assert_eq!(ids(&handlers), vec!["step", "catch", "generic"]);
    }

    #[tokio::test]
    async fn skip_others_resolves_to_exactly_the_step() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(
                ConversationKey::chat(7),
                ConversationEntry::new("confirm").skipping_others(),
            )
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_conversation_step("confirm", noop).with_id("step");
        builder.on_message(noop).with_id("catch");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), store);

        let handlers = resolver.resolve(&message(7, "yes")).await;
        assert_eq!(ids(&handlers), vec!["step"]);
    }

    #[tokio::test]
    async fn command_interrupts_pending_conversation_and_leaves_it_untouched() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(
                ConversationKey::chat(7),
                ConversationEntry::new("ask_age").skipping_others(),
            )
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_conversation_step("ask_age", noop).with_id("step");
        builder.on_command("cancel", noop).unwrap().with_id("cancel");
        let resolver = resolver_with(builder.build(), Arc::clone(&store));

        let handlers = resolver.resolve(&message(7, "/cancel")).await;
        assert_eq!(ids(&handlers), vec!["cancel"]);

        // The pending step was neither consumed nor advanced.
        let entry = store.get(&ConversationKey::chat(7)).await.unwrap();
        assert_eq!(entry.step, "ask_age");
        assert!(entry.skip_others);
    }

    #[tokio::test]
    async fn pending_step_without_registered_handler_falls_through() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(ConversationKey::chat(7), ConversationEntry::new("gone"))
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_message(noop).with_id("catch");
        let resolver = resolver_with(builder.build(), store);

        let handlers = resolver.resolve(&message(7, "hello")).await;
        assert_eq!(ids(&handlers), vec!["catch"]);
    }

    #[tokio::test]
    async fn conversations_in_other_chats_do_not_leak() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(ConversationKey::chat(8), ConversationEntry::new("ask_age"))
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_conversation_step("ask_age", noop).with_id("step");
        builder.on_message(noop).with_id("catch");
        let resolver = resolver_with(builder.build(), store);

        let handlers = resolver.resolve(&message(7, "hello")).await;
        assert_eq!(ids(&handlers), vec!["catch"]);
    }

    #[tokio::test]
    async fn callback_query_first_match_wins() {
        let mut builder = RegistryBuilder::new();
        builder
            .on_callback_text("confirm", noop)
            .unwrap()
            .with_id("exact");
        builder
            .on_callback_pattern(regex::Regex::new("^conf").unwrap(), noop)
            .with_id("pattern");
        builder.on_callback_query(noop).with_id("catch");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let update = classify(json!({
            "update_id": 1,
            "callback_query": {"from": {"id": 1}, "data": "confirm"}
        }))
        .unwrap();

        let handlers = resolver.resolve(&update).await;
        assert_eq!(ids(&handlers), vec!["exact", "catch", "generic"]);
    }

    #[tokio::test]
    async fn other_kinds_resolve_to_their_catch_alls() {
        let mut builder = RegistryBuilder::new();
        builder.on_poll(noop).with_id("poll");
        builder.on_message(noop).with_id("msg");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let update = classify(json!({"update_id": 1, "poll": {"id": "p"}})).unwrap();
        let handlers = resolver.resolve(&update).await;
        assert_eq!(ids(&handlers), vec!["poll", "generic"]);
    }

    #[tokio::test]
    async fn no_handlers_resolves_to_empty_list() {
        let resolver = resolver_with(
            RegistryBuilder::new().build(),
            Arc::new(MemoryConversationStore::new()),
        );
        let handlers = resolver.resolve(&message(1, "hello")).await;
        assert!(handlers.is_empty());
    }

    #[tokio::test]
    async fn unknown_kind_resolves_to_generic_handlers_only() {
        let mut builder = RegistryBuilder::new();
        builder.on_message(noop).with_id("msg");
        builder.on_any_update(noop).with_id("generic");
        let resolver = resolver_with(builder.build(), Arc::new(MemoryConversationStore::new()));

        let update = classify(json!({"update_id": 1})).unwrap();
        let handlers = resolver.resolve(&update).await;
        assert_eq!(ids(&handlers), vec!["generic"]);
    }

    #[tokio::test]
    async fn chat_and_user_strategy_separates_users() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .set(
                ConversationKey::chat_user(7, 99),
                ConversationEntry::new("ask_age"),
            )
            .await;

        let mut builder = RegistryBuilder::new();
        builder.on_conversation_step("ask_age", noop).with_id("step");
        let registry = Arc::new(builder.build());
        let resolver = DispatchResolver::new(registry, store, KeyStrategy::ChatAndUser);

        // from.id is 99 in the fixture, so the pending step matches.
        let handlers = resolver.resolve(&message(7, "31")).await;
        assert_eq!(ids(&handlers), vec!["step"]);
    }
}
