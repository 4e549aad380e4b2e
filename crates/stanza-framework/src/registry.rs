//! Handler registration and the immutable registry snapshot.
//!
//! Handlers accumulate on a [`RegistryBuilder`] during process startup and
//! are frozen into an immutable [`HandlerRegistry`] before dispatch begins.
//! The builder is consumed by [`build`](RegistryBuilder::build), so further
//! registration after the snapshot is taken is rejected by construction.
//!
//! # Uniqueness
//!
//! Within one trigger kind's exact-key space, keys are unique. Registering
//! a second handler for the same command, text, or exact callback key is a
//! configuration error reported eagerly as
//! [`RegistryError::DuplicateHandler`]. Conversation steps are the one
//! exception: a later registration for the same step silently replaces the
//! former.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! builder.use_middleware(logging_middleware);
//!
//! builder.on_command("start", start_handler)?
//!     .middleware(admin_only);
//! builder.on_message(echo_handler);
//!
//! let registry = builder.build();
//! ```

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use stanza_core::UpdateKind;

use crate::error::{RegistryError, RegistryResult};
use crate::handler::{CallbackMatch, Handler, Trigger};
use crate::middleware::{Callback, Middleware};

/// Mutable collector for handler registrations.
#[derive(Default)]
pub struct RegistryBuilder {
    commands: HashMap<String, Handler>,
    texts: HashMap<String, Handler>,
    callbacks: Vec<Handler>,
    callback_exact_keys: HashSet<String>,
    steps: HashMap<String, Handler>,
    catch_alls: Vec<Handler>,
    any_update: Vec<Handler>,
    global_middleware: Vec<Arc<dyn Middleware>>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a middleware that will be part of every handler chain
    /// created by *subsequent* registrations.
    ///
    /// Global middleware run in the order they were registered, before the
    /// handler-scoped middleware that was attached at registration time.
    pub fn use_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.global_middleware.push(Arc::new(middleware));
        self
    }

    fn new_handler<C>(&self, trigger: Trigger, callback: C) -> Handler
    where
        C: Callback + 'static,
    {
        let mut handler = Handler::new(trigger, callback);
        // Wrap in reverse so the first-registered global middleware ends up
        // outermost and therefore runs first.
        for middleware in self.global_middleware.iter().rev() {
            handler.wrap_shared(Arc::clone(middleware));
        }
        handler
    }

    /// Registers a handler for an exact command (`/start`).
    ///
    /// A leading slash is added if `name` lacks one.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHandler`] if the command is already taken.
    pub fn on_command<C>(&mut self, name: impl Into<String>, callback: C) -> RegistryResult<&mut Handler>
    where
        C: Callback + 'static,
    {
        let name = name.into();
        let key = if name.starts_with('/') {
            name
        } else {
            format!("/{name}")
        };
        let handler = self.new_handler(Trigger::Command(key.clone()), callback);
        match self.commands.entry(key) {
            Entry::Occupied(occupied) => Err(RegistryError::DuplicateHandler {
                kind: "command",
                key: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => Ok(vacant.insert(handler)),
        }
    }

    /// Registers a handler for an exact message text.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHandler`] if the text is already taken.
    pub fn on_text<C>(&mut self, text: impl Into<String>, callback: C) -> RegistryResult<&mut Handler>
    where
        C: Callback + 'static,
    {
        let key = text.into();
        let handler = self.new_handler(Trigger::Text(key.clone()), callback);
        match self.texts.entry(key) {
            Entry::Occupied(occupied) => Err(RegistryError::DuplicateHandler {
                kind: "text",
                key: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => Ok(vacant.insert(handler)),
        }
    }

    /// Registers a handler for an exact callback-query text.
    ///
    /// Callback handlers are tried in registration order; the first match
    /// wins and is the only specific callback handler selected.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHandler`] if the exact key is already taken.
    pub fn on_callback_text<C>(
        &mut self,
        text: impl Into<String>,
        callback: C,
    ) -> RegistryResult<&mut Handler>
    where
        C: Callback + 'static,
    {
        let key = text.into();
        if !self.callback_exact_keys.insert(key.clone()) {
            return Err(RegistryError::DuplicateHandler {
                kind: "callback_query",
                key,
            });
        }
        let handler = self.new_handler(
            Trigger::CallbackQuery(CallbackMatch::Exact(key)),
            callback,
        );
        Ok(push_and_borrow(&mut self.callbacks, handler))
    }

    /// Registers a handler for callback-query texts matching `pattern`.
    pub fn on_callback_pattern<C>(&mut self, pattern: Regex, callback: C) -> &mut Handler
    where
        C: Callback + 'static,
    {
        let handler = self.new_handler(
            Trigger::CallbackQuery(CallbackMatch::Pattern(pattern)),
            callback,
        );
        push_and_borrow(&mut self.callbacks, handler)
    }

    /// Registers a conversation-step handler under `step`.
    ///
    /// Unlike the other exact-key kinds, re-registering a step silently
    /// replaces the previous handler.
    pub fn on_conversation_step<C>(&mut self, step: impl Into<String>, callback: C) -> &mut Handler
    where
        C: Callback + 'static,
    {
        let step = step.into();
        let handler = self.new_handler(Trigger::ConversationStep(step.clone()), callback);
        match self.steps.entry(step) {
            Entry::Occupied(mut occupied) => {
                debug!(step = %occupied.key(), "replacing conversation step handler");
                *occupied.get_mut() = handler;
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(handler),
        }
    }

    /// Registers a catch-all handler for every update of `kind`.
    ///
    /// Registration order is preserved and is the execution order when
    /// multiple catch-alls match the same update.
    pub fn on_kind<C>(&mut self, kind: UpdateKind, callback: C) -> &mut Handler
    where
        C: Callback + 'static,
    {
        let handler = self.new_handler(Trigger::CatchAll(kind), callback);
        push_and_borrow(&mut self.catch_alls, handler)
    }

    /// Catch-all for new messages.
    pub fn on_message<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::Message, callback)
    }

    /// Catch-all for edited messages.
    pub fn on_edited_message<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::EditedMessage, callback)
    }

    /// Catch-all for channel posts.
    pub fn on_channel_post<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::ChannelPost, callback)
    }

    /// Catch-all for edited channel posts.
    pub fn on_edited_channel_post<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::EditedChannelPost, callback)
    }

    /// Catch-all for callback queries.
    pub fn on_callback_query<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::CallbackQuery, callback)
    }

    /// Catch-all for inline queries.
    pub fn on_inline_query<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::InlineQuery, callback)
    }

    /// Catch-all for chosen inline results.
    pub fn on_chosen_inline_result<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::ChosenInlineResult, callback)
    }

    /// Catch-all for shipping queries.
    pub fn on_shipping_query<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::ShippingQuery, callback)
    }

    /// Catch-all for pre-checkout queries.
    pub fn on_pre_checkout_query<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::PreCheckoutQuery, callback)
    }

    /// Catch-all for poll state updates.
    pub fn on_poll<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::Poll, callback)
    }

    /// Catch-all for poll answers.
    pub fn on_poll_answer<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        self.on_kind(UpdateKind::PollAnswer, callback)
    }

    /// Registers a generic handler that runs for every update, after all
    /// kind-specific handlers.
    pub fn on_any_update<C: Callback + 'static>(&mut self, callback: C) -> &mut Handler {
        let handler = self.new_handler(Trigger::AnyUpdate, callback);
        push_and_borrow(&mut self.any_update, handler)
    }

    /// Freezes the builder into an immutable registry snapshot.
    pub fn build(self) -> HandlerRegistry {
        let mut catch_alls: HashMap<UpdateKind, Vec<Arc<Handler>>> = HashMap::new();
        for handler in self.catch_alls {
            let Trigger::CatchAll(kind) = *handler.trigger() else {
                continue;
            };
            catch_alls.entry(kind).or_default().push(Arc::new(handler));
        }

        HandlerRegistry {
            commands: arc_map(self.commands),
            texts: arc_map(self.texts),
            callbacks: self.callbacks.into_iter().map(Arc::new).collect(),
            steps: arc_map(self.steps),
            catch_alls,
            any_update: self.any_update.into_iter().map(Arc::new).collect(),
        }
    }
}

fn push_and_borrow(handlers: &mut Vec<Handler>, handler: Handler) -> &mut Handler {
    handlers.push(handler);
    let last = handlers.len() - 1;
    &mut handlers[last]
}

fn arc_map(map: HashMap<String, Handler>) -> HashMap<String, Arc<Handler>> {
    map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()
}

/// Immutable snapshot of all registered handlers, partitioned by trigger
/// kind. Produced once by [`RegistryBuilder::build`] and shared read-only
/// with the resolver for the lifetime of the process.
pub struct HandlerRegistry {
    commands: HashMap<String, Arc<Handler>>,
    texts: HashMap<String, Arc<Handler>>,
    callbacks: Vec<Arc<Handler>>,
    steps: HashMap<String, Arc<Handler>>,
    catch_alls: HashMap<UpdateKind, Vec<Arc<Handler>>>,
    any_update: Vec<Arc<Handler>>,
}

impl HandlerRegistry {
    /// The handler for an exact command, if registered.
    pub fn command(&self, command: &str) -> Option<&Arc<Handler>> {
        self.commands.get(command)
    }

    /// The handler for an exact message text, if registered.
    pub fn text(&self, text: &str) -> Option<&Arc<Handler>> {
        self.texts.get(text)
    }

    /// The first registered callback handler matching `text`.
    pub fn callback_for(&self, text: &str) -> Option<&Arc<Handler>> {
        self.callbacks.iter().find(|handler| {
            matches!(
                handler.trigger(),
                Trigger::CallbackQuery(m) if m.matches(text)
            )
        })
    }

    /// The handler registered under a conversation step key.
    pub fn step(&self, step: &str) -> Option<&Arc<Handler>> {
        self.steps.get(step)
    }

    /// Catch-all handlers for one update kind, in registration order.
    pub fn catch_alls(&self, kind: UpdateKind) -> &[Arc<Handler>] {
        self.catch_alls.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Generic any-update handlers, in registration order.
    pub fn any_update(&self) -> &[Arc<Handler>] {
        &self.any_update
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.commands.len()
            + self.texts.len()
            + self.callbacks.len()
            + self.steps.len()
            + self.catch_alls.values().map(Vec::len).sum::<usize>()
            + self.any_update.len()
    }

    /// Whether no handlers are registered at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.len())
            .finish()
    }
}
