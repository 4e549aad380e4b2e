//! Handler model.
//!
//! A [`Handler`] pairs a trigger condition with a user callback, the
//! middleware chain wrapped around it, and any [`Filter`] predicates gating
//! it. Handlers are created at registration time, owned exclusively by the
//! registry, and never removed at runtime; the only mutation allowed after
//! creation is chain and filter growth while the registry is still being
//! built.

use std::sync::Arc;

use regex::Regex;
use stanza_core::{Context, HandlerResult, UpdateKind};

use crate::middleware::{BoxFuture, Callback, Middleware, MiddlewareChain};

/// A synchronous predicate attached to a handler.
///
/// All filters must pass for the handler to run; a rejected dispatch is
/// skipped silently, before any of the handler's middleware executes.
/// Implemented automatically for `Fn(&Context) -> bool`.
pub trait Filter: Send + Sync {
    /// Whether the handler should run for this dispatch.
    fn matches(&self, ctx: &Context) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &Context) -> bool {
        self(ctx)
    }
}

/// How a callback-query trigger is matched against the query text.
#[derive(Debug, Clone)]
pub enum CallbackMatch {
    /// Literal equality with the callback data (or associated message text).
    Exact(String),
    /// Regex match over the callback data (or associated message text).
    Pattern(Regex),
}

impl CallbackMatch {
    /// Whether `text` satisfies this match.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == text,
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

/// The trigger condition a handler is registered under.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Exact command text of a message (`/start`).
    Command(String),
    /// Exact full text of a message.
    Text(String),
    /// Callback-query match, exact or regex.
    CallbackQuery(CallbackMatch),
    /// A named conversation step; selected when the step is pending.
    ConversationStep(String),
    /// Every update of one kind.
    CatchAll(UpdateKind),
    /// Every update, regardless of kind.
    AnyUpdate,
}

impl Trigger {
    /// Short trigger-kind label for logging and error messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Text(_) => "text",
            Self::CallbackQuery(_) => "callback_query",
            Self::ConversationStep(_) => "conversation_step",
            Self::CatchAll(_) => "catch_all",
            Self::AnyUpdate => "any_update",
        }
    }
}

/// A registered pairing of a trigger condition, a user callback, and its
/// middleware chain.
pub struct Handler {
    id: Option<String>,
    trigger: Trigger,
    chain: MiddlewareChain,
    filters: Vec<Arc<dyn Filter>>,
}

impl Handler {
    pub(crate) fn new<C>(trigger: Trigger, callback: C) -> Self
    where
        C: Callback + 'static,
    {
        Self {
            id: None,
            trigger,
            chain: MiddlewareChain::terminal(callback),
            filters: Vec::new(),
        }
    }

    /// Sets a debugging id for this handler.
    pub fn with_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches a handler-scoped middleware.
    ///
    /// Chains grow LIFO: the middleware attached last is the first to run.
    pub fn middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.chain.wrap(middleware);
        self
    }

    pub(crate) fn wrap_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.chain.wrap_arc(middleware);
    }

    /// Attaches a predicate that must hold for this handler to run.
    ///
    /// Filters are conjunctive and evaluated before any middleware; a
    /// dispatch rejected by a filter is skipped, not faulted.
    pub fn filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Filter + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Whether every attached filter accepts this dispatch.
    pub fn passes_filters(&self, ctx: &Context) -> bool {
        self.filters.iter().all(|f| f.matches(ctx))
    }

    /// The handler's id, if one was set.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The trigger this handler was registered under.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Runs this handler's full middleware chain for one dispatch.
    pub fn run(&self, ctx: Arc<Context>) -> BoxFuture<'static, HandlerResult> {
        self.chain.run(ctx)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("chain", &self.chain)
            .field("filter_count", &self.filters.len())
            .finish()
    }
}
