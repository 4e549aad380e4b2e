//! Middleware chains.
//!
//! A [`MiddlewareChain`] is a singly linked, reverse-ordered sequence of
//! nodes ending in the user's business callback. Every node wraps the next:
//! a middleware receives the context together with a [`Next`] continuation
//! and decides whether execution proceeds by choosing whether to invoke it.
//! Not invoking the continuation short-circuits the rest of the chain — a
//! valid outcome used by auth and validation middleware, not an error.
//!
//! # Construction order
//!
//! Chains are built LIFO. Each [`wrap`](MiddlewareChain::wrap) call wraps
//! the *current* tip, so the first middleware attached sits innermost
//! (closest to the callback) and the last attached sits outermost and runs
//! first:
//!
//! ```rust,ignore
//! let mut chain = MiddlewareChain::terminal(callback);
//! chain.wrap(mw_a);
//! chain.wrap(mw_b);
//! // execution order: mw_b -> mw_a -> callback
//! ```
//!
//! # Sharing
//!
//! A chain is materialized once at registration time. Running it never
//! mutates shared structure (nodes are `Arc`s), so concurrent dispatches of
//! the same handler for different updates are safe as long as the middleware
//! functions themselves are reentrant.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stanza_core::{Context, HandlerResult};

/// A boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A middleware wrapping a handler's execution.
///
/// Implemented automatically for async closures of the shape
/// `Fn(Arc<Context>, Next) -> impl Future<Output = HandlerResult>`.
pub trait Middleware: Send + Sync {
    /// Runs the middleware. Call `next.run(ctx)` to continue the chain, or
    /// return without doing so to short-circuit it.
    fn handle(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: Arc<Context>, next: Next) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx, next))
    }
}

/// The terminal business callback at the innermost end of a chain.
///
/// Implemented automatically for async closures of the shape
/// `Fn(Arc<Context>) -> impl Future<Output = HandlerResult>`.
pub trait Callback: Send + Sync {
    /// Invokes the callback.
    fn call(&self, ctx: Arc<Context>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Callback for F
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<Context>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

enum Node {
    /// A middleware wrapping the rest of the chain.
    Middleware {
        middleware: Arc<dyn Middleware>,
        next: Arc<Node>,
    },
    /// The user callback; its continuation is empty.
    Terminal(Arc<dyn Callback>),
}

/// The invocable continuation handed to a middleware.
///
/// Running it executes everything inner to the current node. Dropping it
/// without running it short-circuits the chain.
pub struct Next {
    node: Arc<Node>,
}

impl Next {
    /// Runs the remainder of the chain.
    pub fn run(self, ctx: Arc<Context>) -> BoxFuture<'static, HandlerResult> {
        match &*self.node {
            Node::Terminal(callback) => callback.call(ctx),
            Node::Middleware { middleware, next } => {
                let next = Next {
                    node: Arc::clone(next),
                };
                middleware.handle(ctx, next)
            }
        }
    }
}

/// A materialized chain of middleware around one terminal callback.
#[derive(Clone)]
pub struct MiddlewareChain {
    tip: Arc<Node>,
}

impl MiddlewareChain {
    /// Creates a chain consisting of just the terminal callback.
    pub fn terminal<C>(callback: C) -> Self
    where
        C: Callback + 'static,
    {
        Self {
            tip: Arc::new(Node::Terminal(Arc::new(callback))),
        }
    }

    /// Wraps the current tip in `middleware`, making it the new outermost
    /// node. The last middleware wrapped is the first to execute.
    pub fn wrap<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.wrap_arc(Arc::new(middleware));
    }

    /// [`wrap`](Self::wrap) for an already shared middleware, used when one
    /// middleware instance is attached to many handlers.
    pub fn wrap_arc(&mut self, middleware: Arc<dyn Middleware>) {
        let next = Arc::clone(&self.tip);
        self.tip = Arc::new(Node::Middleware { middleware, next });
    }

    /// Number of nodes in the chain, the terminal callback included.
    pub fn len(&self) -> usize {
        let mut count = 1;
        let mut node = &self.tip;
        while let Node::Middleware { next, .. } = &**node {
            count += 1;
            node = next;
        }
        count
    }

    /// Whether the chain is just the terminal callback.
    pub fn is_empty(&self) -> bool {
        matches!(&*self.tip, Node::Terminal(_))
    }

    /// Runs the chain from its outermost node.
    pub fn run(&self, ctx: Arc<Context>) -> BoxFuture<'static, HandlerResult> {
        let next = Next {
            node: Arc::clone(&self.tip),
        };
        next.run(ctx)
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.len())
            .finish()
    }
}
