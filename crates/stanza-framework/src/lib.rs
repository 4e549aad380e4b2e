//! # Stanza Framework
//!
//! Handler registration, middleware chains, and dispatch resolution for
//! the Stanza bot framework.
//!
//! This layer turns classified updates into handler executions:
//!
//! - [`RegistryBuilder`] collects handlers at startup and freezes them into
//!   an immutable [`HandlerRegistry`] snapshot
//! - [`MiddlewareChain`] wraps each handler's callback in
//!   continuation-passing middleware
//! - [`DispatchResolver`] orders the handlers that must react to one update
//! - [`Dispatcher`] runs the resolved chains and routes faults to the
//!   global error handler
//!
//! The ingestion drivers in `stanza-runtime` feed updates into the
//! [`Dispatcher`]; everything here is transport-agnostic.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod resolver;

pub use stanza_core::{HandlerError, HandlerResult};

pub use dispatcher::{Dispatcher, ErrorHandler};
pub use error::{RegistryError, RegistryResult};
pub use handler::{CallbackMatch, Filter, Handler, Trigger};
pub use middleware::{BoxFuture, Callback, Middleware, MiddlewareChain, Next};
pub use registry::{HandlerRegistry, RegistryBuilder};
pub use resolver::DispatchResolver;
