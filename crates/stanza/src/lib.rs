//! # Stanza
//!
//! An event-driven dispatch framework for chat bots.
//!
//! ## Overview
//!
//! Stanza classifies raw platform updates into typed kinds, resolves each
//! one against a frozen handler registry, and runs the matching handlers
//! through composable middleware chains. Multi-step conversations are
//! continued through a pluggable store, and three interchangeable ingestion
//! drivers (long-polling, sync webhook, async webhook) connect the whole
//! thing to the outside world.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────────────────────┐
//! │   Driver     │────▶│ Dispatcher │────▶│ middleware ▶ … ▶ handler     │
//! │ (poll/webhook)│    │ (resolver) │────▶│ middleware ▶ … ▶ handler     │
//! └──────────────┘     └────────────┘     └──────────────────────────────┘
//! ```
//!
//! - **Drivers**: own the network boundary and the ingestion loop
//! - **Dispatcher**: classifies, resolves, and runs handlers sequentially
//! - **Registry**: immutable snapshot of triggers built before startup
//! - **Conversations**: per-chat (or per-user) step continuation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stanza::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn start(ctx: Arc<Context>) -> HandlerResult {
//!     ctx.advance_to("ask_name").await;
//!     Ok(())
//! }
//!
//! async fn ask_name(ctx: Arc<Context>) -> HandlerResult {
//!     ctx.end_conversation().await;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StanzaConfig::load()?;
//!     stanza::runtime::logging::init_from_config(&config.logging);
//!
//!     let mut builder = RegistryBuilder::new();
//!     builder.on_command("start", start)?;
//!     builder.on_conversation_step("ask_name", ask_name);
//!
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         builder.build(),
//!         Arc::new(MemoryConversationStore::new()),
//!     ));
//!
//!     let fetcher = HttpUpdateFetcher::new(&config.token);
//!     let cancel = CancellationToken::new();
//!     PollingDriver::new(fetcher, dispatcher, config.polling.clone())
//!         .run(cancel)
//!         .await;
//!     Ok(())
//! }
//! ```

pub use stanza_core as core;
pub use stanza_framework as framework;
pub use stanza_runtime as runtime;
pub use stanza_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use stanza::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Classification and context - what handlers receive
    pub use stanza_core::{
        ClassifyError, Context, ConversationStore, KeyStrategy, MemoryConversationStore, Update,
        UpdateKind, classify,
    };

    // Registration and dispatch
    pub use stanza_framework::{
        Dispatcher, Filter, Handler, HandlerResult, Middleware, Next, RegistryBuilder,
        RegistryError,
    };

    // Ingestion drivers and configuration
    pub use stanza_runtime::config::StanzaConfig;
    pub use stanza_runtime::driver::{AsyncWebhookDriver, PollingDriver, SyncWebhookDriver};

    // Transport surface used when wiring drivers by hand
    pub use stanza_transport::{HttpUpdateFetcher, UpdateFetcher, WebhookAuth};
}
