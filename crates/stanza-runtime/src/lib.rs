//! # Stanza Runtime
//!
//! Everything needed to take a built dispatcher and run it against the
//! outside world: layered configuration, logging setup, and the three
//! ingestion drivers (long-polling, sync webhook, async webhook).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stanza_core::{Context, MemoryConversationStore};
//! use stanza_framework::{Dispatcher, HandlerResult, RegistryBuilder};
//! use stanza_runtime::config::StanzaConfig;
//! use stanza_runtime::driver::PollingDriver;
//! use stanza_runtime::logging;
//! use stanza_transport::HttpUpdateFetcher;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn start(_ctx: Arc<Context>) -> HandlerResult {
//!     Ok(())
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StanzaConfig::load()?;
//! logging::init_from_config(&config.logging);
//!
//! let mut builder = RegistryBuilder::new();
//! builder.on_command("start", start)?;
//!
//! let dispatcher = Arc::new(Dispatcher::with_key_strategy(
//!     builder.build(),
//!     Arc::new(MemoryConversationStore::new()),
//!     config.conversation.key_strategy.into(),
//! ));
//!
//! let fetcher = HttpUpdateFetcher::new(&config.token);
//! let cancel = CancellationToken::new();
//! PollingDriver::new(fetcher, dispatcher, config.polling.clone())
//!     .run(cancel)
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;

pub use config::StanzaConfig;
pub use driver::{AsyncWebhookDriver, PollingDriver, SyncWebhookDriver, shutdown_token};
pub use error::{RuntimeError, RuntimeResult};
