//! Ingestion drivers.
//!
//! Three interchangeable drivers own the network/loop boundary and feed
//! updates into the [`Dispatcher`](stanza_framework::Dispatcher):
//!
//! - [`PollingDriver`] — long-poll loop over an
//!   [`UpdateFetcher`](stanza_transport::UpdateFetcher)
//! - [`SyncWebhookDriver`] — one inbound request, one update, one dispatch
//! - [`AsyncWebhookDriver`] — long-running listener accepting concurrent
//!   deliveries
//!
//! All three share the same failure policy: per-update failures are routed
//! to the global error handler and never stop the driver.

mod polling;
mod webhook;

pub use polling::PollingDriver;
pub use webhook::{AsyncWebhookDriver, SyncWebhookDriver};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a cancellation token that fires on Ctrl-C.
///
/// Convenience for wiring [`PollingDriver::run`] to process shutdown. Must
/// be called from within a tokio runtime.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signalled.cancel();
        }
    });
    token
}
