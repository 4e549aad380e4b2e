//! Webhook ingestion drivers.
//!
//! Both drivers funnel deliveries through the same gate: authorize the
//! request, decode the body into a classified update, dispatch. The sync
//! driver exposes the gate as a single call for callers that already own an
//! HTTP surface (serverless handlers, existing routers); the async driver
//! wraps it in the transport listener and serves deliveries concurrently.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use stanza_core::classify;
use stanza_framework::Dispatcher;
use stanza_transport::server::{self, ListenerHandle, WebhookReply, WebhookRequest};
use stanza_transport::WebhookAuth;

use crate::error::RuntimeResult;

/// Shared authorize-decode-dispatch pipeline.
struct WebhookGate {
    auth: WebhookAuth,
    dispatcher: Arc<Dispatcher>,
}

impl WebhookGate {
    async fn handle(&self, request: WebhookRequest) -> WebhookReply {
        if let Err(e) = self.auth.authorize(request.remote_addr, &request.path_token) {
            warn!(error = %e, "rejected webhook delivery");
            return WebhookReply::Unauthorized;
        }

        let payload = match serde_json::from_slice(&request.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "webhook body is not valid JSON");
                return WebhookReply::Malformed;
            }
        };
        let update = match classify(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "webhook body is not a decodable update");
                return WebhookReply::Malformed;
            }
        };

        // Handler faults were already routed inside dispatch; the platform
        // still gets a 200 so it does not redeliver.
        let ran = self.dispatcher.dispatch(update).await;
        debug!(handlers = ran, "webhook delivery dispatched");
        WebhookReply::Ok
    }
}

/// One-shot webhook driver for callers that own the HTTP surface.
pub struct SyncWebhookDriver {
    gate: WebhookGate,
}

impl SyncWebhookDriver {
    /// Creates a driver dispatching through `dispatcher`, guarding each
    /// delivery with `auth`.
    pub fn new(auth: WebhookAuth, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            gate: WebhookGate { auth, dispatcher },
        }
    }

    /// Processes one delivery and reports how it should be answered.
    ///
    /// `remote` is the peer address when the caller knows it; passing
    /// `None` fails the source check if that check is enabled.
    pub async fn handle(
        &self,
        body: &[u8],
        remote: Option<IpAddr>,
        path_token: &str,
    ) -> WebhookReply {
        self.gate
            .handle(WebhookRequest {
                remote_addr: remote,
                path_token: path_token.to_string(),
                body: body.to_vec(),
            })
            .await
    }
}

/// Long-running webhook driver with its own HTTP listener.
pub struct AsyncWebhookDriver {
    gate: Arc<WebhookGate>,
    bind_addr: String,
}

impl AsyncWebhookDriver {
    /// Creates a driver that will bind `bind_addr` when started.
    pub fn new(auth: WebhookAuth, dispatcher: Arc<Dispatcher>, bind_addr: impl Into<String>) -> Self {
        Self {
            gate: Arc::new(WebhookGate { auth, dispatcher }),
            bind_addr: bind_addr.into(),
        }
    }

    /// Binds the listener and starts serving deliveries.
    ///
    /// Deliveries are processed concurrently; each one independently walks
    /// the authorize-decode-dispatch pipeline. The returned handle stops
    /// the listener.
    pub async fn start(&self) -> RuntimeResult<ListenerHandle> {
        let gate = Arc::clone(&self.gate);
        let handle = server::listen(
            &self.bind_addr,
            Arc::new(move |request| {
                let gate = Arc::clone(&gate);
                Box::pin(async move { gate.handle(request).await })
            }),
        )
        .await?;
        info!(addr = %handle.local_addr(), "webhook driver started");
        Ok(handle)
    }
}
