//! Webhook HTTP listener.
//!
//! The listener owns only the HTTP plumbing: it binds a socket, accepts
//! concurrent POST requests on `/{token}`, and hands each one — body,
//! source address, and the token path segment — to the registered
//! [`BoxedWebhookHandler`]. Authorization, decoding, and dispatch all live
//! in the handler supplied by the runtime layer, so the listener itself
//! never needs to know about bots or registries.

use std::net::{IpAddr, SocketAddr};

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::TransportResult;

/// One inbound webhook delivery, as seen by the handler.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// The peer address the request arrived from.
    pub remote_addr: Option<IpAddr>,
    /// The last path segment of the request URL.
    pub path_token: String,
    /// The raw request body.
    pub body: Vec<u8>,
}

/// The outcome the handler wants reported to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookReply {
    /// Delivery accepted (whether or not handlers faulted — the platform
    /// must not be driven to retry the update).
    Ok,
    /// The request failed an authorization check.
    Unauthorized,
    /// The body was not a decodable update.
    Malformed,
}

impl WebhookReply {
    fn status(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Malformed => StatusCode::BAD_REQUEST,
        }
    }
}

/// Type-erased per-request handler installed by the runtime layer.
pub type BoxedWebhookHandler =
    Arc<dyn Fn(WebhookRequest) -> BoxFuture<'static, WebhookReply> + Send + Sync>;

/// Handle to a running listener; dropping it does not stop the server,
/// calling [`shutdown`](ListenerHandle::shutdown) does.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
}

impl ListenerHandle {
    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the listener.
    pub fn shutdown(self) {
        // A dead receiver means the server already exited.
        let _ = self.shutdown_tx.send(());
    }
}

/// Builds the webhook router around a handler.
///
/// Exposed separately from [`listen`] so request handling can be exercised
/// without binding a socket.
pub fn router(handler: BoxedWebhookHandler) -> Router {
    Router::new()
        .route("/{token}", post(receive))
        .with_state(handler)
}

/// Binds `addr` and serves webhook deliveries until shut down.
pub async fn listen(addr: &str, handler: BoxedWebhookHandler) -> TransportResult<ListenerHandle> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "webhook listener bound");

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let app = router(handler);

    tokio::spawn(async move {
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "webhook listener error");
                }
            }
            _ = &mut shutdown_rx => {
                info!("webhook listener shutting down");
            }
        }
    });

    Ok(ListenerHandle {
        local_addr,
        shutdown_tx,
    })
}

async fn receive(
    State(handler): State<BoxedWebhookHandler>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(token): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let request = WebhookRequest {
        remote_addr: Some(addr.ip()),
        path_token: token,
        body: body.to_vec(),
    };
    handler(request).await.status()
}
