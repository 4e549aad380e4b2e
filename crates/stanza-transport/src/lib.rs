//! # Stanza Transport
//!
//! Network transport layer for the Stanza bot framework.
//!
//! This crate owns the two network boundaries the ingestion drivers sit
//! behind:
//!
//! - the **polling** side: the [`UpdateFetcher`] contract and its HTTP
//!   implementation over the platform's `getUpdates` method (feature
//!   `http-client`),
//! - the **webhook** side: request [authorization](auth) and the axum
//!   [listener](server) that feeds inbound deliveries to the runtime
//!   (feature `http-server`).
//!
//! Nothing in this crate knows about handlers or registries; it moves raw
//! payloads and reports typed errors.

pub mod auth;
pub mod error;
pub mod fetch;

#[cfg(feature = "http-server")]
pub mod server;

pub use auth::{Ipv4Range, PLATFORM_RANGES, WebhookAuth};
pub use error::{AuthError, TransportError, TransportResult};
pub use fetch::{FetchRequest, UpdateFetcher};

#[cfg(feature = "http-client")]
pub use fetch::HttpUpdateFetcher;

#[cfg(feature = "http-server")]
pub use server::{BoxedWebhookHandler, ListenerHandle, WebhookReply, WebhookRequest};
