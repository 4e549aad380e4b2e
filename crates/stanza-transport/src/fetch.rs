//! Update-fetch contract for the polling driver.
//!
//! The polling driver only depends on the [`UpdateFetcher`] trait: a method
//! that accepts an offset, a limit, a long-poll timeout, and an optional
//! allow-list of update types, and returns an ordered batch of raw update
//! payloads. Network failure surfaces as a typed [`TransportError`]; the
//! driver decides the retry policy.
//!
//! [`HttpUpdateFetcher`] (feature `http-client`) implements the contract
//! against the platform's HTTP API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::TransportResult;

/// Parameters for one update-fetch request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchRequest {
    /// Identifier of the first update to return; last seen id plus one.
    pub offset: i64,

    /// Maximum number of updates per batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u8>,

    /// Long-poll timeout in seconds, passed straight through to the
    /// platform request.
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,

    /// Update types the platform should deliver; `None` means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<String>>,
}

/// Source of raw update batches for the polling driver.
#[async_trait]
pub trait UpdateFetcher: Send + Sync {
    /// Fetches the next ordered batch of raw updates.
    async fn fetch(&self, request: &FetchRequest) -> TransportResult<Vec<Value>>;
}

#[cfg(feature = "http-client")]
pub use http::HttpUpdateFetcher;

#[cfg(feature = "http-client")]
mod http {
    use super::{FetchRequest, UpdateFetcher};
    use crate::error::{TransportError, TransportResult};

    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::Value;
    use tracing::trace;

    /// Response envelope the platform wraps every method result in.
    #[derive(Debug, Deserialize)]
    struct ApiEnvelope {
        ok: bool,
        #[serde(default)]
        result: Vec<Value>,
        #[serde(default)]
        description: Option<String>,
    }

    /// [`UpdateFetcher`] over the platform's HTTP API.
    #[derive(Debug, Clone)]
    pub struct HttpUpdateFetcher {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpUpdateFetcher {
        /// Creates a fetcher for the bot identified by `token`, using the
        /// platform's default API host.
        pub fn new(token: &str) -> Self {
            Self::with_base_url("https://api.telegram.org", token)
        }

        /// Creates a fetcher against a custom API host, e.g. a local test
        /// server.
        pub fn with_base_url(base_url: &str, token: &str) -> Self {
            let endpoint = format!("{}/bot{}/getUpdates", base_url.trim_end_matches('/'), token);
            Self {
                client: reqwest::Client::new(),
                endpoint,
            }
        }
    }

    #[async_trait]
    impl UpdateFetcher for HttpUpdateFetcher {
        async fn fetch(&self, request: &FetchRequest) -> TransportResult<Vec<Value>> {
            // The HTTP timeout must outlast the long-poll timeout or every
            // empty poll would surface as an error.
            let http_timeout = Duration::from_secs(u64::from(request.timeout_secs.unwrap_or(0)) + 10);

            let response = self
                .client
                .post(&self.endpoint)
                .timeout(http_timeout)
                .json(request)
                .send()
                .await?;

            let envelope: ApiEnvelope = response.json().await?;
            if !envelope.ok {
                return Err(TransportError::PlatformError {
                    description: envelope
                        .description
                        .unwrap_or_else(|| "no description".to_string()),
                });
            }

            trace!(
                offset = request.offset,
                batch_len = envelope.result.len(),
                "fetched update batch"
            );
            Ok(envelope.result)
        }
    }
}
