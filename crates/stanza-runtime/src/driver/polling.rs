//! Long-poll ingestion driver.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stanza_core::classify;
use stanza_framework::Dispatcher;
use stanza_transport::{FetchRequest, TransportResult, UpdateFetcher};

use crate::config::PollingConfig;

/// Pulls update batches from an [`UpdateFetcher`] and feeds them to the
/// dispatcher, one update at a time, in batch order.
///
/// The driver owns the offset. After classifying an update it advances the
/// offset to `update_id + 1` *before* dispatching, so an update whose
/// handlers fault (or whose dispatch is interrupted by shutdown) is never
/// re-fetched. A failed fetch is logged, waited out for the configured
/// retry pause, and retried with the same offset.
pub struct PollingDriver<F: UpdateFetcher> {
    fetcher: F,
    dispatcher: Arc<Dispatcher>,
    config: PollingConfig,
    offset: i64,
}

impl<F: UpdateFetcher> PollingDriver<F> {
    /// Creates a driver that starts from offset zero, letting the platform
    /// pick up wherever the previous confirmed batch left off.
    pub fn new(fetcher: F, dispatcher: Arc<Dispatcher>, config: PollingConfig) -> Self {
        Self {
            fetcher,
            dispatcher,
            config,
            offset: 0,
        }
    }

    /// The offset the next fetch will use.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Fetches and dispatches one batch.
    ///
    /// Returns the number of updates dispatched. Payloads that fail
    /// classification are logged and dropped without advancing the offset;
    /// the surrounding batch keeps flowing. A dropped payload carries no
    /// usable id, so one at the tail of a batch stays below the offset and
    /// is re-fetched (and re-dropped) until a newer valid update moves the
    /// offset past it.
    pub async fn poll_once(&mut self) -> TransportResult<usize> {
        let request = FetchRequest {
            offset: self.offset,
            limit: self.config.limit,
            timeout_secs: Some(self.config.timeout_secs),
            allowed_updates: self.config.allowed_updates.clone(),
        };
        let batch = self.fetcher.fetch(&request).await?;

        let mut dispatched = 0;
        for payload in batch {
            let update = match classify(payload) {
                Ok(update) => update,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable update from batch");
                    continue;
                }
            };

            // Confirm receipt before dispatch: a faulting handler must not
            // cause the platform to redeliver this update.
            self.offset = update.id() + 1;
            self.dispatcher.dispatch(update).await;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Runs the poll loop until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("polling driver started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(dispatched) if dispatched > 0 => {
                        debug!(dispatched, offset = self.offset, "batch dispatched");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            error = %e,
                            pause_secs = self.config.retry_pause_secs,
                            "update fetch failed, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.config.retry_pause()) => {}
                        }
                    }
                },
            }
        }
        info!("polling driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use stanza_core::{Context, MemoryConversationStore};
    use stanza_framework::RegistryBuilder;
    use stanza_transport::TransportError;

    /// Replays scripted fetch outcomes, then returns empty batches.
    struct ScriptedFetcher {
        script: Mutex<VecDeque<TransportResult<Vec<Value>>>>,
        offsets_seen: Mutex<Vec<i64>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<TransportResult<Vec<Value>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                offsets_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UpdateFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> TransportResult<Vec<Value>> {
            self.offsets_seen.lock().push(request.offset);
            self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn message(update_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {"chat": {"id": 7}, "from": {"id": 9}, "text": text}
        })
    }

    fn counting_dispatcher(counter: Arc<AtomicUsize>) -> Arc<Dispatcher> {
        let mut builder = RegistryBuilder::new();
        builder.on_message(move |_ctx: Arc<Context>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        Arc::new(Dispatcher::new(
            builder.build(),
            Arc::new(MemoryConversationStore::new()),
        ))
    }

    #[tokio::test]
    async fn offset_advances_past_every_update_in_the_batch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![
            message(5, "one"),
            message(6, "two"),
        ])]);
        let mut driver = PollingDriver::new(
            fetcher,
            counting_dispatcher(Arc::clone(&counter)),
            PollingConfig::default(),
        );

        let dispatched = driver.poll_once().await.unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(driver.offset(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn offset_advances_even_when_a_handler_faults() {
        let mut builder = RegistryBuilder::new();
        builder.on_message(|_ctx: Arc<Context>| async move { Err("boom".into()) });
        let dispatcher = Arc::new(Dispatcher::new(
            builder.build(),
            Arc::new(MemoryConversationStore::new()),
        ));

        let fetcher = ScriptedFetcher::new(vec![Ok(vec![
            message(5, "one"),
            message(6, "two"),
        ])]);
        let mut driver = PollingDriver::new(fetcher, dispatcher, PollingConfig::default());

        driver.poll_once().await.unwrap();
        assert_eq!(driver.offset(), 7);
    }

    #[tokio::test]
    async fn undecodable_payloads_are_dropped_without_breaking_the_batch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![
            message(5, "one"),
            json!({"message": {"text": "no id"}}),
            message(6, "two"),
        ])]);
        let mut driver = PollingDriver::new(
            fetcher,
            counting_dispatcher(Arc::clone(&counter)),
            PollingConfig::default(),
        );

        let dispatched = driver.poll_once().await.unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(driver.offset(), 7);
    }

    #[tokio::test]
    async fn trailing_undecodable_payload_is_refetched_until_superseded() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![message(5, "one"), json!({"message": {"text": "no id"}})]),
            Ok(vec![json!({"message": {"text": "no id"}})]),
            Ok(vec![json!({"message": {"text": "no id"}}), message(6, "two")]),
        ]);
        let mut driver = PollingDriver::new(
            fetcher,
            counting_dispatcher(Arc::clone(&counter)),
            PollingConfig::default(),
        );

        // The trailing payload has no id, so the offset stops at 6 and the
        // platform keeps re-delivering it.
        assert_eq!(driver.poll_once().await.unwrap(), 1);
        assert_eq!(driver.offset(), 6);

        assert_eq!(driver.poll_once().await.unwrap(), 0);
        assert_eq!(driver.offset(), 6);

        // A newer valid update finally moves the offset past it.
        assert_eq!(driver.poll_once().await.unwrap(), 1);
        assert_eq!(driver.offset(), 7);

        assert_eq!(*driver.fetcher.offsets_seen.lock(), vec![0, 6, 6]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_and_keeps_the_offset() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![message(5, "one")]),
            Err(TransportError::FetchFailed {
                reason: "connection reset".to_string(),
            }),
            Ok(vec![message(6, "two")]),
        ]);
        let mut driver = PollingDriver::new(
            fetcher,
            counting_dispatcher(Arc::clone(&counter)),
            PollingConfig::default(),
        );

        driver.poll_once().await.unwrap();
        assert_eq!(driver.offset(), 6);

        assert!(driver.poll_once().await.is_err());
        assert_eq!(driver.offset(), 6);

        driver.poll_once().await.unwrap();
        assert_eq!(driver.offset(), 7);

        // The failed fetch and its retry both asked for offset 6.
        assert_eq!(*driver.fetcher.offsets_seen.lock(), vec![0, 6, 6]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let fetcher = ScriptedFetcher::new(vec![Err(TransportError::FetchFailed {
            reason: "down".to_string(),
        })]);
        let driver = PollingDriver::new(
            fetcher,
            counting_dispatcher(Arc::new(AtomicUsize::new(0))),
            PollingConfig::default(),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(driver.run(cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
