//! The dispatcher: one classified update in, every matching chain run.
//!
//! The [`Dispatcher`] owns the frozen registry (through its resolver), the
//! conversation store, and the optional global error handler. For each
//! update it creates a single [`Context`], resolves the ordered handler
//! list, and runs each handler's middleware chain sequentially and
//! exhaustively: a fault in one chain is routed to the error handler (or
//! logged when none is configured) and the remaining handlers still run.
//!
//! Handlers in the resolved list are never parallelized; concurrency lives
//! one level up, where the ingestion drivers may dispatch *different*
//! updates concurrently.

use std::sync::Arc;

use tracing::{Level, debug, error, span};

use stanza_core::{Context, ConversationStore, HandlerError, KeyStrategy, Update};

use crate::registry::HandlerRegistry;
use crate::resolver::DispatchResolver;

/// User-supplied callback invoked whenever a handler chain faults.
pub type ErrorHandler = Arc<dyn Fn(HandlerError, Arc<Context>) + Send + Sync>;

/// Executes resolved handler lists against updates.
pub struct Dispatcher {
    resolver: DispatchResolver,
    store: Arc<dyn ConversationStore>,
    error_handler: Option<ErrorHandler>,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    pub fn new(registry: HandlerRegistry, store: Arc<dyn ConversationStore>) -> Self {
        Self::with_key_strategy(registry, store, KeyStrategy::default())
    }

    /// Creates a dispatcher with an explicit conversation key strategy.
    pub fn with_key_strategy(
        registry: HandlerRegistry,
        store: Arc<dyn ConversationStore>,
        key_strategy: KeyStrategy,
    ) -> Self {
        let resolver = DispatchResolver::new(
            Arc::new(registry),
            Arc::clone(&store),
            key_strategy,
        );
        Self {
            resolver,
            store,
            error_handler: None,
        }
    }

    /// Installs the global error handler (builder pattern).
    ///
    /// Invoked with the fault and the context that was active whenever a
    /// handler chain returns an error. Without one, faults are only logged.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(HandlerError, Arc<Context>) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// The resolver backing this dispatcher.
    pub fn resolver(&self) -> &DispatchResolver {
        &self.resolver
    }

    /// Dispatches one update through every matching handler chain.
    ///
    /// Returns the number of handlers that ran. Zero means nothing was
    /// registered for this update's kind: a silent no-op.
    pub async fn dispatch(&self, update: Update) -> usize {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            update_id = update.id(),
            kind = %update.kind()
        );
        let _enter = span.enter();

        let update = Arc::new(update);
        let handlers = self.resolver.resolve(&update).await;
        if handlers.is_empty() {
            debug!("no handlers registered for update");
            return 0;
        }

        let key = self.resolver.key_strategy().key_for(&update);
        let ctx = Arc::new(Context::new(
            Arc::clone(&update),
            Arc::clone(&self.store),
            key,
        ));

        let mut ran = 0;
        for handler in handlers {
            if !handler.passes_filters(&ctx) {
                debug!(handler = handler.id().unwrap_or("<unnamed>"), "filtered out");
                continue;
            }
            ran += 1;
            if let Err(fault) = handler.run(Arc::clone(&ctx)).await {
                self.route_error(fault, Arc::clone(&ctx), handler.id());
            }
        }
        ran
    }

    fn route_error(&self, fault: HandlerError, ctx: Arc<Context>, handler_id: Option<&str>) {
        match &self.error_handler {
            Some(handler) => handler(fault, ctx),
            None => error!(
                update_id = ctx.update().id(),
                handler = handler_id.unwrap_or("<unnamed>"),
                error = %fault,
                "handler chain faulted"
            ),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resolver", &self.resolver)
            .field("has_error_handler", &self.error_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use parking_lot::Mutex;
    use serde_json::json;
    use stanza_core::{MemoryConversationStore, classify};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(text: &str) -> Update {
        classify(json!({
            "update_id": 1,
            "message": {"chat": {"id": 7}, "from": {"id": 9}, "text": text}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn dispatch_runs_every_matching_handler() {
        let counter = Arc::new(AtomicUsize::new(0));

        let mut builder = RegistryBuilder::new();
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            builder.on_message(move |_ctx: Arc<Context>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        let dispatcher =
            Dispatcher::new(builder.build(), Arc::new(MemoryConversationStore::new()));
        let ran = dispatcher.dispatch(message("hi")).await;

        assert_eq!(ran, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_without_handlers_is_a_silent_noop() {
        let dispatcher = Dispatcher::new(
            RegistryBuilder::new().build(),
            Arc::new(MemoryConversationStore::new()),
        );
        assert_eq!(dispatcher.dispatch(message("hi")).await, 0);
    }

    #[tokio::test]
    async fn faults_are_routed_and_do_not_stop_later_handlers() {
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let ran_after = Arc::new(AtomicUsize::new(0));

        let mut builder = RegistryBuilder::new();
        builder.on_message(|_ctx: Arc<Context>| async move {
            Err("boom".into())
        });
        let ran = Arc::clone(&ran_after);
        builder.on_message(move |_ctx: Arc<Context>| {
            let ran = Arc::clone(&ran);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let errors_sink = Arc::clone(&errors);
        let dispatcher =
            Dispatcher::new(builder.build(), Arc::new(MemoryConversationStore::new()))
                .error_handler(move |fault, _ctx| {
                    errors_sink.lock().push(fault.to_string());
                });

        dispatcher.dispatch(message("hi")).await;

        assert_eq!(*errors.lock(), vec!["boom"]);
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filtered_out_handlers_are_skipped_and_not_counted() {
        let counter = Arc::new(AtomicUsize::new(0));

        let mut builder = RegistryBuilder::new();
        let probe = Arc::clone(&counter);
        builder
            .on_message(move |_ctx: Arc<Context>| {
                let probe = Arc::clone(&probe);
                async move {
                    probe.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .filter(|ctx: &Context| ctx.update().text() == Some("wanted"));

        let dispatcher =
            Dispatcher::new(builder.build(), Arc::new(MemoryConversationStore::new()));

        assert_eq!(dispatcher.dispatch(message("other")).await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(dispatcher.dispatch(message("wanted")).await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_advances_conversation_for_next_update() {
        let store = Arc::new(MemoryConversationStore::new());
        let answered = Arc::new(AtomicUsize::new(0));

        let mut builder = RegistryBuilder::new();
        builder
            .on_command("survey", |ctx: Arc<Context>| async move {
                ctx.advance_to("ask_age").await;
                Ok(())
            })
            .unwrap();
        let answered_probe = Arc::clone(&answered);
        builder.on_conversation_step("ask_age", move |ctx: Arc<Context>| {
            let answered = Arc::clone(&answered_probe);
            async move {
                answered.fetch_add(1, Ordering::SeqCst);
                ctx.end_conversation().await;
                Ok(())
            }
        });

        let dispatcher = Dispatcher::new(builder.build(), Arc::clone(&store) as _);

        dispatcher.dispatch(message("/survey")).await;
        dispatcher.dispatch(message("31")).await;
        assert_eq!(answered.load(Ordering::SeqCst), 1);

        // The step ended the conversation, so a further message is idle.
        dispatcher.dispatch(message("32")).await;
        assert_eq!(answered.load(Ordering::SeqCst), 1);
    }
}
