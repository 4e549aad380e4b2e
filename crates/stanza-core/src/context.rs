//! Per-dispatch context handed to handlers and middleware.
//!
//! One [`Context`] is created per resolved update and shared (behind an
//! `Arc`) by every handler chain that runs for it. It carries:
//!
//! - the classified [`Update`] (read-only),
//! - a typed scratch map for middleware to pass data inward to the terminal
//!   callback (isolated to this one dispatch),
//! - the conversation handle, through which handler code drives the
//!   `Idle`/`Pending` conversation state machine.
//!
//! The context is exclusively owned by the dispatch that created it and is
//! discarded once every handler for the update has run.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::conversation::{ConversationEntry, ConversationKey, ConversationStore};
use crate::update::Update;

/// The mutable bag passed through an entire middleware chain invocation.
pub struct Context {
    update: Arc<Update>,
    scratch: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    store: Arc<dyn ConversationStore>,
    conversation_key: Option<ConversationKey>,
}

impl Context {
    /// Creates a context for one dispatch of `update`.
    ///
    /// `conversation_key` is `None` for updates that carry no chat identity;
    /// conversation operations on such a context are logged no-ops.
    pub fn new(
        update: Arc<Update>,
        store: Arc<dyn ConversationStore>,
        conversation_key: Option<ConversationKey>,
    ) -> Self {
        Self {
            update,
            scratch: Mutex::new(HashMap::new()),
            store,
            conversation_key,
        }
    }

    /// The update being dispatched.
    pub fn update(&self) -> &Update {
        &self.update
    }

    /// A clone of the update `Arc`.
    pub fn update_arc(&self) -> Arc<Update> {
        Arc::clone(&self.update)
    }

    /// The conversation key derived for this update, if any.
    pub fn conversation_key(&self) -> Option<&ConversationKey> {
        self.conversation_key.as_ref()
    }

    // ─── Scratch state ────────────────────────────────────────────────────

    /// Stores a value in the dispatch-scoped scratch map.
    ///
    /// One value per type; subsequent calls overwrite. Typical use is a
    /// middleware depositing derived data for the terminal callback.
    pub fn set_scratch<T: Send + Sync + 'static>(&self, value: T) {
        self.scratch.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the scratch map.
    pub fn get_scratch<T: Clone + 'static>(&self) -> Option<T> {
        self.scratch
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns a value from the scratch map.
    pub fn take_scratch<T: 'static>(&self) -> Option<T> {
        self.scratch
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Whether a value of type `T` is present in the scratch map.
    pub fn has_scratch<T: 'static>(&self) -> bool {
        self.scratch.lock().contains_key(&TypeId::of::<T>())
    }

    // ─── Conversation control ─────────────────────────────────────────────

    /// Advances this chat's conversation to `step`.
    ///
    /// The next message-shaped update from the same conversation key will
    /// resolve to the handler registered under `step`, alongside whatever
    /// catch-alls also match. Replaces any pending step atomically.
    pub async fn advance_to(&self, step: impl Into<String>) {
        self.store_entry(ConversationEntry::new(step)).await;
    }

    /// Advances to `step` and suppresses all other handlers on the next
    /// update: only the step handler will run.
    pub async fn advance_skipping_others(&self, step: impl Into<String>) {
        self.store_entry(ConversationEntry::new(step).skipping_others())
            .await;
    }

    /// Re-enters the pending state with an identical entry.
    ///
    /// Used by a step handler to re-prompt on invalid input; equivalent to
    /// advancing to the same step with the same flags.
    pub async fn redo(&self, entry: ConversationEntry) {
        self.store_entry(entry).await;
    }

    /// Ends this chat's conversation, returning the key to `Idle`.
    pub async fn end_conversation(&self) {
        match &self.conversation_key {
            Some(key) => self.store.delete(key).await,
            None => warn!(
                update_id = self.update.id(),
                "end_conversation called on an update without a conversation key"
            ),
        }
    }

    async fn store_entry(&self, entry: ConversationEntry) {
        match &self.conversation_key {
            Some(key) => self.store.set(key.clone(), entry).await,
            None => warn!(
                update_id = self.update.id(),
                "conversation advance called on an update without a conversation key"
            ),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("update_id", &self.update.id())
            .field("kind", &self.update.kind())
            .field("conversation_key", &self.conversation_key)
            .finish_non_exhaustive()
    }
}
