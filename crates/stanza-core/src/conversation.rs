//! Conversation continuation contracts.
//!
//! A multi-turn exchange with a single chat has to survive across
//! independent update deliveries. The dispatcher does this with a small
//! per-conversation state machine stored outside the dispatch pipeline:
//!
//! - `Idle` — no entry in the store for the conversation key.
//! - `Pending(step, skip_others)` — a handler asked for the next relevant
//!   update from the same chat to be routed to the handler registered under
//!   `step`.
//!
//! Transitions are driven entirely by handler code calling
//! [`Context::advance_to`](crate::Context::advance_to) /
//! [`Context::end_conversation`](crate::Context::end_conversation); the
//! resolver only ever observes the state through [`ConversationStore::get`].
//!
//! There is no background expiry task. The in-memory store can optionally
//! attach a TTL to entries, in which case an expired entry behaves exactly
//! as if the conversation had been ended.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::update::Update;

/// Identifies the conversation an update belongs to.
///
/// Whether the user id participates in the key is decided by the configured
/// [`KeyStrategy`]; two strategies never mix within one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    /// The chat the conversation is happening in.
    pub chat_id: i64,
    /// The participating user, when keyed per user within a chat.
    pub user_id: Option<i64>,
}

impl ConversationKey {
    /// Key for a per-chat conversation.
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id,
            user_id: None,
        }
    }

    /// Key for a per-user-within-chat conversation.
    pub fn chat_user(chat_id: i64, user_id: i64) -> Self {
        Self {
            chat_id,
            user_id: Some(user_id),
        }
    }
}

/// How conversation keys are derived from updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// One conversation per chat.
    #[default]
    Chat,
    /// One conversation per user within each chat.
    ChatAndUser,
}

impl KeyStrategy {
    /// Derives the conversation key for an update, if it carries enough
    /// identity to participate in a conversation.
    pub fn key_for(&self, update: &Update) -> Option<ConversationKey> {
        let chat_id = update.chat_id()?;
        match self {
            Self::Chat => Some(ConversationKey::chat(chat_id)),
            Self::ChatAndUser => Some(ConversationKey::chat_user(chat_id, update.from_id()?)),
        }
    }
}

/// The `Pending` half of the conversation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    /// The registered step key the next update should be routed to.
    pub step: String,
    /// When set, the next update runs *only* the step handler; message
    /// catch-alls and generic update handlers are suppressed.
    pub skip_others: bool,
}

impl ConversationEntry {
    /// Creates an entry for `step` with `skip_others` cleared.
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            skip_others: false,
        }
    }

    /// Sets the `skip_others` flag.
    pub fn skipping_others(mut self) -> Self {
        self.skip_others = true;
        self
    }
}

/// External key-value collaborator holding pending conversation state.
///
/// Implementations must tolerate concurrent access from interleaved
/// dispatches; two concurrent updates from the same chat may race on the
/// stored value, which is an accepted property of the design rather than
/// something the store is expected to serialize.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the pending entry for `key`, or `None` when idle.
    async fn get(&self, key: &ConversationKey) -> Option<ConversationEntry>;

    /// Replaces the pending entry for `key` atomically.
    async fn set(&self, key: ConversationKey, entry: ConversationEntry);

    /// Ends the conversation for `key`. Deleting an idle key is a no-op.
    async fn delete(&self, key: &ConversationKey);
}

struct StoredEntry {
    entry: ConversationEntry,
    expires_at: Option<Instant>,
}

/// In-memory [`ConversationStore`] backed by a `RwLock`ed map.
///
/// By default entries live until explicitly ended. [`with_ttl`] attaches a
/// time-to-live to every entry written afterwards; an expired entry is
/// reported as idle and removed on the next lookup, which is observably an
/// implicit `Pending -> Idle` transition.
///
/// [`with_ttl`]: MemoryConversationStore::with_ttl
#[derive(Default)]
pub struct MemoryConversationStore {
    entries: RwLock<HashMap<ConversationKey, StoredEntry>>,
    ttl: Option<Duration>,
}

impl MemoryConversationStore {
    /// Creates a store whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that expires entries `ttl` after they were written.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|stored| stored.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, key: &ConversationKey) -> Option<ConversationEntry> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(stored) if stored.expires_at.is_none_or(|at| at > Instant::now()) => {
                    return Some(stored.entry.clone());
                }
                Some(_) => {}
            }
        }

        // Expired entry: drop it under the write lock, re-checking in case
        // a concurrent set() replaced it in the meantime.
        let mut entries = self.entries.write();
        if let Some(stored) = entries.get(key) {
            if stored.expires_at.is_some_and(|at| at <= Instant::now()) {
                debug!(chat_id = key.chat_id, "conversation entry expired");
                entries.remove(key);
                return None;
            }
            return Some(stored.entry.clone());
        }
        None
    }

    async fn set(&self, key: ConversationKey, entry: ConversationEntry) {
        let stored = StoredEntry {
            entry,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key, stored);
    }

    async fn delete(&self, key: &ConversationKey) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryConversationStore::new();
        let key = ConversationKey::chat(1);

        assert_eq!(store.get(&key).await, None);

        store.set(key.clone(), ConversationEntry::new("ask_name")).await;
        assert_eq!(
            store.get(&key).await,
            Some(ConversationEntry::new("ask_name"))
        );

        store.delete(&key).await;
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn set_replaces_pending_entry() {
        let store = MemoryConversationStore::new();
        let key = ConversationKey::chat(1);

        store.set(key.clone(), ConversationEntry::new("step_a")).await;
        store
            .set(
                key.clone(),
                ConversationEntry::new("step_b").skipping_others(),
            )
            .await;

        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.step, "step_b");
        assert!(entry.skip_others);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryConversationStore::with_ttl(Duration::from_millis(10));
        let key = ConversationKey::chat(1);

        store.set(key.clone(), ConversationEntry::new("step")).await;
        assert!(store.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(25)).await;

        // Expiry is an implicit Pending -> Idle transition.
        assert_eq!(store.get(&key).await, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn keys_with_different_users_are_independent() {
        let store = MemoryConversationStore::new();
        store
            .set(ConversationKey::chat_user(1, 10), ConversationEntry::new("a"))
            .await;

        assert_eq!(store.get(&ConversationKey::chat_user(1, 11)).await, None);
        assert_eq!(store.get(&ConversationKey::chat(1)).await, None);
    }
}
