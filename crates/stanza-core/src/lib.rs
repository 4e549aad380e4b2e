//! # Stanza Core
//!
//! Core types and contracts for the Stanza bot framework.
//!
//! This layer owns everything the dispatch pipeline agrees on but that has
//! no control flow of its own:
//!
//! - The [`Update`] model and its [classifier](update::classify)
//! - The per-dispatch [`Context`] handed to handlers and middleware
//! - The [`ConversationStore`] contract and its in-memory implementation
//! - Unified error types shared across the workspace
//!
//! Higher layers (`stanza-framework`, `stanza-runtime`) build the registry,
//! resolver, and ingestion drivers on top of these types.

pub mod context;
pub mod conversation;
pub mod error;
pub mod update;

pub use context::Context;
pub use conversation::{
    ConversationEntry, ConversationKey, ConversationStore, KeyStrategy, MemoryConversationStore,
};
pub use error::{ClassifyError, ClassifyResult, HandlerError, HandlerResult};
pub use update::{Update, UpdateKind, classify};
