//! # Parley Core
//!
//! Domain types, collaborator traits, and error definitions for the parley
//! conversational attention pipeline. Every other crate in the workspace
//! depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Anything the pipeline consumes from the outside world is a trait here:
//! - Durable storage for short-term mirrors and semantic summaries
//! - The capability registry used to run side-effecting actions
//! - The conversation-mode lookup used by the response filter
//!
//! Implementations live in their respective crates (or in the embedding
//! application), which keeps the pipeline testable with in-memory stubs.

pub mod capability;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use capability::{
    ActionContext, CapabilityRegistry, ConversationModes, NoCapabilities, StaticConversationModes,
};
pub use error::{
    ActionError, CapabilityError, CommandError, Error, MemoryError, Result, panic_message,
};
pub use event::{DomainEvent, EventBus};
pub use memory::{
    ScoredEntry, SemanticEntry, SemanticStore, ShortTermEntry, ShortTermStore, query_terms,
};
pub use message::{ConversationId, InboundMessage};
