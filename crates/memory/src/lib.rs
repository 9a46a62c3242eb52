//! Conversation memory for parley.
//!
//! - [`ShortTermMemory`]: per-conversation rolling buffer bounded by tokens
//!   and entry count, mirrored best-effort to a durable store
//! - [`SemanticMemory`]: durable conversation summaries with keyword scoring
//! - Durable stores: [`InMemoryStore`] and (with the `sqlite` feature)
//!   [`SqliteStore`]

pub mod in_memory;
pub mod semantic;
pub mod short_term;
pub mod token;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use semantic::{SemanticMemory, keyword_score};
pub use short_term::{ShortTermMemory, ShortTermStats};
pub use token::estimate_tokens;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
