//! Memory types and durable-store traits.
//!
//! The pipeline keeps two kinds of conversational memory:
//! - Short-term: a rolling per-conversation buffer, mirrored best-effort to a
//!   durable append-only store
//! - Semantic: durable summaries of past conversation fragments, searchable
//!   by keyword

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::ConversationId;

/// A single observed message held in short-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermEntry {
    pub author_id: String,

    pub author_name: String,

    pub content: String,

    /// When the message was sent (authoritative ordering key)
    pub timestamp: DateTime<Utc>,

    /// Approximate token cost, filled in on insertion
    #[serde(default)]
    pub estimated_tokens: usize,

    #[serde(default)]
    pub is_automated_author: bool,
}

impl ShortTermEntry {
    pub fn new(
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            author_name: author_name.into(),
            content: content.into(),
            timestamp,
            estimated_tokens: 0,
            is_automated_author: false,
        }
    }
}

/// A durable summary of a stretch of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEntry {
    /// Unique ID (assigned on store when empty)
    #[serde(default)]
    pub id: String,

    pub conversation_id: ConversationId,

    /// Server / guild / workspace the conversation lives in
    #[serde(default)]
    pub group_id: String,

    pub summary: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant_ids: Vec<String>,

    #[serde(default)]
    pub message_count: u32,

    pub start_timestamp: DateTime<Utc>,

    pub end_timestamp: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

/// A semantic entry paired with its keyword relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: SemanticEntry,

    /// Fraction of query terms present, in [0, 1]
    pub score: f32,
}

/// Append-only durable mirror for short-term buffers.
///
/// Rows carry their own timestamps; readers order by timestamp, never by
/// insertion order, so delayed or duplicated writes cannot corrupt reads.
#[async_trait]
pub trait ShortTermStore: Send + Sync {
    /// The store name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Prepare the store (create tables, open files).
    async fn init(&self) -> Result<(), MemoryError>;

    /// Append one observed entry to the mirror.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        entry: &ShortTermEntry,
    ) -> Result<(), MemoryError>;

    /// Load the newest `limit` rows newer than `since`, oldest first.
    async fn load_recent(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShortTermEntry>, MemoryError>;

    /// Delete every row for a conversation. Returns rows removed.
    async fn purge(&self, conversation_id: &ConversationId) -> Result<u64, MemoryError>;

    /// Delete rows older than `cutoff` across all conversations.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError>;
}

/// Durable store of conversation summaries.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert (or replace by id) an entry. Returns its id.
    async fn insert(&self, entry: SemanticEntry) -> Result<String, MemoryError>;

    /// Case-insensitive substring search over summary and topics, most recent
    /// first. An entry matches when any whitespace-separated query term is
    /// found; an empty query matches everything.
    async fn search(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError>;

    /// Most recent entries, newest first.
    async fn recent(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError>;

    async fn get(&self, id: &str) -> Result<Option<SemanticEntry>, MemoryError>;

    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Delete entries whose end timestamp is before `cutoff`.
    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;
}

/// Split a query into distinct lower-cased terms, preserving first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.split_whitespace() {
        let term = term.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}
