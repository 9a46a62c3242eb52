//! In-memory durable store — useful for testing and ephemeral sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::MemoryError;
use parley_core::memory::{
    SemanticEntry, SemanticStore, ShortTermEntry, ShortTermStore, query_terms,
};
use parley_core::message::ConversationId;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Stores short-term mirror rows and semantic summaries in `Vec`s.
///
/// Implements both durable-store traits so one instance can back a whole
/// pipeline in tests. Can be configured to fail initialisation or to delay
/// reads, which exercises the degraded-persistence and single-flight paths.
pub struct InMemoryStore {
    rows: Arc<RwLock<Vec<(ConversationId, ShortTermEntry)>>>,
    summaries: Arc<RwLock<Vec<SemanticEntry>>>,
    fail_init: bool,
    load_delay: Option<Duration>,
    init_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            summaries: Arc::new(RwLock::new(Vec::new())),
            fail_init: false,
            load_delay: None,
            init_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        }
    }

    /// A store whose `init` always fails.
    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::new()
        }
    }

    /// Sleep before answering `load_recent`.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Number of times `init` was called.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of times `load_recent` was called.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of mirrored rows for a conversation.
    pub async fn row_count(&self, conversation_id: &ConversationId) -> usize {
        self.rows
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == conversation_id)
            .count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShortTermStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn init(&self) -> Result<(), MemoryError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(MemoryError::Unavailable("in-memory store configured to fail".into()));
        }
        Ok(())
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        entry: &ShortTermEntry,
    ) -> Result<(), MemoryError> {
        self.rows
            .write()
            .await
            .push((conversation_id.clone(), entry.clone()));
        Ok(())
    }

    async fn load_recent(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShortTermEntry>, MemoryError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }

        let rows = self.rows.read().await;
        let mut matching: Vec<ShortTermEntry> = rows
            .iter()
            .filter(|(id, e)| id == conversation_id && e.timestamp > since)
            .map(|(_, e)| e.clone())
            .collect();

        matching.sort_by_key(|e| e.timestamp);
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.split_off(skip))
    }

    async fn purge(&self, conversation_id: &ConversationId) -> Result<u64, MemoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(id, _)| id != conversation_id);
        Ok((before - rows.len()) as u64)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(_, e)| e.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

fn matches_terms(entry: &SemanticEntry, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let summary = entry.summary.to_lowercase();
    let topics: Vec<String> = entry.topics.iter().map(|t| t.to_lowercase()).collect();
    terms
        .iter()
        .any(|term| summary.contains(term) || topics.iter().any(|t| t.contains(term)))
}

#[async_trait]
impl SemanticStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, mut entry: SemanticEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        let mut summaries = self.summaries.write().await;
        summaries.retain(|e| e.id != id);
        summaries.push(entry);
        Ok(id)
    }

    async fn search(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        let terms = query_terms(query);
        let summaries = self.summaries.read().await;

        let mut results: Vec<SemanticEntry> = summaries
            .iter()
            .filter(|e| conversation_id.is_none_or(|id| &e.conversation_id == id))
            .filter(|e| matches_terms(e, &terms))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.end_timestamp.cmp(&a.end_timestamp));
        results.truncate(limit);
        Ok(results)
    }

    async fn recent(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        self.search("", conversation_id, limit).await
    }

    async fn get(&self, id: &str) -> Result<Option<SemanticEntry>, MemoryError> {
        let summaries = self.summaries.read().await;
        Ok(summaries.iter().find(|e| e.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut summaries = self.summaries.write().await;
        let len_before = summaries.len();
        summaries.retain(|e| e.id != id);
        Ok(summaries.len() < len_before)
    }

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError> {
        let mut summaries = self.summaries.write().await;
        let before = summaries.len();
        summaries.retain(|e| e.end_timestamp >= cutoff);
        Ok((before - summaries.len()) as u64)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.summaries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn summary(conversation: &str, text: &str, topics: &[&str], ended: DateTime<Utc>) -> SemanticEntry {
        SemanticEntry {
            id: String::new(),
            conversation_id: conversation.into(),
            group_id: "guild".into(),
            summary: text.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            participant_ids: vec![],
            message_count: 3,
            start_timestamp: ended - ChronoDuration::minutes(5),
            end_timestamp: ended,
            created_at: ended,
        }
    }

    #[tokio::test]
    async fn load_recent_returns_newest_rows_in_order() {
        let store = InMemoryStore::new();
        let conv: ConversationId = "general".into();
        let base = Utc::now();
        // Appended out of order on purpose
        for offset in [3, 1, 2, 0] {
            let entry = ShortTermEntry::new(
                "u1",
                "alice",
                format!("msg {offset}"),
                base + ChronoDuration::seconds(offset),
            );
            store.append(&conv, &entry).await.unwrap();
        }

        let rows = store
            .load_recent(&conv, base - ChronoDuration::hours(1), 3)
            .await
            .unwrap();
        let contents: Vec<&str> = rows.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 1", "msg 2", "msg 3"]);
    }

    #[tokio::test]
    async fn load_recent_skips_rows_older_than_since() {
        let store = InMemoryStore::new();
        let conv: ConversationId = "general".into();
        let now = Utc::now();
        let old = ShortTermEntry::new("u1", "alice", "old", now - ChronoDuration::days(2));
        let fresh = ShortTermEntry::new("u1", "alice", "fresh", now);
        store.append(&conv, &old).await.unwrap();
        store.append(&conv, &fresh).await.unwrap();

        let rows = store
            .load_recent(&conv, now - ChronoDuration::days(1), 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "fresh");
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = InMemoryStore::failing();
        assert!(store.init().await.is_err());
        assert_eq!(store.init_calls(), 1);
    }

    #[tokio::test]
    async fn semantic_search_matches_any_term_newest_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert(summary("general", "Fixed the router firmware", &["network"], now - ChronoDuration::hours(2)))
            .await
            .unwrap();
        store
            .insert(summary("general", "Planned a movie night", &["social"], now))
            .await
            .unwrap();
        store
            .insert(summary("general", "Network printer jammed", &["hardware"], now - ChronoDuration::hours(1)))
            .await
            .unwrap();

        let results = store.search("NETWORK movie", None, 10).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Planned a movie night", "Network printer jammed", "Fixed the router firmware"]
        );
    }

    #[tokio::test]
    async fn semantic_search_filters_by_conversation() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.insert(summary("a", "router talk", &[], now)).await.unwrap();
        store.insert(summary("b", "router talk", &[], now)).await.unwrap();

        let conv: ConversationId = "b".into();
        let results = store.search("router", Some(&conv), 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].conversation_id, conv);
    }

    #[tokio::test]
    async fn insert_replaces_same_id() {
        let store = InMemoryStore::new();
        let mut first = summary("a", "Version 1", &[], Utc::now());
        first.id = "fixed".into();
        store.insert(first.clone()).await.unwrap();
        first.summary = "Version 2".into();
        store.insert(first).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("fixed").await.unwrap().unwrap().summary, "Version 2");
    }
}
