//! Semantic memory — durable conversation summaries with keyword scoring.
//!
//! Entries are written by an external summarisation step and read back as
//! long-term context. Ranking is a plain term-overlap ratio against each
//! candidate's summary and topic words; recency breaks ties.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_core::error::MemoryError;
use parley_core::memory::{ScoredEntry, SemanticEntry, SemanticStore, query_terms};
use parley_core::message::ConversationId;
use tracing::debug;
use uuid::Uuid;

pub struct SemanticMemory {
    store: Arc<dyn SemanticStore>,
    default_limit: usize,
}

impl SemanticMemory {
    pub fn new(store: Arc<dyn SemanticStore>, default_limit: usize) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Persist a summary, assigning an id when it has none.
    pub async fn store(&self, mut entry: SemanticEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        self.store.insert(entry).await
    }

    /// Substring search over summary and topics, most recent first.
    pub async fn search(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        self.store.search(query, conversation_id, limit).await
    }

    /// Fetch `2 × limit` recent candidates and rank them by term overlap.
    ///
    /// The sort is stable, so candidates with equal scores keep their
    /// recency order.
    pub async fn search_with_scores(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<ScoredEntry>, MemoryError> {
        let candidates = self
            .store
            .search(query, conversation_id, limit.saturating_mul(2))
            .await?;
        let terms = query_terms(query);

        let mut scored: Vec<ScoredEntry> = candidates
            .into_iter()
            .map(|entry| {
                let score = keyword_score(&entry, &terms);
                ScoredEntry { entry, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        debug!(query, results = scored.len(), "Semantic search");
        Ok(scored)
    }

    pub async fn get_recent(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        self.store.recent(conversation_id, limit).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<SemanticEntry>, MemoryError> {
        self.store.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        self.store.delete(id).await
    }

    /// Delete entries whose conversation span ended more than
    /// `retention_days` ago. Returns how many were removed.
    pub async fn cleanup(&self, retention_days: u32) -> Result<u64, MemoryError> {
        self.cleanup_at(retention_days, Utc::now()).await
    }

    pub async fn cleanup_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, MemoryError> {
        let cutoff = Duration::try_days(i64::from(retention_days))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.delete_ended_before(cutoff).await?;
        if removed > 0 {
            debug!(removed, retention_days, "Cleaned up semantic memories");
        }
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await
    }

    /// Render scored summaries as a context block for the generator.
    pub fn format_for_context(results: &[ScoredEntry]) -> String {
        if results.is_empty() {
            return String::new();
        }
        let mut out = String::from("Relevant past conversations:\n");
        for scored in results {
            out.push_str("- ");
            out.push_str(&scored.entry.summary);
            if !scored.entry.topics.is_empty() {
                out.push_str(&format!(" (topics: {})", scored.entry.topics.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

/// Fraction of `terms` present in the entry's summary or topic word-sets.
///
/// `terms` are expected lower-cased and distinct (see [`query_terms`]).
/// No terms scores zero.
pub fn keyword_score(entry: &SemanticEntry, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }

    let mut words: HashSet<String> = split_words(&entry.summary).collect();
    for topic in &entry.topics {
        words.insert(topic.to_lowercase());
        words.extend(split_words(topic));
    }

    let present = terms
        .iter()
        .filter(|term| {
            words.contains(term.as_str())
                || words.contains(term.trim_matches(|c: char| !c.is_alphanumeric()))
        })
        .count();

    present as f32 / terms.len() as f32
}

fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;

    fn entry(text: &str, topics: &[&str], ended: DateTime<Utc>) -> SemanticEntry {
        SemanticEntry {
            id: String::new(),
            conversation_id: "general".into(),
            group_id: "guild".into(),
            summary: text.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            participant_ids: vec![],
            message_count: 4,
            start_timestamp: ended - Duration::minutes(3),
            end_timestamp: ended,
            created_at: ended,
        }
    }

    fn memory() -> SemanticMemory {
        SemanticMemory::new(Arc::new(InMemoryStore::new()), 5)
    }

    #[test]
    fn score_is_fraction_of_terms_present() {
        let e = entry("Fixed the router firmware", &["networking"], Utc::now());
        let terms = query_terms("router networking printer pizza");
        assert_eq!(keyword_score(&e, &terms), 0.5);
    }

    #[test]
    fn score_ignores_punctuation_on_terms() {
        let e = entry("The backup finished", &[], Utc::now());
        assert_eq!(keyword_score(&e, &query_terms("backup?")), 1.0);
    }

    #[test]
    fn score_matches_whole_topics() {
        let e = entry("Chat", &["Home Assistant"], Utc::now());
        assert_eq!(keyword_score(&e, &["home assistant".to_string()]), 1.0);
        assert_eq!(keyword_score(&e, &query_terms("assistant")), 1.0);
    }

    #[test]
    fn empty_query_scores_zero() {
        let e = entry("anything", &["at all"], Utc::now());
        assert_eq!(keyword_score(&e, &[]), 0.0);
    }

    #[tokio::test]
    async fn store_assigns_id() {
        let mem = memory();
        let id = mem.store(entry("hello", &[], Utc::now())).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(mem.get_by_id(&id).await.unwrap().unwrap().summary, "hello");
        assert_eq!(mem.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scored_search_ranks_by_overlap_then_recency() {
        let mem = memory();
        let now = Utc::now();
        mem.store(entry("router reboot", &[], now - Duration::hours(3))).await.unwrap();
        mem.store(entry("router firmware upgrade", &[], now - Duration::hours(2))).await.unwrap();
        mem.store(entry("firmware notes", &[], now - Duration::hours(1))).await.unwrap();

        let results = mem.search_with_scores("router firmware", None, 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.entry.summary.as_str()).collect();
        assert_eq!(texts, vec!["router firmware upgrade", "firmware notes", "router reboot"]);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.5);
    }

    #[tokio::test]
    async fn scored_search_is_deterministic() {
        let mem = memory();
        let now = Utc::now();
        for i in 0..6 {
            mem.store(entry(&format!("nas disk {i}"), &["storage"], now - Duration::minutes(i)))
                .await
                .unwrap();
        }
        let first = mem.search_with_scores("nas storage", None, 4).await.unwrap();
        let second = mem.search_with_scores("nas storage", None, 4).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn cleanup_removes_entries_past_retention() {
        let mem = memory();
        let now = Utc::now();
        mem.store(entry("stale", &[], now - Duration::days(31))).await.unwrap();
        mem.store(entry("fresh", &[], now - Duration::days(2))).await.unwrap();

        assert_eq!(mem.cleanup_at(30, now).await.unwrap(), 1);
        let left = mem.get_recent(None, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].summary, "fresh");
    }

    #[tokio::test]
    async fn huge_retention_keeps_everything() {
        let mem = memory();
        let now = Utc::now();
        mem.store(entry("ancient", &[], now - Duration::days(365 * 80))).await.unwrap();

        assert_eq!(mem.cleanup_at(u32::MAX, now).await.unwrap(), 0);
        assert_eq!(mem.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_id() {
        let mem = memory();
        let id = mem.store(entry("bye", &[], Utc::now())).await.unwrap();
        assert!(mem.delete(&id).await.unwrap());
        assert!(mem.get_by_id(&id).await.unwrap().is_none());
    }

    #[test]
    fn formats_context_block() {
        let scored = vec![
            ScoredEntry {
                entry: entry("Set up the VPN", &["network", "vpn"], Utc::now()),
                score: 1.0,
            },
            ScoredEntry {
                entry: entry("Movie night", &[], Utc::now()),
                score: 0.5,
            },
        ];
        assert_eq!(
            SemanticMemory::format_for_context(&scored),
            "Relevant past conversations:\n- Set up the VPN (topics: network, vpn)\n- Movie night\n"
        );
        assert!(SemanticMemory::format_for_context(&[]).is_empty());
    }
}
