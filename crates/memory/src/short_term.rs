//! Short-term memory — the rolling per-conversation message buffer.
//!
//! Every observed message (including the assistant's own replies) is
//! appended to its conversation's buffer, which is trimmed on insertion so
//! that both the token bound and the entry-count bound always hold.
//!
//! Buffers are mirrored fire-and-forget to an optional durable store and
//! lazily rebuilt from it the first time a conversation is touched in this
//! process. Hydration is single-flight per conversation: concurrent first
//! touches await one in-flight read instead of issuing their own.
//!
//! If the durable store fails to initialise, persistence is disabled for the
//! rest of the process and the in-memory buffer carries on alone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_config::ShortTermConfig;
use parley_core::error::MemoryError;
use parley_core::memory::{ShortTermEntry, ShortTermStore};
use parley_core::message::ConversationId;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::token::estimate_tokens;

/// Aggregate counters across all buffered conversations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShortTermStats {
    pub conversations: usize,
    pub entries: usize,
    pub tokens: usize,
}

pub struct ShortTermMemory {
    max_tokens: usize,
    max_messages: usize,
    persist_max_age: Duration,

    buffers: RwLock<HashMap<ConversationId, VecDeque<ShortTermEntry>>>,

    /// Per-conversation hydration: uninitialised = not loaded, initialising =
    /// loading, initialised = loaded.
    hydration: Mutex<HashMap<ConversationId, Arc<OnceCell<()>>>>,

    store: Option<Arc<dyn ShortTermStore>>,

    /// Resolved once: whether the durable store initialised successfully.
    persistence: OnceCell<bool>,

    /// Outstanding mirror writes.
    pending: Mutex<JoinSet<()>>,
}

impl ShortTermMemory {
    /// Create a purely in-memory buffer (no durable mirror).
    pub fn new(config: &ShortTermConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            max_messages: config.max_messages,
            persist_max_age: Duration::milliseconds(
                i64::try_from(config.persist_max_age_ms).unwrap_or(i64::MAX),
            ),
            buffers: RwLock::new(HashMap::new()),
            hydration: Mutex::new(HashMap::new()),
            store: None,
            persistence: OnceCell::new(),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Create a buffer mirrored to `store` (ignored when `config.persist` is off).
    pub fn with_store(config: &ShortTermConfig, store: Arc<dyn ShortTermStore>) -> Self {
        let mut memory = Self::new(config);
        if config.persist {
            memory.store = Some(store);
        }
        memory
    }

    /// Whether the durable mirror is (or would be) active.
    pub async fn persistence_enabled(&self) -> bool {
        self.durable().await.is_some()
    }

    /// Append an observed message and trim the buffer to its bounds.
    pub async fn add_message(&self, conversation_id: &ConversationId, mut entry: ShortTermEntry) {
        self.ensure_hydrated(conversation_id).await;

        entry.estimated_tokens = estimate_tokens(&entry.content);
        {
            let mut buffers = self.buffers.write().await;
            let buffer = buffers.entry(conversation_id.clone()).or_default();
            insert_chronological(buffer, entry.clone());
            let dropped = self.enforce_bounds(buffer);
            if dropped > 0 {
                debug!(conversation_id = %conversation_id, dropped, "Trimmed short-term buffer");
            }
        }

        self.mirror(conversation_id, entry).await;
    }

    /// Select the most recent entries fitting within `budget` tokens,
    /// returned oldest first.
    pub async fn get_context(
        &self,
        conversation_id: &ConversationId,
        budget: usize,
    ) -> Vec<ShortTermEntry> {
        self.ensure_hydrated(conversation_id).await;

        let buffers = self.buffers.read().await;
        let Some(buffer) = buffers.get(conversation_id) else {
            return Vec::new();
        };

        let mut used = 0usize;
        let mut selected = Vec::new();
        for entry in buffer.iter().rev() {
            if used + entry.estimated_tokens > budget {
                break;
            }
            used += entry.estimated_tokens;
            selected.push(entry.clone());
        }
        selected.reverse();
        selected
    }

    /// The full buffer for a conversation, oldest first.
    pub async fn entries(&self, conversation_id: &ConversationId) -> Vec<ShortTermEntry> {
        self.ensure_hydrated(conversation_id).await;
        self.buffers
            .read()
            .await
            .get(conversation_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reset a conversation's buffer and hydration state, optionally deleting
    /// its durable rows as well.
    pub async fn clear(
        &self,
        conversation_id: &ConversationId,
        also_purge_durable: bool,
    ) -> Result<(), MemoryError> {
        // A hydration still in flight would refill the buffer after it is
        // dropped; let it land first.
        let in_flight = self.hydration.lock().await.get(conversation_id).cloned();
        if let Some(cell) = in_flight {
            cell.get_or_init(|| async {}).await;
        }
        {
            let mut hydration = self.hydration.lock().await;
            self.buffers.write().await.remove(conversation_id);
            hydration.remove(conversation_id);
        }

        if also_purge_durable {
            if let Some(store) = self.durable().await {
                // Let in-flight writes land before deleting, or they would
                // resurrect rows after the purge.
                self.flush().await;
                let removed = store.purge(conversation_id).await?;
                info!(conversation_id = %conversation_id, removed, "Purged durable short-term rows");
            }
        }
        Ok(())
    }

    /// Delete durable rows older than the hydration horizon.
    pub async fn prune_durable(&self) -> Result<u64, MemoryError> {
        let Some(store) = self.durable().await else {
            return Ok(0);
        };
        let removed = store.prune_older_than(self.horizon(Utc::now())).await?;
        debug!(removed, "Pruned expired short-term rows");
        Ok(removed)
    }

    /// Wait for all outstanding mirror writes to finish.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending.lock().await);
        while pending.join_next().await.is_some() {}
    }

    pub async fn stats(&self) -> ShortTermStats {
        let buffers = self.buffers.read().await;
        buffers.values().fold(
            ShortTermStats {
                conversations: buffers.len(),
                ..ShortTermStats::default()
            },
            |mut stats, buffer| {
                stats.entries += buffer.len();
                stats.tokens += buffer.iter().map(|e| e.estimated_tokens).sum::<usize>();
                stats
            },
        )
    }

    /// Render entries as `[author]: content` lines for a generator prompt.
    pub fn format_context(entries: &[ShortTermEntry]) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&format!("[{}]: {}\n", entry.author_name, entry.content));
        }
        out
    }

    // ── Internals ──

    /// Oldest timestamp still eligible for hydration.
    fn horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.persist_max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Drop oldest entries until both bounds hold. Returns how many went.
    fn enforce_bounds(&self, buffer: &mut VecDeque<ShortTermEntry>) -> usize {
        let before = buffer.len();

        let mut total: usize = buffer.iter().map(|e| e.estimated_tokens).sum();
        while total > self.max_tokens {
            match buffer.pop_front() {
                Some(oldest) => total -= oldest.estimated_tokens,
                None => break,
            }
        }

        while buffer.len() > self.max_messages {
            buffer.pop_front();
        }

        before - buffer.len()
    }

    /// The durable store, if configured and successfully initialised.
    async fn durable(&self) -> Option<&Arc<dyn ShortTermStore>> {
        let store = self.store.as_ref()?;
        let enabled = *self
            .persistence
            .get_or_init(|| async {
                match store.init().await {
                    Ok(()) => {
                        info!(store = store.name(), "Short-term persistence enabled");
                        true
                    }
                    Err(e) => {
                        warn!(
                            store = store.name(),
                            error = %e,
                            "Short-term store failed to initialise; persistence disabled for this process"
                        );
                        false
                    }
                }
            })
            .await;
        enabled.then_some(store)
    }

    async fn ensure_hydrated(&self, conversation_id: &ConversationId) {
        let Some(store) = self.durable().await else {
            return;
        };

        let cell = {
            let mut hydration = self.hydration.lock().await;
            Arc::clone(hydration.entry(conversation_id.clone()).or_default())
        };

        cell.get_or_init(|| self.hydrate(conversation_id, Arc::clone(store)))
            .await;
    }

    async fn hydrate(&self, conversation_id: &ConversationId, store: Arc<dyn ShortTermStore>) {
        let since = self.horizon(Utc::now());
        let mut rows = match store
            .load_recent(conversation_id, since, self.max_messages)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                // Marked loaded anyway; retrying on every touch would hammer
                // a store that is already misbehaving.
                warn!(conversation_id = %conversation_id, error = %e, "Short-term hydration failed");
                return;
            }
        };

        for row in &mut rows {
            row.estimated_tokens = estimate_tokens(&row.content);
        }
        rows.sort_by_key(|e| e.timestamp);

        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(conversation_id.clone()).or_default();

        // Stores may round timestamps to the millisecond, so identity is
        // compared at that precision.
        let mut seen: HashSet<(i64, String, String)> = buffer.iter().map(identity).collect();
        let mut restored = 0;
        for row in rows {
            if seen.insert(identity(&row)) {
                insert_chronological(buffer, row);
                restored += 1;
            }
        }
        self.enforce_bounds(buffer);
        debug!(
            conversation_id = %conversation_id,
            restored,
            kept = buffer.len(),
            "Hydrated short-term buffer"
        );
    }

    async fn mirror(&self, conversation_id: &ConversationId, entry: ShortTermEntry) {
        let Some(store) = self.durable().await else {
            return;
        };
        let store = Arc::clone(store);
        let conversation_id = conversation_id.clone();

        let mut pending = self.pending.lock().await;
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            if let Err(e) = store.append(&conversation_id, &entry).await {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Short-term mirror write failed; in-memory buffer remains authoritative"
                );
            }
        });
    }
}

fn identity(entry: &ShortTermEntry) -> (i64, String, String) {
    (
        entry.timestamp.timestamp_millis(),
        entry.author_id.clone(),
        entry.content.clone(),
    )
}

/// Insert keeping the buffer ordered by timestamp (ties keep arrival order).
fn insert_chronological(buffer: &mut VecDeque<ShortTermEntry>, entry: ShortTermEntry) {
    let at = buffer.partition_point(|e| e.timestamp <= entry.timestamp);
    buffer.insert(at, entry);
}
