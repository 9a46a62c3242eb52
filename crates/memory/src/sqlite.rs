//! SQLite durable store.
//!
//! One database file holds both kinds of durable memory:
//! - `short_term_messages` — append-only mirror of short-term buffers, one
//!   row per observed message, ordered at read time by its own timestamp
//! - `semantic_memories` — conversation summaries, topics and participant
//!   ids stored as JSON text
//!
//! Keyword search is a case-insensitive `LIKE` over summary and topics.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::MemoryError;
use parley_core::memory::{
    SemanticEntry, SemanticStore, ShortTermEntry, ShortTermStore, query_terms,
};
use parley_core::message::ConversationId;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database. In-memory databases
    /// are per-connection, so they get a single-connection pool.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Open a file-backed store, creating parent directories as needed.
    pub async fn open_file(path: &std::path::Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MemoryError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    /// Wrap an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS short_term_messages (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id     TEXT NOT NULL,
                author_id           TEXT NOT NULL,
                author_name         TEXT NOT NULL,
                content             TEXT NOT NULL,
                timestamp_ms        INTEGER NOT NULL,
                is_automated_author INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("short_term_messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_short_term_conv_ts \
             ON short_term_messages(conversation_id, timestamp_ms)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("short_term index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_memories (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                group_id        TEXT NOT NULL DEFAULT '',
                summary         TEXT NOT NULL,
                topics          TEXT NOT NULL DEFAULT '[]',
                participant_ids TEXT NOT NULL DEFAULT '[]',
                message_count   INTEGER NOT NULL DEFAULT 0,
                start_ms        INTEGER NOT NULL,
                end_ms          INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("semantic_memories table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_semantic_conv_end \
             ON semantic_memories(conversation_id, end_ms DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("semantic index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_short_term(row: &sqlx::sqlite::SqliteRow) -> Result<ShortTermEntry, MemoryError> {
        let author_id: String = row
            .try_get("author_id")
            .map_err(|e| MemoryError::QueryFailed(format!("author_id column: {e}")))?;
        let author_name: String = row
            .try_get("author_name")
            .map_err(|e| MemoryError::QueryFailed(format!("author_name column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let timestamp_ms: i64 = row
            .try_get("timestamp_ms")
            .map_err(|e| MemoryError::QueryFailed(format!("timestamp_ms column: {e}")))?;
        let is_automated_author: bool = row.try_get("is_automated_author").unwrap_or(false);

        let mut entry = ShortTermEntry::new(author_id, author_name, content, from_millis(timestamp_ms)?);
        entry.is_automated_author = is_automated_author;
        Ok(entry)
    }

    fn row_to_semantic(row: &sqlx::sqlite::SqliteRow) -> Result<SemanticEntry, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let conversation_id: String = row
            .try_get("conversation_id")
            .map_err(|e| MemoryError::QueryFailed(format!("conversation_id column: {e}")))?;
        let group_id: String = row
            .try_get("group_id")
            .map_err(|e| MemoryError::QueryFailed(format!("group_id column: {e}")))?;
        let summary: String = row
            .try_get("summary")
            .map_err(|e| MemoryError::QueryFailed(format!("summary column: {e}")))?;
        let topics_json: String = row
            .try_get("topics")
            .map_err(|e| MemoryError::QueryFailed(format!("topics column: {e}")))?;
        let participants_json: String = row
            .try_get("participant_ids")
            .map_err(|e| MemoryError::QueryFailed(format!("participant_ids column: {e}")))?;
        let message_count: i64 = row
            .try_get("message_count")
            .map_err(|e| MemoryError::QueryFailed(format!("message_count column: {e}")))?;
        let start_ms: i64 = row
            .try_get("start_ms")
            .map_err(|e| MemoryError::QueryFailed(format!("start_ms column: {e}")))?;
        let end_ms: i64 = row
            .try_get("end_ms")
            .map_err(|e| MemoryError::QueryFailed(format!("end_ms column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let topics: Vec<String> = serde_json::from_str(&topics_json).unwrap_or_default();
        let participant_ids: Vec<String> =
            serde_json::from_str(&participants_json).unwrap_or_default();

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(SemanticEntry {
            id,
            conversation_id: ConversationId::from(conversation_id),
            group_id,
            summary,
            topics,
            participant_ids,
            message_count: u32::try_from(message_count).unwrap_or(0),
            start_timestamp: from_millis(start_ms)?,
            end_timestamp: from_millis(end_ms)?,
            created_at,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| MemoryError::QueryFailed(format!("timestamp out of range: {ms}")))
}

/// Escape a term for use inside a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl ShortTermStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn init(&self) -> Result<(), MemoryError> {
        self.run_migrations().await
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        entry: &ShortTermEntry,
    ) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO short_term_messages
                (conversation_id, author_id, author_name, content, timestamp_ms, is_automated_author)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(&entry.author_id)
        .bind(&entry.author_name)
        .bind(&entry.content)
        .bind(entry.timestamp.timestamp_millis())
        .bind(entry.is_automated_author)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;
        Ok(())
    }

    async fn load_recent(
        &self,
        conversation_id: &ConversationId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShortTermEntry>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT author_id, author_name, content, timestamp_ms, is_automated_author
            FROM short_term_messages
            WHERE conversation_id = ?1 AND timestamp_ms > ?2
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(since.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Load recent: {e}")))?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_short_term)
            .collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    async fn purge(&self, conversation_id: &ConversationId) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM short_term_messages WHERE conversation_id = ?1")
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Purge failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM short_term_messages WHERE timestamp_ms < ?1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Prune failed: {e}")))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SemanticStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, mut entry: SemanticEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let topics_json = serde_json::to_string(&entry.topics)
            .map_err(|e| MemoryError::Storage(format!("Topics serialization: {e}")))?;
        let participants_json = serde_json::to_string(&entry.participant_ids)
            .map_err(|e| MemoryError::Storage(format!("Participants serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO semantic_memories
                (id, conversation_id, group_id, summary, topics, participant_ids,
                 message_count, start_ms, end_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                group_id = excluded.group_id,
                summary = excluded.summary,
                topics = excluded.topics,
                participant_ids = excluded.participant_ids,
                message_count = excluded.message_count,
                start_ms = excluded.start_ms,
                end_ms = excluded.end_ms
            "#,
        )
        .bind(&entry.id)
        .bind(entry.conversation_id.as_str())
        .bind(&entry.group_id)
        .bind(&entry.summary)
        .bind(&topics_json)
        .bind(&participants_json)
        .bind(i64::from(entry.message_count))
        .bind(entry.start_timestamp.timestamp_millis())
        .bind(entry.end_timestamp.timestamp_millis())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %entry.id, "Stored semantic memory");
        Ok(entry.id)
    }

    async fn search(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return self.recent(conversation_id, limit).await;
        }

        // ?1 = conversation filter, ?2.. = one LIKE pattern per term, last = limit
        let conditions: Vec<String> = (0..terms.len())
            .map(|i| {
                let p = i + 2;
                format!(
                    "lower(summary) LIKE ?{p} ESCAPE '\\' OR lower(topics) LIKE ?{p} ESCAPE '\\'"
                )
            })
            .collect();
        let limit_param = terms.len() + 2;
        let sql = format!(
            r#"
            SELECT * FROM semantic_memories
            WHERE (conversation_id = ?1 OR ?1 IS NULL)
              AND ({})
            ORDER BY end_ms DESC
            LIMIT ?{limit_param}
            "#,
            conditions.join(" OR ")
        );

        let mut q = sqlx::query(&sql).bind(conversation_id.map(|c| c.as_str()));
        for term in &terms {
            q = q.bind(like_pattern(term));
        }
        let rows = q
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Keyword search: {e}")))?;

        rows.iter().map(Self::row_to_semantic).collect()
    }

    async fn recent(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<SemanticEntry>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM semantic_memories
            WHERE (conversation_id = ?1 OR ?1 IS NULL)
            ORDER BY end_ms DESC
            LIMIT ?2
            "#,
        )
        .bind(conversation_id.map(|c| c.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Recent: {e}")))?;

        rows.iter().map(Self::row_to_semantic).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<SemanticEntry>, MemoryError> {
        let row = sqlx::query("SELECT * FROM semantic_memories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Get by id: {e}")))?;

        row.as_ref().map(Self::row_to_semantic).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM semantic_memories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_ended_before(&self, cutoff: DateTime<Utc>) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM semantic_memories WHERE end_ms < ?1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Cleanup failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM semantic_memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Count: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("Count column: {e}")))?;
        Ok(count as usize)
    }
}
