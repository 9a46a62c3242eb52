//! The attention pipeline facade.
//!
//! Wires the router, response filter, memories, prefix registry and action
//! executor behind one object and publishes a [`DomainEvent`] for every
//! decision it makes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_actions::{ActionExecutor, QueryOutcome};
use parley_attention::{
    AttentionStatus, AttentionStore, Classification, Decision, MessageKind, MessageRouter,
    ResponseFilter,
};
use parley_commands::{CommandContext, CommandOutcome, CommandRegistry, builtin_registry, parse_prefix};
use parley_config::AppConfig;
use parley_core::capability::{
    ActionContext, CapabilityRegistry, ConversationModes, NoCapabilities, StaticConversationModes,
};
use parley_core::error::Error;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::memory::{ScoredEntry, SemanticStore, ShortTermEntry, ShortTermStore};
use parley_core::message::{ConversationId, InboundMessage};
use parley_memory::{InMemoryStore, SemanticMemory, ShortTermMemory, SqliteStore};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Context handed to the response generator once the pipeline decides to
/// answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBundle {
    /// Short-term turns within the token budget, oldest first
    pub recent: Vec<ShortTermEntry>,
    /// Relevant semantic summaries, best match first
    pub memories: Vec<ScoredEntry>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.memories.is_empty()
    }

    /// Render memories followed by recent turns as prompt text.
    pub fn render(&self) -> String {
        let mut out = SemanticMemory::format_for_context(&self.memories);
        if !out.is_empty() && !self.recent.is_empty() {
            out.push('\n');
        }
        out.push_str(&ShortTermMemory::format_context(&self.recent));
        out
    }
}

/// Result of [`AttentionPipeline::triage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Triage {
    pub classification: Classification,
    pub decision: Decision,
    /// Assembled only when responding to a non-prefix message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextBundle>,
}

/// Rows removed by [`AttentionPipeline::maintain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub short_term_pruned: u64,
    pub semantic_removed: u64,
}

/// The conversational attention and memory pipeline.
pub struct AttentionPipeline {
    config: AppConfig,

    router: MessageRouter,

    filter: ResponseFilter,

    /// Prefix command registry
    commands: CommandRegistry,

    short_term: ShortTermMemory,

    semantic: SemanticMemory,

    actions: ActionExecutor,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AttentionPipeline {
    /// Create a pipeline with in-process memory only, no capabilities, and
    /// the built-in command table.
    pub fn new(config: AppConfig) -> Self {
        let modes: Arc<dyn ConversationModes> = Arc::new(StaticConversationModes::default());
        let filter = ResponseFilter::new(
            config.filter.clone(),
            &config.assistant,
            Arc::new(AttentionStore::new()),
            modes,
        );

        Self {
            router: MessageRouter::new(config.router.clone(), config.prefix.clone()),
            filter,
            commands: builtin_registry(config.prefix.clone()),
            short_term: ShortTermMemory::new(&config.short_term),
            semantic: SemanticMemory::new(Arc::new(InMemoryStore::new()), config.semantic.search_limit),
            actions: ActionExecutor::new(Arc::new(NoCapabilities), &config.actions),
            event_bus: Arc::new(EventBus::default()),
            config,
        }
    }

    /// Create a pipeline backed by the SQLite database named in
    /// `config.semantic.database_path`, used for both memories.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let path = config.semantic.database_path.clone();
        let store = if path.starts_with("sqlite:") {
            SqliteStore::new(&path).await?
        } else {
            SqliteStore::open_file(Path::new(&path)).await?
        };
        let store = Arc::new(store);
        info!(database = %path, "Opened pipeline store");

        Ok(Self::new(config)
            .with_short_term_store(store.clone())
            .with_semantic_store(store))
    }

    /// Mirror short-term buffers to a durable store (when `short_term.persist` is set).
    pub fn with_short_term_store(mut self, store: Arc<dyn ShortTermStore>) -> Self {
        self.short_term = ShortTermMemory::with_store(&self.config.short_term, store);
        self
    }

    pub fn with_semantic_store(mut self, store: Arc<dyn SemanticStore>) -> Self {
        self.semantic = SemanticMemory::new(store, self.config.semantic.search_limit);
        self
    }

    /// Use a capability registry. Replaces the action executor, so call this
    /// before registering custom actions.
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityRegistry>) -> Self {
        self.actions = ActionExecutor::new(capabilities, &self.config.actions);
        self
    }

    /// Use a conversation-mode lookup. Attention state is kept.
    pub fn with_modes(mut self, modes: Arc<dyn ConversationModes>) -> Self {
        self.filter = ResponseFilter::new(
            self.config.filter.clone(),
            &self.config.assistant,
            self.filter.store().clone(),
            modes,
        );
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_actions(mut self, actions: ActionExecutor) -> Self {
        self.actions = actions;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn filter(&self) -> &ResponseFilter {
        &self.filter
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn semantic(&self) -> &SemanticMemory {
        &self.semantic
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    pub fn actions(&self) -> &ActionExecutor {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionExecutor {
        &mut self.actions
    }

    // ── Exposed operations ──

    pub fn classify(&self, message: &InboundMessage) -> Classification {
        let classification = self.router.classify(message);
        self.event_bus.publish(DomainEvent::MessageClassified {
            conversation_id: message.conversation_id.to_string(),
            kind: classification.kind.as_str().to_string(),
            priority: classification.priority,
            timestamp: Utc::now(),
        });
        classification
    }

    pub fn should_respond(&self, message: &InboundMessage, classification: &Classification) -> Decision {
        self.should_respond_at(message, classification, Utc::now())
    }

    pub fn should_respond_at(
        &self,
        message: &InboundMessage,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = self.filter.should_respond_at(message, classification, now);
        self.event_bus.publish(DomainEvent::ResponseDecided {
            conversation_id: message.conversation_id.to_string(),
            respond: decision.respond,
            reason: decision.reason.as_str().to_string(),
            confidence: decision.confidence,
            timestamp: now,
        });
        decision
    }

    /// Recent short-term entries within `budget` tokens, oldest first.
    pub async fn get_context(&self, conversation_id: &ConversationId, budget: usize) -> Vec<ShortTermEntry> {
        let entries = self.short_term.get_context(conversation_id, budget).await;
        self.publish_memory_access("context", entries.len());
        entries
    }

    /// Ranked semantic memories for `query`, limited to the configured
    /// search limit. A failing store yields no results.
    pub async fn search_memory(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Vec<ScoredEntry> {
        let results = match self
            .semantic
            .search_with_scores(query, conversation_id, self.semantic.default_limit())
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Semantic memory search failed: {e}");
                Vec::new()
            }
        };
        self.publish_memory_access("search", results.len());
        results
    }

    /// Parse and run a prefix command. `None` when `content` carries no
    /// prefix marker.
    pub async fn parse_and_execute_prefix(
        &self,
        content: &str,
        context: &CommandContext,
    ) -> Option<CommandOutcome> {
        let parsed = parse_prefix(content, self.commands.markers())?;
        let outcome = self.commands.execute(&parsed, context).await;
        self.event_bus.publish(DomainEvent::PrefixExecuted {
            command: parsed.command.clone(),
            success: outcome.is_ok(),
            timestamp: Utc::now(),
        });
        Some(outcome)
    }

    /// Detect and run an action for a natural-language query. `None` when no
    /// action matches.
    pub async fn process_action_query(&self, query: &str, context: &ActionContext) -> Option<QueryOutcome> {
        let outcome = self.actions.process_query(query, context).await?;
        if let QueryOutcome::Executed { detection, result } = &outcome {
            self.event_bus.publish(DomainEvent::ActionExecuted {
                action_id: detection.action_id.clone(),
                success: result.is_ok(),
                duration_ms: result.as_ref().map(|s| s.duration_ms).unwrap_or(0),
                timestamp: Utc::now(),
            });
        }
        Some(outcome)
    }

    // ── Observation ──

    /// Append an inbound message to short-term memory.
    pub async fn observe(&self, message: &InboundMessage, author_name: &str) {
        self.observe_at(message, author_name, Utc::now()).await;
    }

    pub async fn observe_at(&self, message: &InboundMessage, author_name: &str, at: DateTime<Utc>) {
        let mut entry = ShortTermEntry::new(&message.author_id, author_name, &message.content, at);
        entry.is_automated_author = message.is_automated_author;
        self.short_term.add_message(&message.conversation_id, entry).await;
    }

    /// Record that the assistant replied: refreshes the attention window and
    /// appends the reply to short-term memory.
    pub async fn record_assistant_reply(&self, conversation_id: &ConversationId, content: &str) {
        self.record_assistant_reply_at(conversation_id, content, Utc::now()).await;
    }

    pub async fn record_assistant_reply_at(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        at: DateTime<Utc>,
    ) {
        self.filter.record_assistant_reply_at(conversation_id, at);

        let assistant = &self.config.assistant;
        let mut entry = ShortTermEntry::new(&assistant.id, &assistant.name, content, at);
        entry.is_automated_author = true;
        self.short_term.add_message(conversation_id, entry).await;
    }

    /// Classify, decide, and assemble context when the answer is yes.
    ///
    /// Prefix commands are answered by their handlers, so they get no
    /// context bundle.
    pub async fn triage(&self, message: &InboundMessage) -> Triage {
        self.triage_at(message, Utc::now()).await
    }

    pub async fn triage_at(&self, message: &InboundMessage, now: DateTime<Utc>) -> Triage {
        let classification = self.classify(message);
        let decision = self.should_respond_at(message, &classification, now);

        let context = if decision.respond && classification.kind != MessageKind::Prefix {
            Some(self.build_context(message).await)
        } else {
            None
        };

        debug!(
            conversation_id = %message.conversation_id,
            kind = %classification.kind,
            respond = decision.respond,
            has_context = context.is_some(),
            "Triaged message"
        );

        Triage {
            classification,
            decision,
            context,
        }
    }

    pub fn attention_status(&self, conversation_id: &ConversationId) -> AttentionStatus {
        self.filter.attention_status(conversation_id, Utc::now())
    }

    // ── Housekeeping ──

    /// Forget a conversation's buffer and attention window, optionally
    /// deleting its durable short-term rows too.
    pub async fn clear_conversation(
        &self,
        conversation_id: &ConversationId,
        also_purge_durable: bool,
    ) -> Result<(), Error> {
        self.filter.clear_attention(conversation_id);
        self.short_term.clear(conversation_id, also_purge_durable).await?;
        Ok(())
    }

    /// Prune expired short-term mirror rows and semantic memories past the
    /// retention horizon.
    pub async fn maintain(&self) -> Result<MaintenanceReport, Error> {
        let report = MaintenanceReport {
            short_term_pruned: self.short_term.prune_durable().await?,
            semantic_removed: self.semantic.cleanup(self.config.semantic.retention_days).await?,
        };
        info!(
            short_term_pruned = report.short_term_pruned,
            semantic_removed = report.semantic_removed,
            "Memory maintenance complete"
        );
        Ok(report)
    }

    /// Wait for outstanding durable writes. Call before shutdown.
    pub async fn flush(&self) {
        self.short_term.flush().await;
    }

    async fn build_context(&self, message: &InboundMessage) -> ContextBundle {
        let recent = self
            .get_context(&message.conversation_id, self.config.short_term.context_budget)
            .await;
        let memories = self
            .search_memory(&message.content, Some(&message.conversation_id))
            .await;
        ContextBundle { recent, memories }
    }

    fn publish_memory_access(&self, operation: &str, count: usize) {
        self.event_bus.publish(DomainEvent::MemoryAccessed {
            operation: operation.to_string(),
            count,
            timestamp: Utc::now(),
        });
    }
}
