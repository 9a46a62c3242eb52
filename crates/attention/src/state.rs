//! Per-conversation attention state.
//!
//! Owned by one [`ResponseFilter`](crate::filter::ResponseFilter) instance
//! rather than a process-wide map, so several pipelines (or tests) never see
//! each other's windows.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use parley_core::message::ConversationId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttentionState {
    pub last_mention_at: Option<DateTime<Utc>>,
    pub last_assistant_reply_at: Option<DateTime<Utc>>,
}

impl AttentionState {
    /// The later of the last mention and the last assistant reply.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_mention_at.max(self.last_assistant_reply_at)
    }
}

#[derive(Debug, Default)]
pub struct AttentionStore {
    states: RwLock<HashMap<ConversationId, AttentionState>>,
}

impl AttentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<AttentionState> {
        self.states
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .copied()
    }

    pub fn record_mention(&self, conversation_id: &ConversationId, at: DateTime<Utc>) {
        self.update(conversation_id, |s| s.last_mention_at = Some(at));
    }

    pub fn record_assistant_reply(&self, conversation_id: &ConversationId, at: DateTime<Utc>) {
        self.update(conversation_id, |s| s.last_assistant_reply_at = Some(at));
    }

    /// Forget a conversation. Returns whether any state existed.
    pub fn clear(&self, conversation_id: &ConversationId) -> bool {
        self.states
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, conversation_id: &ConversationId, f: impl FnOnce(&mut AttentionState)) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        f(states.entry(conversation_id.clone()).or_default());
    }
}
