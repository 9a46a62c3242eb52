//! Response filter — the final respond / stay-quiet decision.
//!
//! Explicit signals (DMs, always-respond conversations, mentions, prefix
//! commands) always get an answer. Everything else is answered only while
//! the conversation's attention window is open, and then only when the
//! intent score clears `min_confidence`.
//!
//! The window opens on a mention and is pushed forward by every assistant
//! reply, which is what lets a short back-and-forth continue without
//! re-mentioning the assistant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_config::{AssistantConfig, FilterConfig};
use parley_core::capability::ConversationModes;
use parley_core::message::{ConversationId, InboundMessage};
use serde::Serialize;
use tracing::debug;

use crate::intent::{IntentContext, IntentScorer};
use crate::router::{Classification, MessageKind};
use crate::state::{AttentionState, AttentionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Ignored,
    Dm,
    AlwaysRespond,
    DirectMention,
    PrefixCommand,
    OutsideAttentionWindow,
    LowConfidence,
    InAttentionWindow,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Dm => "dm",
            Self::AlwaysRespond => "always_respond",
            Self::DirectMention => "direct_mention",
            Self::PrefixCommand => "prefix_command",
            Self::OutsideAttentionWindow => "outside_attention_window",
            Self::LowConfidence => "low_confidence",
            Self::InAttentionWindow => "in_attention_window",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub respond: bool,
    pub reason: DecisionReason,
    /// Intent confidence, when scoring ran (or 1.0 with smart filtering off)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Decision {
    fn respond(reason: DecisionReason) -> Self {
        Self {
            respond: true,
            reason,
            confidence: None,
        }
    }

    fn suppress(reason: DecisionReason) -> Self {
        Self {
            respond: false,
            reason,
            confidence: None,
        }
    }
}

/// Snapshot of a conversation's attention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttentionStatus {
    pub open: bool,
    /// Milliseconds until the window closes (0 when closed)
    pub remaining_ms: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct ResponseFilter {
    config: FilterConfig,
    store: Arc<AttentionStore>,
    modes: Arc<dyn ConversationModes>,
    scorer: IntentScorer,
}

impl ResponseFilter {
    pub fn new(
        config: FilterConfig,
        assistant: &AssistantConfig,
        store: Arc<AttentionStore>,
        modes: Arc<dyn ConversationModes>,
    ) -> Self {
        let mut self_references = assistant.names();
        if !assistant.id.is_empty() {
            self_references.push(assistant.id.clone());
        }
        Self {
            config,
            store,
            modes,
            scorer: IntentScorer::new(self_references),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AttentionStore> {
        &self.store
    }

    pub fn should_respond(&self, message: &InboundMessage, classification: &Classification) -> Decision {
        self.should_respond_at(message, classification, Utc::now())
    }

    /// Decide at an explicit instant. Records the mention as a side effect
    /// when the classification is `Mention`.
    pub fn should_respond_at(
        &self,
        message: &InboundMessage,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = self.decide(message, classification, now);
        debug!(
            conversation_id = %message.conversation_id,
            kind = %classification.kind,
            respond = decision.respond,
            reason = %decision.reason,
            confidence = ?decision.confidence,
            "Response decision"
        );
        decision
    }

    fn decide(
        &self,
        message: &InboundMessage,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Decision {
        let conversation_id = &message.conversation_id;

        // Bots are never answered. Other `Ignore` messages still reach the
        // attention window, which is what lets a follow-up skip the mention.
        if message.is_automated_author {
            return Decision::suppress(DecisionReason::Ignored);
        }

        if message.is_direct_conversation {
            return Decision::respond(DecisionReason::Dm);
        }

        if self.is_always_respond(conversation_id) {
            return Decision::respond(DecisionReason::AlwaysRespond);
        }

        match classification.kind {
            MessageKind::Mention => {
                self.store.record_mention(conversation_id, now);
                return Decision::respond(DecisionReason::DirectMention);
            }
            MessageKind::Prefix => return Decision::respond(DecisionReason::PrefixCommand),
            _ => {}
        }

        let state = self.store.get(conversation_id).unwrap_or_default();
        if !self.window_open(&state, now) {
            return Decision::suppress(DecisionReason::OutsideAttentionWindow);
        }

        if !self.config.smart_filtering {
            return Decision {
                confidence: Some(1.0),
                ..Decision::respond(DecisionReason::InAttentionWindow)
            };
        }

        let recent_assistant_reply = state
            .last_assistant_reply_at
            .is_some_and(|at| now - at < ms(self.config.recent_reply_ms));
        let score = self.scorer.score(
            &message.content,
            IntentContext {
                replies_to_assistant: message.replies_to_assistant,
                recent_assistant_reply,
                respond_to_replies: self.config.respond_to_replies,
            },
        );
        debug!(
            conversation_id = %conversation_id,
            raw = score.raw,
            confidence = score.confidence,
            signals = ?score.signals,
            "Scored intent"
        );

        let respond = score.confidence >= self.config.min_confidence;
        Decision {
            respond,
            reason: if respond {
                DecisionReason::InAttentionWindow
            } else {
                DecisionReason::LowConfidence
            },
            confidence: Some(score.confidence),
        }
    }

    pub fn record_mention(&self, conversation_id: &ConversationId, at: DateTime<Utc>) {
        self.store.record_mention(conversation_id, at);
    }

    pub fn record_assistant_reply(&self, conversation_id: &ConversationId) {
        self.record_assistant_reply_at(conversation_id, Utc::now());
    }

    pub fn record_assistant_reply_at(&self, conversation_id: &ConversationId, at: DateTime<Utc>) {
        self.store.record_assistant_reply(conversation_id, at);
    }

    pub fn clear_attention(&self, conversation_id: &ConversationId) -> bool {
        self.store.clear(conversation_id)
    }

    pub fn attention_status(&self, conversation_id: &ConversationId, now: DateTime<Utc>) -> AttentionStatus {
        let state = self.store.get(conversation_id).unwrap_or_default();
        let last_activity = state.last_activity();
        let remaining_ms = last_activity
            .map(|last| ms(self.config.attention_window_ms) - (now - last))
            .filter(|remaining| *remaining > Duration::zero())
            .map(|remaining| u64::try_from(remaining.num_milliseconds()).unwrap_or(0))
            .unwrap_or(0);
        AttentionStatus {
            open: self.window_open(&state, now),
            remaining_ms,
            last_activity,
        }
    }

    fn is_always_respond(&self, conversation_id: &ConversationId) -> bool {
        self.config
            .always_respond
            .iter()
            .any(|c| c == conversation_id.as_str())
            || self.modes.is_always_respond(conversation_id)
    }

    fn window_open(&self, state: &AttentionState, now: DateTime<Utc>) -> bool {
        state
            .last_activity()
            .is_some_and(|last| now - last < ms(self.config.attention_window_ms))
    }
}

fn ms(millis: u64) -> Duration {
    Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
}
