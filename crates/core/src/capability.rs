//! Capability traits — the narrow seams to the rest of the assistant.
//!
//! Capabilities are named external operations (home automation, network
//! scans, integrations). The action executor asks the registry whether a
//! capability is available before invoking it, and the response filter asks
//! the conversation-mode lookup whether a conversation opted into always
//! receiving replies.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::message::ConversationId;

/// Context handed to actions and capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    /// The natural-language query that triggered the action
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    /// Free-form parameters extracted by the caller
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ActionContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// The external capability registry.
///
/// Implementations may be arbitrarily slow or fail; callers wrap invocations
/// with their own timeout policy.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Whether the named capability is currently usable.
    async fn is_available(&self, name: &str) -> bool;

    /// Invoke the named capability.
    async fn invoke(
        &self,
        name: &str,
        context: &ActionContext,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// Lookup for conversations that should always receive a response.
pub trait ConversationModes: Send + Sync {
    fn is_always_respond(&self, conversation_id: &ConversationId) -> bool;
}

/// A fixed set of always-respond conversations, typically loaded from config.
#[derive(Debug, Clone, Default)]
pub struct StaticConversationModes {
    always_respond: HashSet<ConversationId>,
}

impl StaticConversationModes {
    pub fn new<I, S>(conversations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ConversationId>,
    {
        Self {
            always_respond: conversations.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConversationModes for StaticConversationModes {
    fn is_always_respond(&self, conversation_id: &ConversationId) -> bool {
        self.always_respond.contains(conversation_id)
    }
}

/// A registry with no capabilities; every lookup reports unavailable.
pub struct NoCapabilities;

#[async_trait]
impl CapabilityRegistry for NoCapabilities {
    async fn is_available(&self, _name: &str) -> bool {
        false
    }

    async fn invoke(
        &self,
        name: &str,
        _context: &ActionContext,
    ) -> Result<serde_json::Value, CapabilityError> {
        Err(CapabilityError::NotAvailable(name.to_string()))
    }
}
