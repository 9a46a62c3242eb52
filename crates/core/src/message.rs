//! Inbound message and conversation identity types.
//!
//! These are the value objects handed to the pipeline by the outer delivery
//! transport: Transport receives a chat message → Router classifies it →
//! Filter decides → Memory supplies context.

use serde::{Deserialize, Serialize};

/// Identifier of a conversation (channel, thread, or DM) the pipeline tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single chat message as delivered to the pipeline.
///
/// Immutable per invocation; the pipeline never owns or persists it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The text content
    pub content: String,

    /// Platform-specific author identifier
    pub author_id: String,

    /// Whether the author is a bot, webhook, or other automated sender
    #[serde(default)]
    pub is_automated_author: bool,

    /// The conversation this message belongs to
    pub conversation_id: ConversationId,

    /// Whether this is a one-to-one conversation with the assistant
    #[serde(default)]
    pub is_direct_conversation: bool,

    /// Whether the platform flagged an explicit mention of the assistant
    #[serde(default)]
    pub mentions_assistant: bool,

    /// Whether the message is a reply to one of the assistant's messages
    #[serde(default)]
    pub replies_to_assistant: bool,
}

impl InboundMessage {
    /// Create a plain message in a shared conversation.
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            author_id: author_id.into(),
            is_automated_author: false,
            conversation_id: conversation_id.into(),
            is_direct_conversation: false,
            mentions_assistant: false,
            replies_to_assistant: false,
        }
    }

    /// Mark the message as coming from a direct conversation.
    pub fn direct(mut self) -> Self {
        self.is_direct_conversation = true;
        self
    }

    /// Mark the message as explicitly mentioning the assistant.
    pub fn mentioning(mut self) -> Self {
        self.mentions_assistant = true;
        self
    }

    /// Mark the message as a reply to the assistant.
    pub fn replying(mut self) -> Self {
        self.replies_to_assistant = true;
        self
    }

    /// Mark the author as automated.
    pub fn automated(mut self) -> Self {
        self.is_automated_author = true;
        self
    }
}
