//! Message router — assigns every inbound message exactly one kind.
//!
//! Decision order (first match wins):
//!
//! ```text
//! automated author          → Ignore   (0)
//! prefix marker + command   → Prefix   (90)
//! explicit mention          → Mention  (80)
//! passive trigger(s) hit    → Passive  (30)
//! direct conversation, or
//!   mentions not required   → Natural  (50)
//! otherwise                 → Ignore   (0)
//! ```
//!
//! Classification is pure and total: no side effects, and every message gets
//! a kind.

use std::sync::LazyLock;

use parley_commands::{ParsedPrefix, parse_prefix};
use parley_config::{PrefixConfig, RouterConfig};
use parley_core::message::InboundMessage;
use regex_lite::Regex;
use serde::Serialize;
use tracing::debug;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n.*?```").expect("code block regex must compile"));

static ERROR_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(error|exception|traceback|stack ?trace|panicked|segfault|segmentation fault|fatal|errno|core dumped|enoent|econnrefused)\b",
    )
    .expect("error vocabulary regex must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ignore,
    Passive,
    Natural,
    Mention,
    Prefix,
}

impl MessageKind {
    /// Fixed priority; strictly increasing Ignore < Passive < Natural <
    /// Mention < Prefix.
    pub fn priority(self) -> u8 {
        match self {
            Self::Ignore => 0,
            Self::Passive => 30,
            Self::Natural => 50,
            Self::Mention => 80,
            Self::Prefix => 90,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Passive => "passive",
            Self::Natural => "natural",
            Self::Mention => "mention",
            Self::Prefix => "prefix",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content features that make an unaddressed message worth a look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassiveTrigger {
    /// An enclosed multi-line fenced code block
    CodeBlock,
    /// Error / exception / traceback vocabulary
    ErrorMessage,
    /// Content longer than the configured threshold
    LongMessage,
}

impl PassiveTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeBlock => "code_block",
            Self::ErrorMessage => "error_message",
            Self::LongMessage => "long_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub kind: MessageKind,
    pub priority: u8,
    /// Set for `Prefix` only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<ParsedPrefix>,
    /// Every trigger that matched, for `Passive` only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_triggers: Vec<PassiveTrigger>,
}

impl Classification {
    fn of(kind: MessageKind) -> Self {
        Self {
            kind,
            priority: kind.priority(),
            prefix: None,
            matched_triggers: Vec::new(),
        }
    }

    pub fn ignore() -> Self {
        Self::of(MessageKind::Ignore)
    }
}

pub struct MessageRouter {
    router: RouterConfig,
    prefix: PrefixConfig,
}

impl MessageRouter {
    pub fn new(router: RouterConfig, prefix: PrefixConfig) -> Self {
        Self { router, prefix }
    }

    pub fn prefix_config(&self) -> &PrefixConfig {
        &self.prefix
    }

    pub fn classify(&self, message: &InboundMessage) -> Classification {
        let classification = classify(message, &self.router, &self.prefix);
        debug!(
            conversation_id = %message.conversation_id,
            kind = %classification.kind,
            priority = classification.priority,
            "Classified message"
        );
        classification
    }
}

/// Classify one message.
pub fn classify(
    message: &InboundMessage,
    router: &RouterConfig,
    prefix: &PrefixConfig,
) -> Classification {
    if message.is_automated_author {
        return Classification::ignore();
    }

    if let Some(parsed) = parse_prefix(&message.content, prefix) {
        return Classification {
            prefix: Some(parsed),
            ..Classification::of(MessageKind::Prefix)
        };
    }

    if message.mentions_assistant {
        return Classification::of(MessageKind::Mention);
    }

    if router.passive_triggers {
        let matched_triggers = passive_triggers(&message.content, router.long_message_threshold);
        if !matched_triggers.is_empty() {
            return Classification {
                matched_triggers,
                ..Classification::of(MessageKind::Passive)
            };
        }
    }

    if message.is_direct_conversation || !router.require_mention {
        return Classification::of(MessageKind::Natural);
    }

    Classification::ignore()
}

/// All passive triggers the content matches, in a fixed order.
pub fn passive_triggers(content: &str, long_message_threshold: usize) -> Vec<PassiveTrigger> {
    let mut matched = Vec::new();
    if CODE_BLOCK.is_match(content) {
        matched.push(PassiveTrigger::CodeBlock);
    }
    if ERROR_VOCABULARY.is_match(content) {
        matched.push(PassiveTrigger::ErrorMessage);
    }
    if content.chars().count() > long_message_threshold {
        matched.push(PassiveTrigger::LongMessage);
    }
    matched
}
