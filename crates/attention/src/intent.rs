//! Intent scoring: how likely is an unaddressed message meant for the
//! assistant?
//!
//! Signals add or subtract raw points, and the total is normalised with
//! `clamp01((raw + 2) / 10)`. The weights are a tuned heuristic; the
//! invariants are that the output stays in [0, 1] and that more
//! assistant-directed signals never lower it.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

/// Requests, question openers, and references back to the assistant.
static DIRECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(can you|could you|would you|will you|please|tell me|show me|help me|explain|remind me|what (is|are|was|were|about)|how (do|does|can|about|to)|why (is|are|does|did)|you said|you mentioned|like you said|earlier)\b|\?\s*$",
    )
    .expect("directed regex must compile")
});

/// Affirmations and acknowledgements that continue an exchange.
static AFFIRMATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(yes|yeah|yep|yup|no|nope|ok|okay|sure|thanks|thank you|thx|ty|got it|perfect|great|cool)\b")
        .expect("affirmation regex must compile")
});

/// Casual slang and meme vocabulary typical of peer chatter.
static SLANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(lol|lmao|lmfao|rofl|bruh|bro|ngl|tbh|imo|fr|kek|pog|poggers|based|cringe|sus|xd|omg)\b")
        .expect("slang regex must compile")
});

/// A whole message that is just a reaction.
static REACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(ha(ha)+|he(he)+|same|mood|rip|oof|gg|true|real|facts|this|\+1|f)[\s!.]*$")
        .expect("reaction regex must compile")
});

/// Platform mentions (`<@123>`, `<@!123>`) and plain `@name` mentions.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<@!?(\d+)>|(?:^|\W)@(\w+)").expect("mention regex must compile")
});

static CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(so|well|anyway|btw)\b").expect("continuation regex must compile")
});

/// Point values for each signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntentWeights {
    pub reply_to_assistant: f32,
    pub directed: f32,
    pub peer_chat: f32,
    pub question_mark: f32,
    pub short_after_reply: f32,
    pub continuation: f32,
}

impl Default for IntentWeights {
    fn default() -> Self {
        Self {
            reply_to_assistant: 5.0,
            directed: 2.0,
            peer_chat: -2.0,
            question_mark: 1.5,
            short_after_reply: 1.0,
            continuation: 1.0,
        }
    }
}

/// Messages shorter than this many characters count as "short".
const SHORT_MESSAGE_CHARS: usize = 50;

/// What the scorer knows about a message beyond its text.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentContext {
    pub replies_to_assistant: bool,
    /// The assistant spoke in this conversation very recently
    pub recent_assistant_reply: bool,
    pub respond_to_replies: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentScore {
    pub raw: f32,
    pub confidence: f32,
    /// Names of the signals that fired
    pub signals: Vec<&'static str>,
}

pub struct IntentScorer {
    weights: IntentWeights,
    /// Lower-cased ids and names the assistant answers to
    self_references: Vec<String>,
}

impl IntentScorer {
    pub fn new(self_references: Vec<String>) -> Self {
        Self::with_weights(self_references, IntentWeights::default())
    }

    pub fn with_weights(self_references: Vec<String>, weights: IntentWeights) -> Self {
        Self {
            weights,
            self_references: self_references
                .into_iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn score(&self, content: &str, ctx: IntentContext) -> IntentScore {
        let w = &self.weights;
        let mut raw = 0.0f32;
        let mut signals = Vec::new();

        if ctx.respond_to_replies && ctx.replies_to_assistant {
            raw += w.reply_to_assistant;
            signals.push("reply_to_assistant");
        }

        if self.is_directed(content) {
            raw += w.directed;
            signals.push("directed");
        }

        if self.is_peer_chat(content) {
            raw += w.peer_chat;
            signals.push("peer_chat");
        }

        if content.contains('?') {
            raw += w.question_mark;
            signals.push("question_mark");
        }

        if content.chars().count() < SHORT_MESSAGE_CHARS && ctx.recent_assistant_reply {
            raw += w.short_after_reply;
            signals.push("short_after_reply");
        }

        if CONTINUATION.is_match(content) {
            raw += w.continuation;
            signals.push("continuation");
        }

        IntentScore {
            raw,
            confidence: normalize(raw),
            signals,
        }
    }

    fn is_directed(&self, content: &str) -> bool {
        DIRECTED.is_match(content) || AFFIRMATION.is_match(content) || self.addresses_assistant(content)
    }

    /// Opens with one of the assistant's names ("maid, ...").
    fn addresses_assistant(&self, content: &str) -> bool {
        let first = content
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .map(str::to_lowercase);
        first.is_some_and(|w| self.self_references.contains(&w))
    }

    /// Slang and reactions always count. Mentions count only when they point
    /// at someone else and the assistant is not mentioned at all.
    fn is_peer_chat(&self, content: &str) -> bool {
        if SLANG.is_match(content) || REACTION.is_match(content) {
            return true;
        }

        let mut mentions_other = false;
        for caps in MENTION.captures_iter(content) {
            let Some(target) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            if self.self_references.contains(&target.as_str().to_lowercase()) {
                return false;
            }
            mentions_other = true;
        }
        mentions_other
    }
}

/// Map raw points into [0, 1].
pub fn normalize(raw: f32) -> f32 {
    ((raw + 2.0) / 10.0).clamp(0.0, 1.0)
}
