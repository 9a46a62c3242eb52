//! Attention for parley: which messages deserve an answer.
//!
//! - [`router`]: classifies each inbound message into exactly one kind
//! - [`intent`]: scores how likely an unaddressed message targets the assistant
//! - [`state`]: per-conversation mention / reply timestamps
//! - [`filter`]: turns a classification plus attention state into a decision

pub mod filter;
pub mod intent;
pub mod router;
pub mod state;

pub use filter::{AttentionStatus, Decision, DecisionReason, ResponseFilter};
pub use intent::{IntentContext, IntentScore, IntentScorer, IntentWeights};
pub use router::{Classification, MessageKind, MessageRouter, PassiveTrigger, classify};
pub use state::{AttentionState, AttentionStore};
