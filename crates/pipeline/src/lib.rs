//! # Parley Pipeline
//!
//! The entry point the rest of an assistant talks to. For every inbound chat
//! message the caller asks the pipeline to:
//!
//! 1. classify it ([`AttentionPipeline::classify`])
//! 2. decide whether to answer ([`AttentionPipeline::should_respond`])
//! 3. gather context for the generator ([`AttentionPipeline::get_context`],
//!    [`AttentionPipeline::search_memory`])
//!
//! or all three at once with [`AttentionPipeline::triage`]. Prefix commands
//! and natural-language actions are dispatched through
//! [`AttentionPipeline::parse_and_execute_prefix`] and
//! [`AttentionPipeline::process_action_query`].

pub mod pipeline;

pub use pipeline::{AttentionPipeline, ContextBundle, MaintenanceReport, Triage};
