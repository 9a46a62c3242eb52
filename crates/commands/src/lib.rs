//! Prefix commands for parley.
//!
//! Messages that start with a marker character (`!`, `?`, `.` by default)
//! bypass natural-language handling and are dispatched here:
//!
//! - [`parse_prefix`] splits content into marker type, command and args
//! - [`CommandRegistry`] resolves names and aliases, suggests near misses,
//!   and runs handlers behind a panic boundary
//! - [`builtin_registry`] seeds the registry with the built-in table

pub mod builtin;
pub mod parser;
pub mod registry;
pub mod suggest;

pub use builtin::builtin_registry;
pub use parser::{ParsedPrefix, PrefixType, parse_prefix};
pub use registry::{
    CommandCall, CommandContext, CommandEntry, CommandFailure, CommandHandler, CommandOutcome,
    CommandRegistry, CommandReply, CommandSpec, CommandSuccess, MAX_SUGGESTIONS,
};
