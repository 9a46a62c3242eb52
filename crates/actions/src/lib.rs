//! Natural-language actions for parley.
//!
//! When the assistant decides to answer, a query that looks like a concrete
//! request ("what devices are online?") can be served by an action instead
//! of free-form generation. Actions run against the external
//! [`CapabilityRegistry`](parley_core::CapabilityRegistry).

pub mod action;
pub mod builtin;
pub mod executor;

pub use action::{Action, ActionInfo, CORE_CAPABILITY, CapabilityAction};
pub use builtin::{CurrentTimeAction, builtin_actions};
pub use executor::{
    ActionDetection, ActionExecutor, ActionFailure, ActionResult, ActionSuccess, QueryOutcome,
};
