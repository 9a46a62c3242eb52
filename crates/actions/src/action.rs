//! The `Action` trait and the capability-backed implementation.
//!
//! An action pairs trigger keywords with a side-effecting operation and a
//! formatter for its result. Most actions forward to the external
//! [`CapabilityRegistry`]; actions that only need the process itself declare
//! the always-available [`CORE_CAPABILITY`].

use async_trait::async_trait;
use parley_core::capability::{ActionContext, CapabilityRegistry};
use parley_core::error::{ActionError, CapabilityError};
use serde::Serialize;

/// Sentinel capability that is always available and never looked up.
pub const CORE_CAPABILITY: &str = "core";

#[async_trait]
pub trait Action: Send + Sync {
    /// Unique id (e.g., "device_list").
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Lower-case phrases that trigger this action when found in a query.
    fn keywords(&self) -> &[String];

    /// Capability that must be available before running.
    fn required_capability(&self) -> &str;

    /// Run the action. `capabilities` is the registry the executor holds.
    async fn execute(
        &self,
        context: &ActionContext,
        capabilities: &dyn CapabilityRegistry,
    ) -> Result<serde_json::Value, ActionError>;

    /// Render a raw result for the chat.
    fn format_result(&self, result: &serde_json::Value) -> String;

    fn info(&self) -> ActionInfo {
        ActionInfo {
            id: self.id().to_string(),
            description: self.description().to_string(),
            keywords: self.keywords().to_vec(),
            required_capability: self.required_capability().to_string(),
        }
    }
}

/// Listing entry for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionInfo {
    pub id: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub required_capability: String,
}

pub type ResultFormatter = fn(&serde_json::Value) -> String;

/// An action that invokes one named capability and formats its JSON result.
pub struct CapabilityAction {
    id: String,
    description: String,
    keywords: Vec<String>,
    capability: String,
    formatter: ResultFormatter,
}

impl CapabilityAction {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        keywords: &[&str],
        capability: impl Into<String>,
        formatter: ResultFormatter,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            capability: capability.into(),
            formatter,
        }
    }
}

#[async_trait]
impl Action for CapabilityAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn keywords(&self) -> &[String] {
        &self.keywords
    }

    fn required_capability(&self) -> &str {
        &self.capability
    }

    async fn execute(
        &self,
        context: &ActionContext,
        capabilities: &dyn CapabilityRegistry,
    ) -> Result<serde_json::Value, ActionError> {
        // Tell the capability which action is calling, so one capability can
        // serve several actions.
        let mut context = context.clone();
        context
            .params
            .insert("action".into(), serde_json::Value::String(self.id.clone()));

        capabilities
            .invoke(&self.capability, &context)
            .await
            .map_err(|e| match e {
                CapabilityError::NotAvailable(capability) => ActionError::UnavailableCapability {
                    action_id: self.id.clone(),
                    capability,
                },
                other => ActionError::ExecutionFailed {
                    action_id: self.id.clone(),
                    reason: other.to_string(),
                },
            })
    }

    fn format_result(&self, result: &serde_json::Value) -> String {
        (self.formatter)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::capability::NoCapabilities;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<ActionContext>>,
    }

    #[async_trait]
    impl CapabilityRegistry for Recording {
        async fn is_available(&self, _name: &str) -> bool {
            true
        }

        async fn invoke(
            &self,
            name: &str,
            context: &ActionContext,
        ) -> Result<serde_json::Value, CapabilityError> {
            self.seen.lock().unwrap().push(context.clone());
            if name == "broken" {
                return Err(CapabilityError::InvocationFailed {
                    name: name.into(),
                    reason: "socket closed".into(),
                });
            }
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    fn action(capability: &str) -> CapabilityAction {
        CapabilityAction::new("probe", "Probe things", &["Probe"], capability, |v| v.to_string())
    }

    #[tokio::test]
    async fn forwards_to_capability_with_action_id() {
        let registry = Recording {
            seen: Mutex::new(vec![]),
        };
        let result = action("net")
            .execute(&ActionContext::new("probe it"), &registry)
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
        let seen = registry.seen.lock().unwrap();
        assert_eq!(seen[0].params["action"], "probe");
        assert_eq!(seen[0].query, "probe it");
    }

    #[tokio::test]
    async fn maps_capability_errors() {
        let registry = Recording {
            seen: Mutex::new(vec![]),
        };
        let err = action("broken")
            .execute(&ActionContext::new("x"), &registry)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "execution_failure");

        let err = action("net")
            .execute(&ActionContext::new("x"), &NoCapabilities)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::UnavailableCapability {
                action_id: "probe".into(),
                capability: "net".into(),
            }
        );
    }

    #[test]
    fn keywords_are_lowercased_and_listed() {
        let info = action("net").info();
        assert_eq!(info.keywords, vec!["probe"]);
        assert_eq!(info.required_capability, "net");
    }
}
