//! Action executor — maps natural-language queries onto registered actions.
//!
//! ```text
//! query → detect_action (keyword scan, confidence)
//!       → confidence < min? → LowConfidence (no side effects)
//!       → execute: capability check → invoke (timeout, panic boundary)
//!                → format_result
//! ```
//!
//! Every failure comes back typed with `suggest_command` set, so the caller
//! can point the user at the equivalent prefix command.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parley_config::ActionsConfig;
use parley_core::capability::{ActionContext, CapabilityRegistry};
use parley_core::error::{ActionError, panic_message};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionInfo, CORE_CAPABILITY};
use crate::builtin::builtin_actions;

const BASE_CONFIDENCE: f32 = 0.7;
const CONFIDENCE_BONUS: f32 = 0.1;
const POLITENESS_MARKERS: [&str; 2] = ["please", "can you"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDetection {
    pub action_id: String,
    /// The keyword that matched
    pub keyword: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSuccess {
    pub action_id: String,
    pub raw: serde_json::Value,
    pub formatted: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionFailure {
    pub error: ActionError,
    /// Always set: the caller may fall back to an explicit prefix command
    pub suggest_command: bool,
}

impl ActionFailure {
    fn new(error: ActionError) -> Self {
        Self {
            error,
            suggest_command: true,
        }
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

pub type ActionResult = Result<ActionSuccess, ActionFailure>;

/// Outcome of [`ActionExecutor::process_query`] when an action was detected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Detected but below the confidence threshold; nothing ran.
    LowConfidence { detection: ActionDetection },
    /// Detected and executed (successfully or not).
    Executed {
        detection: ActionDetection,
        result: ActionResult,
    },
}

impl QueryOutcome {
    pub fn detection(&self) -> &ActionDetection {
        match self {
            Self::LowConfidence { detection } | Self::Executed { detection, .. } => detection,
        }
    }

    pub fn executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }

    /// Reason code when nothing ran.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::LowConfidence { .. } => Some("low_confidence"),
            Self::Executed { .. } => None,
        }
    }
}

pub struct ActionExecutor {
    actions: Vec<Arc<dyn Action>>,
    capabilities: Arc<dyn CapabilityRegistry>,
    min_confidence: f32,
    invoke_timeout: Duration,
}

impl ActionExecutor {
    /// An executor with the built-in action table.
    pub fn new(capabilities: Arc<dyn CapabilityRegistry>, config: &ActionsConfig) -> Self {
        Self::with_actions(capabilities, config, builtin_actions())
    }

    pub fn with_actions(
        capabilities: Arc<dyn CapabilityRegistry>,
        config: &ActionsConfig,
        actions: Vec<Arc<dyn Action>>,
    ) -> Self {
        Self {
            actions,
            capabilities,
            min_confidence: config.min_confidence,
            invoke_timeout: Duration::from_millis(config.invoke_timeout_ms),
        }
    }

    /// Add an action. Replaces any action with the same id in place.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        match self.actions.iter().position(|a| a.id() == action.id()) {
            Some(i) => self.actions[i] = action,
            None => self.actions.push(action),
        }
    }

    pub fn actions(&self) -> Vec<ActionInfo> {
        self.actions.iter().map(|a| a.info()).collect()
    }

    /// Find the first action with a keyword contained in the query.
    pub fn detect_action(&self, query: &str) -> Option<ActionDetection> {
        let lowered = query.to_lowercase();
        let (action, keyword) = self.actions.iter().find_map(|action| {
            action
                .keywords()
                .iter()
                .find(|k| lowered.contains(k.as_str()))
                .map(|k| (action, k))
        })?;

        let mut confidence = BASE_CONFIDENCE;
        if lowered.contains('?') {
            confidence += CONFIDENCE_BONUS;
        }
        if lowered.trim_start().starts_with(keyword.as_str()) {
            confidence += CONFIDENCE_BONUS;
        }
        if POLITENESS_MARKERS.iter().any(|m| lowered.contains(m)) {
            confidence += CONFIDENCE_BONUS;
        }

        Some(ActionDetection {
            action_id: action.id().to_string(),
            keyword: keyword.clone(),
            confidence: confidence.min(1.0),
        })
    }

    /// Run one action by id.
    pub async fn execute(&self, action_id: &str, context: &ActionContext) -> ActionResult {
        let Some(action) = self.actions.iter().find(|a| a.id() == action_id) else {
            return Err(ActionFailure::new(ActionError::UnknownAction(action_id.to_string())));
        };

        let started = Instant::now();
        let capability = action.required_capability();
        let run = async {
            if capability != CORE_CAPABILITY && !self.capabilities.is_available(capability).await {
                return Err(ActionError::UnavailableCapability {
                    action_id: action_id.to_string(),
                    capability: capability.to_string(),
                });
            }
            action.execute(context, self.capabilities.as_ref()).await
        };

        let outcome = match tokio::time::timeout(self.invoke_timeout, AssertUnwindSafe(run).catch_unwind()).await {
            Err(_) => Err(ActionError::Timeout {
                action_id: action_id.to_string(),
                timeout_ms: u64::try_from(self.invoke_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(panic)) => Err(ActionError::ExecutionFailed {
                action_id: action_id.to_string(),
                reason: panic_message(panic.as_ref(), "action panicked"),
            }),
            Ok(Ok(result)) => result,
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(raw) => {
                let formatted = std::panic::catch_unwind(AssertUnwindSafe(|| action.format_result(&raw)))
                    .map_err(|panic| {
                        ActionFailure::new(ActionError::ExecutionFailed {
                            action_id: action_id.to_string(),
                            reason: format!(
                                "formatting failed: {}",
                                panic_message(panic.as_ref(), "action panicked")
                            ),
                        })
                    })?;
                info!(action = action_id, duration_ms, "Action executed");
                Ok(ActionSuccess {
                    action_id: action_id.to_string(),
                    raw,
                    formatted,
                    duration_ms,
                })
            }
            Err(error) => {
                warn!(action = action_id, code = error.code(), error = %error, duration_ms, "Action failed");
                Err(ActionFailure::new(error))
            }
        }
    }

    /// Detect and, when confident enough, execute. `None` when no action
    /// matches the query.
    pub async fn process_query(&self, query: &str, context: &ActionContext) -> Option<QueryOutcome> {
        let detection = self.detect_action(query)?;
        if detection.confidence < self.min_confidence {
            debug!(
                action = %detection.action_id,
                confidence = detection.confidence,
                min = self.min_confidence,
                "Action detected below confidence threshold"
            );
            return Some(QueryOutcome::LowConfidence { detection });
        }

        let result = self.execute(&detection.action_id, context).await;
        Some(QueryOutcome::Executed { detection, result })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CapabilityAction;
    use async_trait::async_trait;
    use parley_core::error::CapabilityError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Capabilities with canned answers; `slow` never finishes in time.
    struct Scripted {
        available: HashSet<&'static str>,
        invocations: AtomicUsize,
    }

    impl Scripted {
        fn with(names: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                available: names.iter().copied().collect(),
                invocations: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CapabilityRegistry for Scripted {
        async fn is_available(&self, name: &str) -> bool {
            self.available.contains(name)
        }

        async fn invoke(
            &self,
            name: &str,
            _context: &ActionContext,
        ) -> Result<serde_json::Value, CapabilityError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match name {
                "network" => Ok(serde_json::json!({ "devices": [{ "name": "nas", "ip": "10.0.0.2" }] })),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(serde_json::Value::Null)
                }
                "panicky" => panic!("driver crashed"),
                _ => Err(CapabilityError::InvocationFailed {
                    name: name.into(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    fn config() -> ActionsConfig {
        ActionsConfig {
            min_confidence: 0.7,
            invoke_timeout_ms: 50,
        }
    }

    fn executor(capabilities: Arc<Scripted>) -> ActionExecutor {
        let mut executor = ActionExecutor::new(capabilities, &config());
        executor.register(Arc::new(CapabilityAction::new(
            "slow_thing",
            "Never returns in time",
            &["slowpoke"],
            "slow",
            |v| v.to_string(),
        )));
        executor.register(Arc::new(CapabilityAction::new(
            "crashy",
            "Panics",
            &["crashy"],
            "panicky",
            |v| v.to_string(),
        )));
        executor
    }

    #[test]
    fn detection_confidence_bonuses() {
        let ex = executor(Scripted::with(&[]));

        let plain = ex.detect_action("show me the devices").unwrap();
        assert_eq!(plain.action_id, "device_list");
        assert_eq!(plain.keyword, "devices");
        assert!((plain.confidence - 0.7).abs() < 1e-6);

        let question = ex.detect_action("Devices on the network?").unwrap();
        assert!((question.confidence - 0.9).abs() < 1e-6);

        let all = ex.detect_action("weather? can you please check").unwrap();
        assert_eq!(all.action_id, "weather");
        assert_eq!(all.confidence, 1.0);
    }

    #[test]
    fn no_keyword_no_detection() {
        let ex = executor(Scripted::with(&[]));
        assert!(ex.detect_action("good morning everyone").is_none());
    }

    #[test]
    fn first_matching_action_wins() {
        let ex = executor(Scripted::with(&[]));
        // "what time" comes before anything else in the table
        assert_eq!(ex.detect_action("what time is the speed test").unwrap().action_id, "current_time");
    }

    #[tokio::test]
    async fn executes_and_formats() {
        let caps = Scripted::with(&["network"]);
        let ex = executor(caps.clone());
        let ok = ex.execute("device_list", &ActionContext::new("devices")).await.unwrap();
        assert_eq!(ok.formatted, "Found 1 device(s):\n- nas (10.0.0.2)");
        assert_eq!(ok.raw["devices"][0]["name"], "nas");
        assert_eq!(caps.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_capability_is_typed_and_skips_invoke() {
        let caps = Scripted::with(&[]);
        let ex = executor(caps.clone());
        let err = ex.execute("device_list", &ActionContext::new("devices")).await.unwrap_err();
        assert_eq!(err.code(), "unavailable_capability");
        assert!(err.suggest_command);
        assert_eq!(caps.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn core_actions_skip_the_availability_check() {
        let ex = executor(Scripted::with(&[]));
        let ok = ex.execute("current_time", &ActionContext::new("what time")).await.unwrap();
        assert!(ok.formatted.starts_with("It's "));
    }

    #[tokio::test]
    async fn invocation_errors_become_execution_failures() {
        let ex = executor(Scripted::with(&["weather"]));
        let err = ex.execute("weather", &ActionContext::new("weather")).await.unwrap_err();
        assert_eq!(err.code(), "execution_failure");
        assert!(err.suggest_command);
    }

    #[tokio::test]
    async fn slow_capability_times_out() {
        let ex = executor(Scripted::with(&["slow"]));
        let err = ex.execute("slow_thing", &ActionContext::new("slowpoke")).await.unwrap_err();
        assert_eq!(
            err.error,
            ActionError::Timeout {
                action_id: "slow_thing".into(),
                timeout_ms: 50,
            }
        );
        assert_eq!(err.code(), "execution_failure");
    }

    #[tokio::test]
    async fn panicking_capability_is_contained() {
        let ex = executor(Scripted::with(&["panicky"]));
        let err = ex.execute("crashy", &ActionContext::new("crashy")).await.unwrap_err();
        assert_eq!(
            err.error,
            ActionError::ExecutionFailed {
                action_id: "crashy".into(),
                reason: "driver crashed".into(),
            }
        );
    }

    #[tokio::test]
    async fn unknown_action() {
        let ex = executor(Scripted::with(&[]));
        let err = ex.execute("teleport", &ActionContext::default()).await.unwrap_err();
        assert_eq!(err.code(), "unknown_action");
    }

    #[tokio::test]
    async fn process_query_paths() {
        let caps = Scripted::with(&["network"]);
        let ex = executor(caps.clone());

        assert!(ex.process_query("hello there", &ActionContext::default()).await.is_none());

        let outcome = ex
            .process_query("devices?", &ActionContext::new("devices?"))
            .await
            .unwrap();
        assert!(outcome.executed());
        assert_eq!(outcome.reason(), None);
        match outcome {
            QueryOutcome::Executed { result, .. } => assert!(result.is_ok()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_confidence_has_no_side_effects() {
        let caps = Scripted::with(&["network"]);
        let strict = ActionsConfig {
            min_confidence: 0.95,
            ..config()
        };
        let ex = ActionExecutor::new(caps.clone(), &strict);

        let outcome = ex
            .process_query("any devices", &ActionContext::new("any devices"))
            .await
            .unwrap();
        assert!(!outcome.executed());
        assert_eq!(outcome.reason(), Some("low_confidence"));
        assert_eq!(outcome.detection().action_id, "device_list");
        assert_eq!(caps.invocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_replaces_same_id() {
        let mut ex = executor(Scripted::with(&[]));
        let before = ex.actions().len();
        ex.register(Arc::new(CapabilityAction::new(
            "weather",
            "Replacement",
            &["sky"],
            "weather",
            |v| v.to_string(),
        )));
        assert_eq!(ex.actions().len(), before);
        assert_eq!(ex.detect_action("how's the sky").unwrap().action_id, "weather");
        assert!(ex.detect_action("weather").is_none());
    }
}
