//! Command registry and dispatch.
//!
//! Maps command names to their metadata and (optionally) a handler. Aliases
//! are stored as secondary keys flagged `is_alias`; they resolve like the
//! canonical name but never appear in listings or suggestions.
//!
//! Dispatch never unwinds into the caller: handler errors and panics both
//! come back as [`CommandFailure::ExecutionError`].

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parley_config::PrefixConfig;
use parley_core::error::{CommandError, panic_message};
use parley_core::message::ConversationId;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::parser::{ParsedPrefix, PrefixType};
use crate::suggest::levenshtein;

/// Most suggestions returned for an unknown command.
pub const MAX_SUGGESTIONS: usize = 5;

/// Largest edit distance still offered as a suggestion.
const MAX_SUGGESTION_DISTANCE: usize = 2;

/// Who invoked a command and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandContext {
    pub conversation_id: Option<ConversationId>,
    pub author_id: String,
    pub author_name: String,
    pub is_direct: bool,
}

/// Everything a handler sees for one invocation.
pub struct CommandCall<'a> {
    pub parsed: &'a ParsedPrefix,
    pub context: &'a CommandContext,
    pub registry: &'a CommandRegistry,
}

/// A handler's reply text plus optional structured data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, call: &CommandCall<'_>) -> Result<CommandReply, CommandError>;
}

/// Registration metadata for a command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub prefix_type: PrefixType,
    pub description: String,
    pub aliases: Vec<String>,
}

impl CommandSpec {
    pub fn new(prefix_type: PrefixType, description: impl Into<String>) -> Self {
        Self {
            prefix_type,
            description: description.into(),
            aliases: Vec::new(),
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_lowercase()).collect();
        self
    }
}

#[derive(Clone)]
pub struct CommandEntry {
    pub name: String,
    /// The canonical name (equal to `name` unless this is an alias)
    pub canonical: String,
    pub prefix_type: PrefixType,
    pub description: String,
    pub aliases: Vec<String>,
    pub handler: Option<Arc<dyn CommandHandler>>,
    pub is_alias: bool,
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("canonical", &self.canonical)
            .field("prefix_type", &self.prefix_type)
            .field("aliases", &self.aliases)
            .field("has_handler", &self.handler.is_some())
            .field("is_alias", &self.is_alias)
            .finish()
    }
}

/// Successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandSuccess {
    /// A handler ran and replied.
    Handled { command: String, reply: CommandReply },
    /// The command is known but reserved: nothing is wired to it yet.
    NoHandler {
        command: String,
        prefix_type: PrefixType,
        description: String,
    },
}

impl CommandSuccess {
    pub fn command(&self) -> &str {
        match self {
            Self::Handled { command, .. } | Self::NoHandler { command, .. } => command,
        }
    }

    pub fn no_handler(&self) -> bool {
        matches!(self, Self::NoHandler { .. })
    }
}

/// Failed dispatch. Each variant carries what the caller needs to answer
/// the user without another lookup.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CommandFailure {
    #[error("Unknown command `{command}`")]
    UnknownCommand {
        command: String,
        suggestions: Vec<String>,
    },

    #[error("`{command}` is a {expected} command, try `{hint}`")]
    WrongPrefix {
        command: String,
        expected: PrefixType,
        hint: String,
    },

    #[error("`{command}` failed: {message}")]
    ExecutionError { command: String, message: String },
}

impl CommandFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "unknown_command",
            Self::WrongPrefix { .. } => "wrong_prefix",
            Self::ExecutionError { .. } => "execution_error",
        }
    }
}

pub type CommandOutcome = Result<CommandSuccess, CommandFailure>;

pub struct CommandRegistry {
    entries: BTreeMap<String, CommandEntry>,
    markers: PrefixConfig,
}

impl CommandRegistry {
    pub fn new(markers: PrefixConfig) -> Self {
        Self {
            entries: BTreeMap::new(),
            markers,
        }
    }

    pub fn markers(&self) -> &PrefixConfig {
        &self.markers
    }

    /// Register a command and its aliases. Replaces an existing command of
    /// the same name; an alias never shadows a canonical command.
    pub fn register(
        &mut self,
        name: &str,
        spec: CommandSpec,
        handler: Option<Arc<dyn CommandHandler>>,
    ) {
        let name = name.to_lowercase();
        let entry = CommandEntry {
            name: name.clone(),
            canonical: name.clone(),
            prefix_type: spec.prefix_type,
            description: spec.description,
            aliases: spec.aliases,
            handler,
            is_alias: false,
        };

        for alias in &entry.aliases {
            if self.entries.get(alias).is_some_and(|e| !e.is_alias) {
                warn!(alias = %alias, command = %name, "Alias collides with a command; skipped");
                continue;
            }
            self.entries.insert(
                alias.clone(),
                CommandEntry {
                    name: alias.clone(),
                    is_alias: true,
                    ..entry.clone()
                },
            );
        }

        debug!(command = %name, prefix_type = %entry.prefix_type, "Registered command");
        self.entries.insert(name, entry);
    }

    /// Look up a name, following aliases to the canonical entry.
    pub fn resolve(&self, name: &str) -> Option<&CommandEntry> {
        let entry = self.entries.get(&name.to_lowercase())?;
        if entry.is_alias {
            self.entries.get(&entry.canonical)
        } else {
            Some(entry)
        }
    }

    /// Canonical commands, alphabetically, optionally of one type.
    pub fn commands(&self, prefix_type: Option<PrefixType>) -> Vec<&CommandEntry> {
        self.entries
            .values()
            .filter(|e| !e.is_alias)
            .filter(|e| prefix_type.is_none_or(|t| e.prefix_type == t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.is_alias).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names close to `input`: prefix matches first, then names within a
    /// small edit distance. Aliases are never suggested.
    pub fn suggestions(&self, input: &str) -> Vec<String> {
        let input = input.to_lowercase();
        let canonical = || self.entries.values().filter(|e| !e.is_alias);

        let mut out: Vec<String> = canonical()
            .filter(|e| e.name.starts_with(&input) || input.starts_with(&e.name))
            .map(|e| e.name.clone())
            .collect();

        for entry in canonical() {
            if out.len() >= MAX_SUGGESTIONS {
                break;
            }
            if !out.contains(&entry.name) && levenshtein(&input, &entry.name) <= MAX_SUGGESTION_DISTANCE {
                out.push(entry.name.clone());
            }
        }

        out.truncate(MAX_SUGGESTIONS);
        out
    }

    /// The corrected form of an invocation, using the command's own marker.
    pub fn hint(&self, command: &str, args: &[String]) -> Option<String> {
        let entry = self.resolve(command)?;
        let marker = entry.prefix_type.marker(&self.markers);
        let mut hint = format!("{marker}{}", entry.name);
        if !args.is_empty() {
            hint.push(' ');
            hint.push_str(&args.join(" "));
        }
        Some(hint)
    }

    /// Dispatch a parsed command.
    pub async fn execute(&self, parsed: &ParsedPrefix, context: &CommandContext) -> CommandOutcome {
        let Some(entry) = self.resolve(&parsed.command) else {
            let suggestions = self.suggestions(&parsed.command);
            debug!(command = %parsed.command, ?suggestions, "Unknown command");
            return Err(CommandFailure::UnknownCommand {
                command: parsed.command.clone(),
                suggestions,
            });
        };

        if entry.prefix_type != parsed.prefix_type {
            let hint = self
                .hint(&entry.name, &parsed.args)
                .unwrap_or_else(|| entry.name.clone());
            return Err(CommandFailure::WrongPrefix {
                command: entry.name.clone(),
                expected: entry.prefix_type,
                hint,
            });
        }

        let Some(handler) = entry.handler.as_ref() else {
            return Ok(CommandSuccess::NoHandler {
                command: entry.name.clone(),
                prefix_type: entry.prefix_type,
                description: entry.description.clone(),
            });
        };

        let call = CommandCall {
            parsed,
            context,
            registry: self,
        };
        match AssertUnwindSafe(handler.handle(&call)).catch_unwind().await {
            Ok(Ok(reply)) => Ok(CommandSuccess::Handled {
                command: entry.name.clone(),
                reply,
            }),
            Ok(Err(e)) => {
                warn!(command = %entry.name, error = %e, "Command handler failed");
                Err(CommandFailure::ExecutionError {
                    command: entry.name.clone(),
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref(), "handler panicked");
                warn!(command = %entry.name, %message, "Command handler panicked");
                Err(CommandFailure::ExecutionError {
                    command: entry.name.clone(),
                    message,
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_prefix;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn handle(&self, call: &CommandCall<'_>) -> Result<CommandReply, CommandError> {
            if call.parsed.args.is_empty() {
                return Err(CommandError::InvalidArguments("nothing to echo".into()));
            }
            Ok(CommandReply::text(call.parsed.args_text()))
        }
    }

    struct Boom;

    #[async_trait]
    impl CommandHandler for Boom {
        async fn handle(&self, _call: &CommandCall<'_>) -> Result<CommandReply, CommandError> {
            panic!("kaboom");
        }
    }

    fn registry() -> CommandRegistry {
        let mut r = CommandRegistry::new(PrefixConfig::default());
        r.register(
            "echo",
            CommandSpec::new(PrefixType::Command, "Repeat text").aliases(&["say"]),
            Some(Arc::new(Echo)),
        );
        r.register("boom", CommandSpec::new(PrefixType::Command, "Explode"), Some(Arc::new(Boom)));
        r.register(
            "weather",
            CommandSpec::new(PrefixType::Query, "Current weather").aliases(&["w"]),
            None,
        );
        r.register("wake", CommandSpec::new(PrefixType::Command, "Wake a machine"), None);
        r.register("status", CommandSpec::new(PrefixType::Command, "Service status"), None);
        r.register("stats", CommandSpec::new(PrefixType::Command, "Usage stats"), None);
        r.register("state", CommandSpec::new(PrefixType::Command, "Device state"), None);
        r.register("start", CommandSpec::new(PrefixType::Command, "Start a service"), None);
        r.register("stop", CommandSpec::new(PrefixType::Command, "Stop a service"), None);
        r.register("stash", CommandSpec::new(PrefixType::Command, "Stash a note"), None);
        r
    }

    async fn run(registry: &CommandRegistry, content: &str) -> CommandOutcome {
        let parsed = parse_prefix(content, registry.markers()).unwrap();
        registry.execute(&parsed, &CommandContext::default()).await
    }

    #[tokio::test]
    async fn handled_command_replies() {
        let r = registry();
        let outcome = run(&r, "!echo Hello There").await.unwrap();
        assert_eq!(
            outcome,
            CommandSuccess::Handled {
                command: "echo".into(),
                reply: CommandReply::text("Hello There"),
            }
        );
    }

    #[tokio::test]
    async fn alias_resolves_to_canonical() {
        let r = registry();
        let outcome = run(&r, "!say hi").await.unwrap();
        assert_eq!(outcome.command(), "echo");
    }

    #[tokio::test]
    async fn reserved_command_reports_no_handler() {
        let r = registry();
        let outcome = run(&r, "?w london").await.unwrap();
        assert!(outcome.no_handler());
        assert_eq!(outcome.command(), "weather");
    }

    #[tokio::test]
    async fn wrong_prefix_carries_corrected_form() {
        let r = registry();
        let err = run(&r, "!weather Oslo").await.unwrap_err();
        assert_eq!(err.code(), "wrong_prefix");
        assert_eq!(
            err,
            CommandFailure::WrongPrefix {
                command: "weather".into(),
                expected: PrefixType::Query,
                hint: "?weather Oslo".into(),
            }
        );
    }

    #[tokio::test]
    async fn handler_error_becomes_execution_error() {
        let r = registry();
        let err = run(&r, "!echo").await.unwrap_err();
        assert_eq!(err.code(), "execution_error");
        assert!(err.to_string().contains("nothing to echo"));
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let r = registry();
        let err = run(&r, "!boom").await.unwrap_err();
        assert_eq!(
            err,
            CommandFailure::ExecutionError {
                command: "boom".into(),
                message: "kaboom".into(),
            }
        );
        // Registry still usable afterwards
        assert!(run(&r, "!echo still here").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_command_suggests_close_names() {
        let r = registry();
        let err = run(&r, "!ech").await.unwrap_err();
        match err {
            CommandFailure::UnknownCommand { command, suggestions } => {
                assert_eq!(command, "ech");
                assert_eq!(suggestions, vec!["echo"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn suggestions_are_bounded_and_exclude_aliases() {
        let r = registry();
        let suggestions = r.suggestions("sta");
        assert!(suggestions.len() <= MAX_SUGGESTIONS);
        assert_eq!(suggestions, vec!["start", "stash", "state", "stats", "status"]);

        let near_alias = r.suggestions("sa");
        assert!(!near_alias.contains(&"say".to_string()));
        assert!(!r.suggestions("x").contains(&"w".to_string()));
    }

    #[test]
    fn suggestions_include_edit_distance_matches() {
        let r = registry();
        assert_eq!(r.suggestions("wether"), vec!["weather"]);
        assert_eq!(r.suggestions("echoo"), vec!["echo"]);
    }

    #[test]
    fn listing_skips_aliases() {
        let r = registry();
        let names: Vec<&str> = r
            .commands(Some(PrefixType::Query))
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["weather"]);
        assert_eq!(r.len(), 10);
        assert_eq!(r.resolve("W").unwrap().name, "weather");
    }

    #[test]
    fn alias_cannot_shadow_command() {
        let mut r = registry();
        r.register(
            "shout",
            CommandSpec::new(PrefixType::Command, "Loud echo").aliases(&["echo"]),
            None,
        );
        assert_eq!(r.resolve("echo").unwrap().name, "echo");
        assert!(r.resolve("echo").unwrap().handler.is_some());
    }

    #[test]
    fn failure_serializes_with_code_tag() {
        let failure = CommandFailure::UnknownCommand {
            command: "x".into(),
            suggestions: vec![],
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error"], "unknown_command");
    }
}
