//! Built-in command table.
//!
//! `help`, `ping` and `time` have handlers here. Everything else is
//! registered as reserved metadata so it resolves, lists, and gets
//! suggested; the embedding application attaches handlers by registering
//! the same name again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parley_config::PrefixConfig;
use parley_core::error::CommandError;

use crate::parser::PrefixType;
use crate::registry::{CommandCall, CommandHandler, CommandRegistry, CommandReply, CommandSpec};

/// Reserved commands: (name, type, description, aliases).
const RESERVED: &[(&str, PrefixType, &str, &[&str])] = &[
    ("status", PrefixType::Command, "Show service and integration status", &[]),
    ("stats", PrefixType::Command, "Show memory and usage statistics", &[]),
    ("memory", PrefixType::Command, "Show or clear what I remember here", &["mem"]),
    ("scan", PrefixType::Command, "Scan the local network for devices", &[]),
    ("wake", PrefixType::Command, "Send a wake-on-LAN packet to a machine", &["wol"]),
    ("remind", PrefixType::Command, "Set a reminder", &["reminder"]),
    ("roll", PrefixType::Command, "Roll dice, e.g. 2d6", &["dice"]),
    ("flip", PrefixType::Command, "Flip a coin", &["coin"]),
    ("devices", PrefixType::Query, "List known devices on the network", &["dev"]),
    ("weather", PrefixType::Query, "Current weather for a location", &["w"]),
    ("speedtest", PrefixType::Query, "Run an internet speed test", &["speed"]),
    ("recall", PrefixType::Query, "Search past conversation summaries", &[]),
    ("lights", PrefixType::Quick, "Toggle or dim the lights", &["light"]),
    ("say", PrefixType::Quick, "Make me say something", &[]),
];

/// A registry seeded with the built-in table.
pub fn builtin_registry(markers: PrefixConfig) -> CommandRegistry {
    let mut registry = CommandRegistry::new(markers);

    registry.register(
        "help",
        CommandSpec::new(PrefixType::Command, "List commands or describe one").aliases(&["h", "commands"]),
        Some(Arc::new(HelpHandler)),
    );
    registry.register(
        "ping",
        CommandSpec::new(PrefixType::Command, "Check that I'm awake"),
        Some(Arc::new(PingHandler)),
    );
    registry.register(
        "time",
        CommandSpec::new(PrefixType::Query, "Current time (UTC)"),
        Some(Arc::new(TimeHandler)),
    );

    for (name, prefix_type, description, aliases) in RESERVED {
        registry.register(name, CommandSpec::new(*prefix_type, *description).aliases(aliases), None);
    }

    registry
}

pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, call: &CommandCall<'_>) -> Result<CommandReply, CommandError> {
        let registry = call.registry;
        let markers = registry.markers();

        if let Some(topic) = call.parsed.args.first() {
            let name = topic.trim_start_matches(|c: char| PrefixType::from_marker(c, markers).is_some());
            let entry = registry
                .resolve(name)
                .ok_or_else(|| CommandError::InvalidArguments(format!("No command named `{name}`")))?;

            let marker = entry.prefix_type.marker(markers);
            let mut text = format!("{marker}{}: {}", entry.name, entry.description);
            if !entry.aliases.is_empty() {
                let aliases: Vec<String> = entry.aliases.iter().map(|a| format!("{marker}{a}")).collect();
                text.push_str(&format!("\nAliases: {}", aliases.join(", ")));
            }
            if entry.handler.is_none() {
                text.push_str("\n(not available yet)");
            }
            return Ok(CommandReply::text(text));
        }

        let mut lines = Vec::new();
        for prefix_type in PrefixType::ALL {
            let marker = prefix_type.marker(markers);
            let names: Vec<String> = registry
                .commands(Some(prefix_type))
                .iter()
                .map(|e| format!("{marker}{}", e.name))
                .collect();
            if !names.is_empty() {
                lines.push(format!("{}: {}", prefix_type.label(), names.join(", ")));
            }
        }
        Ok(CommandReply::text(lines.join("\n")))
    }
}

pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(&self, _call: &CommandCall<'_>) -> Result<CommandReply, CommandError> {
        Ok(CommandReply::text("Pong!"))
    }
}

pub struct TimeHandler;

#[async_trait]
impl CommandHandler for TimeHandler {
    async fn handle(&self, _call: &CommandCall<'_>) -> Result<CommandReply, CommandError> {
        let now = Utc::now();
        Ok(
            CommandReply::text(format!("It's {} UTC ({})", now.format("%H:%M"), now.format("%Y-%m-%d")))
                .with_data(serde_json::json!({ "timestamp": now.to_rfc3339() })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_prefix;
    use crate::registry::{CommandContext, CommandSuccess};

    async fn reply(content: &str) -> CommandReply {
        let registry = builtin_registry(PrefixConfig::default());
        let parsed = parse_prefix(content, registry.markers()).unwrap();
        match registry.execute(&parsed, &CommandContext::default()).await {
            Ok(CommandSuccess::Handled { reply, .. }) => reply,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn help_groups_commands_by_marker() {
        let text = reply("!help").await.text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Commands: "));
        assert!(lines[0].contains("!ping"));
        assert!(lines[1].starts_with("Queries: "));
        assert!(lines[1].contains("?weather"));
        assert!(lines[2].starts_with("Quick actions: "));
        assert!(lines[2].contains(".lights"));
        // aliases are not listed
        assert!(!text.contains("!wol"));
    }

    #[tokio::test]
    async fn help_describes_one_command() {
        let text = reply("!help ?w").await.text;
        assert!(text.starts_with("?weather: Current weather"));
        assert!(text.contains("Aliases: ?w"));
        assert!(text.contains("not available yet"));
    }

    #[tokio::test]
    async fn help_for_unknown_topic_fails() {
        let registry = builtin_registry(PrefixConfig::default());
        let parsed = parse_prefix("!help nope", registry.markers()).unwrap();
        let err = registry
            .execute(&parsed, &CommandContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "execution_error");
    }

    #[tokio::test]
    async fn ping_pongs() {
        assert_eq!(reply("!ping").await.text, "Pong!");
    }

    #[tokio::test]
    async fn time_carries_timestamp() {
        let reply = reply("?time").await;
        assert!(reply.text.ends_with(')'));
        assert!(reply.data.unwrap()["timestamp"].is_string());
    }

    #[tokio::test]
    async fn reserved_commands_resolve_without_handlers() {
        let registry = builtin_registry(PrefixConfig::default());
        let parsed = parse_prefix("!wol desktop", registry.markers()).unwrap();
        let outcome = registry
            .execute(&parsed, &CommandContext::default())
            .await
            .unwrap();
        assert!(outcome.no_handler());
        assert_eq!(outcome.command(), "wake");
    }
}
