//! Prefix detection.
//!
//! A prefixed message starts with one of three marker characters. The rest
//! of the content is trimmed and split on whitespace: the first token,
//! lower-cased, is the command; the remaining tokens keep their case.

use parley_config::PrefixConfig;
use serde::{Deserialize, Serialize};

/// Which marker a command is meant to be invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixType {
    /// Imperative commands (`!help`)
    Command,
    /// Lookups (`?weather`)
    Query,
    /// Short fire-and-forget actions (`.lights`)
    Quick,
}

impl PrefixType {
    pub const ALL: [PrefixType; 3] = [PrefixType::Command, PrefixType::Query, PrefixType::Quick];

    /// The marker character configured for this type.
    pub fn marker(self, config: &PrefixConfig) -> char {
        match self {
            Self::Command => config.command,
            Self::Query => config.query,
            Self::Quick => config.quick,
        }
    }

    /// The type mapped to a marker character, if any.
    pub fn from_marker(marker: char, config: &PrefixConfig) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.marker(config) == marker)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Command => "Commands",
            Self::Query => "Queries",
            Self::Quick => "Quick actions",
        }
    }
}

impl std::fmt::Display for PrefixType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Query => write!(f, "query"),
            Self::Quick => write!(f, "quick"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrefix {
    pub prefix: char,
    pub prefix_type: PrefixType,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ParsedPrefix {
    /// Arguments re-joined with single spaces.
    pub fn args_text(&self) -> String {
        self.args.join(" ")
    }
}

/// Parse prefixed content. Returns `None` when the first character is not a
/// configured marker or nothing follows it.
pub fn parse_prefix(content: &str, config: &PrefixConfig) -> Option<ParsedPrefix> {
    let mut chars = content.chars();
    let prefix = chars.next()?;
    let prefix_type = PrefixType::from_marker(prefix, config)?;

    let mut tokens = chars.as_str().split_whitespace();
    let command = tokens.next()?.to_lowercase();
    let args = tokens.map(str::to_string).collect();

    Some(ParsedPrefix {
        prefix,
        prefix_type,
        command,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PrefixConfig {
        PrefixConfig::default()
    }

    #[test]
    fn bare_command() {
        let parsed = parse_prefix("!help", &config()).unwrap();
        assert_eq!(
            parsed,
            ParsedPrefix {
                prefix: '!',
                prefix_type: PrefixType::Command,
                command: "help".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn query_with_args_keeps_case() {
        let parsed = parse_prefix("?DEVICES Living  Room", &config()).unwrap();
        assert_eq!(parsed.prefix, '?');
        assert_eq!(parsed.prefix_type, PrefixType::Query);
        assert_eq!(parsed.command, "devices");
        assert_eq!(parsed.args, vec!["Living", "Room"]);
        assert_eq!(parsed.args_text(), "Living Room");
    }

    #[test]
    fn lone_marker_is_not_a_command() {
        assert!(parse_prefix(".", &config()).is_none());
        assert!(parse_prefix("!   ", &config()).is_none());
    }

    #[test]
    fn whitespace_after_marker_is_trimmed() {
        let parsed = parse_prefix(".  lights off", &config()).unwrap();
        assert_eq!(parsed.prefix_type, PrefixType::Quick);
        assert_eq!(parsed.command, "lights");
        assert_eq!(parsed.args, vec!["off"]);
    }

    #[test]
    fn marker_must_be_first_character() {
        assert!(parse_prefix(" !help", &config()).is_none());
        assert!(parse_prefix("hello!", &config()).is_none());
        assert!(parse_prefix("", &config()).is_none());
    }

    #[test]
    fn custom_markers() {
        let cfg = PrefixConfig {
            command: '/',
            query: '?',
            quick: '~',
        };
        assert_eq!(parse_prefix("/ping", &cfg).unwrap().prefix_type, PrefixType::Command);
        assert!(parse_prefix("!ping", &cfg).is_none());
    }
}
