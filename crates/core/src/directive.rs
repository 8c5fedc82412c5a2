//! Directive argument parsing.
//!
//! A directive is a single line of the form
//! `#DW <command> key=value key=value ...`. [`parse_args`] splits it into the
//! command and an ordered argument map; nothing here interprets the values.
//!
//! ```
//! use flowtest_core::directive::parse_args;
//!
//! let args = parse_args("#DW jobdw type=xfs name=scratch capacity=1TB").unwrap();
//! assert_eq!(args.command(), "jobdw");
//! assert_eq!(args.get("type"), Some("xfs"));
//! ```

use std::collections::BTreeMap;

use crate::error::DirectiveError;

/// Leading token every directive carries.
pub const DIRECTIVE_PREFIX: &str = "#DW";

/// Directive commands the harness knows how to act on.
pub mod command {
    pub const JOB_DW: &str = "jobdw";
    pub const CREATE_PERSISTENT: &str = "create_persistent";
    pub const DESTROY_PERSISTENT: &str = "destroy_persistent";
    pub const PERSISTENT_DW: &str = "persistentdw";
    pub const CONTAINER: &str = "container";
    pub const COPY_IN: &str = "copy_in";
    pub const COPY_OUT: &str = "copy_out";
}

/// Parsed command and arguments of one directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveArgs {
    command: String,
    args: BTreeMap<String, String>,
}

impl DirectiveArgs {
    /// The directive command (`jobdw`, `container`, ...).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the directive's command equals `command`.
    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// Looks up an argument. The pseudo-key `command` resolves to the command.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == "command" {
            return Some(&self.command);
        }
        self.args.get(key).map(String::as_str)
    }

    /// Iterates over `key=value` arguments in key order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parses a directive line into its command and arguments.
pub fn parse_args(directive: &str) -> Result<DirectiveArgs, DirectiveError> {
    let mut tokens = directive.split_whitespace();

    if tokens.next() != Some(DIRECTIVE_PREFIX) {
        return Err(DirectiveError::MissingPrefix(directive.to_owned()));
    }

    let command = tokens
        .next()
        .ok_or_else(|| DirectiveError::MissingCommand(directive.to_owned()))?;
    if command.contains('=') {
        return Err(DirectiveError::MissingCommand(directive.to_owned()));
    }

    let mut args = BTreeMap::new();
    for token in tokens {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => (key, value),
            _ => {
                return Err(DirectiveError::MalformedArgument {
                    directive: directive.to_owned(),
                    argument: token.to_owned(),
                });
            }
        };
        if key == "command" || args.insert(key.to_owned(), value.to_owned()).is_some() {
            return Err(DirectiveError::DuplicateKey {
                directive: directive.to_owned(),
                key: key.to_owned(),
            });
        }
    }

    Ok(DirectiveArgs {
        command: command.to_owned(),
        args,
    })
}
