//! Parsing of terminal input lines.

use crate::message::MessageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text for the compose field.
    Say(String),
    Open(String),
    Close,
    Retry(MessageId),
    Quit,
    /// Unknown command or bad arguments, with a usage hint.
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        let extra = parts.next().is_some();

        match (name, arg, extra) {
            ("quit" | "exit", None, _) => Command::Quit,
            ("close", None, _) => Command::Close,
            ("open", Some(peer), false) => Command::Open(peer.to_string()),
            ("open", _, _) => Command::Invalid("usage: /open <peer>".into()),
            ("retry", Some(id), false) => match id.parse::<u64>() {
                Ok(n) => Command::Retry(MessageId(n)),
                Err(_) => Command::Invalid(format!("not a message id: {id}")),
            },
            ("retry", _, _) => Command::Invalid("usage: /retry <id>".into()),
            _ => Command::Invalid(format!("unknown command: /{rest}")),
        }
    }
}
