//! Shared types for multiplexer backends.

use serde::{Deserialize, Serialize};

/// A window (tmux) or tab (WezTerm) created at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub name: String,
    /// Command typed into the window. Empty or missing means none.
    #[serde(default)]
    pub command: Option<String>,
}

impl Window {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
        }
    }

    pub fn with_command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
        }
    }

    /// The command to send, if non-empty.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Backend type for multiplexer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplexerKind {
    /// tmux backend (default)
    #[default]
    Tmux,
    /// WezTerm backend
    WezTerm,
}

impl std::fmt::Display for MultiplexerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultiplexerKind::Tmux => write!(f, "tmux"),
            MultiplexerKind::WezTerm => write!(f, "wezterm"),
        }
    }
}

impl std::str::FromStr for MultiplexerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tmux" => Ok(MultiplexerKind::Tmux),
            "wezterm" => Ok(MultiplexerKind::WezTerm),
            other => Err(format!("unknown multiplexer: {}", other)),
        }
    }
}
