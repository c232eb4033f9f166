//! Event types for the session transcript.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// What happened during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A session was created for the named agent.
    SessionStart { agent: String },
    /// An instruction was handed to the agent.
    Instruction { content: String },
    /// The agent invoked a tool.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    /// A tool returned, successfully or not.
    ToolResult {
        name: String,
        output: serde_json::Value,
        is_error: bool,
    },
    /// The agent's final text for an instruction.
    Reply { content: String },
    /// An instruction ended in an error.
    Failure { message: String },
    /// The session was ended.
    SessionEnd,
}

impl EventKind {
    /// Stable name stored in the `kind` column and accepted by filters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Instruction { .. } => "instruction",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Reply { .. } => "reply",
            Self::Failure { .. } => "failure",
            Self::SessionEnd => "session_end",
        }
    }

    /// Every name [`EventKind::name`] can return.
    pub const NAMES: [&'static str; 7] = [
        "session_start",
        "instruction",
        "tool_call",
        "tool_result",
        "reply",
        "failure",
        "session_end",
    ];
}

/// An event in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn instruction(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(
            session_id,
            EventKind::Instruction {
                content: content.into(),
            },
        )
    }

    pub fn reply(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(
            session_id,
            EventKind::Reply {
                content: content.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_parses_its_display_form() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn kind_names_match_serde_tags() {
        let kinds = [
            EventKind::SessionStart {
                agent: "analyst".into(),
            },
            EventKind::Instruction {
                content: "hi".into(),
            },
            EventKind::ToolCall {
                name: "find".into(),
                input: serde_json::Value::Null,
            },
            EventKind::ToolResult {
                name: "find".into(),
                output: serde_json::Value::Null,
                is_error: false,
            },
            EventKind::Reply {
                content: "hello".into(),
            },
            EventKind::Failure {
                message: "boom".into(),
            },
            EventKind::SessionEnd,
        ];
        for kind in kinds {
            let tagged = serde_json::to_value(&kind).unwrap();
            assert_eq!(tagged["kind"], kind.name());
            assert!(EventKind::NAMES.contains(&kind.name()));
        }
    }
}
