use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by tool connections and tool execution.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection closed: {0}")]
    Disconnected(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("execution failed: {0}")]
    Execution(String),
}
