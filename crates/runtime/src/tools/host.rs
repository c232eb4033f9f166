//! Tool host trait.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// The tools an agent session may invoke.
///
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send + Sync {
    /// Specifications advertised to the model.
    fn specs(&self) -> &[ToolSpec];

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;
}
