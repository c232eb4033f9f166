//! Routing of tool calls to the connection that offers the tool.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{ToolClient, ToolError, ToolHost};
use crate::model::{ToolCall, ToolSpec};

/// Read-only view over the connected tools, produced by
/// [`ToolLifecycleManager::start_all`](super::ToolLifecycleManager::start_all).
pub struct ToolSet<T> {
    connections: Vec<(String, Arc<T>)>,
    specs: Vec<ToolSpec>,
    routes: HashMap<String, usize>,
}

impl<T: ToolClient> ToolSet<T> {
    pub fn empty() -> Self {
        Self {
            connections: Vec::new(),
            specs: Vec::new(),
            routes: HashMap::new(),
        }
    }

    pub(super) fn register(&mut self, connection: &str, client: Arc<T>, specs: Vec<ToolSpec>) {
        let index = self.connections.len();
        self.connections.push((connection.to_string(), client));

        for spec in specs {
            if let Some(&owner) = self.routes.get(&spec.name) {
                warn!(
                    tool = %spec.name,
                    kept = %self.connections[owner].0,
                    ignored = %connection,
                    "duplicate tool name"
                );
                continue;
            }
            self.routes.insert(spec.name.clone(), index);
            self.specs.push(spec);
        }
    }

    /// Name of the connection serving `tool`.
    pub fn connection_for(&self, tool: &str) -> Option<&str> {
        self.routes
            .get(tool)
            .map(|&index| self.connections[index].0.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<T: ToolClient> ToolHost for ToolSet<T> {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let index = *self
            .routes
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let (connection, client) = &self.connections[index];
        let arguments = arguments(&call.input)?;

        debug!(tool = %call.name, connection = %connection, "executing tool");
        client.call_tool(&call.name, arguments).await
    }
}

/// Tool inputs must be JSON objects; `null` means no arguments.
fn arguments(input: &Value) -> Result<Option<Map<String, Value>>, ToolError> {
    match input {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map.clone())),
        other => Err(ToolError::InvalidInput(format!(
            "expected object arguments, got {other}"
        ))),
    }
}
