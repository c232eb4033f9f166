//! MCP (Model Context Protocol) tool processes over stdio.
//!
//! Uses the official rmcp SDK. Each [`McpClient`] owns one child process
//! launched from a [`LaunchDescriptor`].
//!
//! # Example
//!
//! ```ignore
//! use runtime::tools::{Connector, LaunchDescriptor, StdioConnector, ToolClient};
//!
//! # async fn example() -> Result<(), runtime::tools::ToolError> {
//! let descriptor = LaunchDescriptor::from_command_line("chart", "npx -y @antv/mcp-server-chart")
//!     .expect("non-empty command line");
//! let client = StdioConnector.connect(&descriptor).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use rmcp::{
    ServiceExt,
    model::{CallToolRequestParams, Tool},
    service::{Peer, RoleClient, RunningService},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

use super::{Connector, LaunchDescriptor, ToolClient, ToolError};
use crate::model::ToolSpec;

/// Launches tools as child processes speaking MCP on stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioConnector;

impl Connector for StdioConnector {
    type Client = McpClient;

    async fn connect(&self, descriptor: &LaunchDescriptor) -> Result<McpClient, ToolError> {
        McpClient::spawn(descriptor).await
    }
}

/// An MCP client connected to a server process.
pub struct McpClient {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpClient {
    /// Spawn the descriptor's command and complete the MCP handshake.
    pub async fn spawn(descriptor: &LaunchDescriptor) -> Result<Self, ToolError> {
        let transport = TokioChildProcess::new(Command::new(&descriptor.command).configure(
            |cmd| {
                cmd.args(&descriptor.args).envs(&descriptor.env);
            },
        ))
        .map_err(|e| ToolError::Connect(format!("spawn {}: {e}", descriptor.command)))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| ToolError::Connect(format!("handshake with {}: {e}", descriptor.name)))?;

        Ok(Self {
            name: descriptor.name.clone(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ToolClient for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let response = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(|e| ToolError::Execution(format!("{}: list tools: {e}", self.name)))?;
        Ok(response.tools.into_iter().map(tool_spec).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Value, ToolError> {
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let content = serde_json::to_value(&result.content)
            .map_err(|e| ToolError::Execution(format!("serialize result: {e}")))?;
        if result.is_error.unwrap_or(false) {
            return Err(ToolError::Execution(content.to_string()));
        }
        Ok(content)
    }

    async fn close(&self) -> Result<(), ToolError> {
        let Some(service) = self.service.lock().await.take() else {
            return Err(ToolError::Disconnected(self.name.clone()));
        };
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| ToolError::Execution(format!("{}: cancel: {e}", self.name)))
    }
}

fn tool_spec(tool: Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name.to_string(),
        description: tool
            .description
            .map(|d| d.to_string())
            .unwrap_or_default(),
        schema: Value::Object(tool.input_schema.as_ref().clone()),
    }
}
