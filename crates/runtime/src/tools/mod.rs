//! External tool connections and their lifecycle.

mod connection;
pub mod errors;
mod host;
mod lifecycle;
mod mcp;
mod toolset;

pub use connection::{
    ConnectionState, Connector, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, LaunchDescriptor,
    ToolClient, ToolConnection,
};
pub use errors::ToolError;
pub use host::ToolHost;
pub use lifecycle::{ShutdownReport, ToolLifecycleManager};
pub use mcp::{McpClient, StdioConnector};
pub use toolset::ToolSet;
