//! Runtime for a conversational analytics service.
//!
//! A single model-driven agent answers questions about a MongoDB deployment,
//! using external MCP tool processes for queries and chart rendering. This
//! crate owns the parts around that agent:
//!
//! - **Tools**: [`ToolLifecycleManager`] starts every tool process before the
//!   service accepts traffic and stops them on the way out.
//! - **Agent**: [`AgentSession`] runs the model and tool loop and records a
//!   transcript in [`storage`].
//! - **Serialization**: [`RequestSerializer`] gives concurrent callers
//!   first-come-first-served access to the one agent.
//! - **Charts**: [`ChartSpecExtractor`] turns chart blocks in agent replies
//!   into validated [`ChartSpec`]s.
//! - **Orchestration**: [`RequestOrchestrator`] maps chat, dashboard and
//!   chart-data requests onto the agent.
//!
//! [`AnalyticsContext`] ties them together for the lifetime of a process.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{AnalyticsContext, LaunchDescriptor, OpenAiBackend, SessionSettings, StdioConnector};
//! use storage::EventStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let tools = vec![
//!     LaunchDescriptor::from_command_line("mongodb", "npx -y mongodb-mcp-server@latest")
//!         .expect("non-empty command line")
//!         .env("MDB_MCP_CONNECTION_STRING", "mongodb://localhost:27017"),
//! ];
//! let backend = OpenAiBackend::builder("sk-...", runtime::providers::DEFAULT_MODEL).build();
//! let store = EventStore::open("events.db")?;
//!
//! let context =
//!     AnalyticsContext::start(StdioConnector, tools, backend, store, SessionSettings::default())
//!         .await?;
//! let reply = context.orchestrator().generate_dashboard("revenue by region").await?;
//! println!("{} charts", reply.charts.len());
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod agent;
pub mod charts;
mod context;
mod error;
pub mod model;
mod orchestrator;
pub mod prompts;
pub mod providers;
mod serializer;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentSession, DEFAULT_MAX_TOOL_ROUNDS};
pub use charts::{
    ChartSpec, ChartSpecExtractor, ChartType, DataPoint, Diagnostic, DiagnosticKind,
    ExtractOptions, Extraction, PiePolicy,
};
pub use context::{AnalyticsContext, SessionSettings};
pub use error::{Error, Result};
pub use orchestrator::{ChartDataReply, ChatReply, DashboardReply, RequestOrchestrator};
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use serializer::{DEFAULT_QUEUE_DEPTH, RequestSerializer};
pub use tools::{
    ConnectionState, LaunchDescriptor, ShutdownReport, StdioConnector, ToolLifecycleManager,
};
