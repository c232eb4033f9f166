//! A single managed link to an external tool process.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{info, warn};

use super::ToolError;
use crate::model::ToolSpec;

/// Connect budget used when a descriptor does not set one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Close budget used when a descriptor does not set one.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// How to launch a tool process.
#[derive(Clone)]
pub struct LaunchDescriptor {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Environment for the child process. Values may hold secrets.
    pub env: BTreeMap<String, String>,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl LaunchDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Build a descriptor from a whitespace-separated command line such as
    /// `npx -y mongodb-mcp-server@latest`.
    ///
    /// Returns `None` for a blank command line.
    pub fn from_command_line(name: impl Into<String>, line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        Some(Self::new(name, command).args(words))
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn connect_timeout(mut self, budget: Duration) -> Self {
        self.connect_timeout = budget;
        self
    }

    pub fn close_timeout(mut self, budget: Duration) -> Self {
        self.close_timeout = budget;
        self
    }
}

// Env values are connection strings and keys; only their names are printed.
impl fmt::Debug for LaunchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchDescriptor")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("connect_timeout", &self.connect_timeout)
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

/// Lifecycle state of a [`ToolConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A live session with a tool provider.
pub trait ToolClient: Send + Sync + 'static {
    /// List the tools the provider offers.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolSpec>, ToolError>> + Send;

    /// Invoke a tool with JSON object arguments.
    fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send;

    /// Terminate the session and its process.
    fn close(&self) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Opens [`ToolClient`]s from launch descriptors.
pub trait Connector: Send + Sync + 'static {
    type Client: ToolClient;

    fn connect(
        &self,
        descriptor: &LaunchDescriptor,
    ) -> impl Future<Output = Result<Self::Client, ToolError>> + Send;
}

/// One external tool process and its connection state.
///
/// Connections are opened and closed only by the
/// [`ToolLifecycleManager`](super::ToolLifecycleManager); everyone else sees
/// the shared client handle.
pub struct ToolConnection<T> {
    descriptor: LaunchDescriptor,
    state: ConnectionState,
    client: Option<Arc<T>>,
}

impl<T: ToolClient> ToolConnection<T> {
    pub fn new(descriptor: LaunchDescriptor) -> Self {
        Self {
            descriptor,
            state: ConnectionState::Unconnected,
            client: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn descriptor(&self) -> &LaunchDescriptor {
        &self.descriptor
    }

    /// Shared client handle, present only while connected.
    pub fn client(&self) -> Option<Arc<T>> {
        match self.state {
            ConnectionState::Connected => self.client.clone(),
            _ => None,
        }
    }

    pub(super) async fn connect<C>(&mut self, connector: &C) -> Result<(), ToolError>
    where
        C: Connector<Client = T>,
    {
        if self.state != ConnectionState::Unconnected {
            return Err(ToolError::Connect(format!(
                "connection '{}' is {}; connections are opened once",
                self.name(),
                self.state
            )));
        }

        self.state = ConnectionState::Connecting;
        info!(tool = %self.name(), command = %self.descriptor.command, "connecting tool");

        let budget = self.descriptor.connect_timeout;
        match timeout(budget, connector.connect(&self.descriptor)).await {
            Ok(Ok(client)) => {
                self.client = Some(Arc::new(client));
                self.state = ConnectionState::Connected;
                info!(tool = %self.name(), "tool connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                Err(ToolError::Timeout(budget.as_millis() as u64))
            }
        }
    }

    /// Close the connection if it is connected. Closing any other state is a
    /// no-op.
    pub(super) async fn close(&mut self) -> Result<(), ToolError> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let Some(client) = self.client.take() else {
            self.state = ConnectionState::Closed;
            return Ok(());
        };

        let budget = self.descriptor.close_timeout;
        let outcome = match timeout(budget, client.close()).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(budget.as_millis() as u64)),
        };

        match &outcome {
            Ok(()) => {
                self.state = ConnectionState::Closed;
                info!(tool = %self.name(), "tool closed");
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                warn!(tool = %self.name(), error = %e, "tool did not close cleanly");
            }
        }
        outcome
    }
}
