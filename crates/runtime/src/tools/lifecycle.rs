//! Process-wide startup and shutdown of the tool set.

use tracing::{error, info, warn};

use super::{ConnectionState, Connector, LaunchDescriptor, ToolClient, ToolConnection, ToolSet};
use crate::{Error, Result};

/// Owns every [`ToolConnection`] and is the only code that opens or closes
/// them.
///
/// Startup is all-or-nothing: if any connection fails, the ones already
/// opened are closed again and [`Error::Startup`] is returned. Shutdown is
/// best-effort and isolates failures per connection.
pub struct ToolLifecycleManager<C: Connector> {
    connector: C,
    connections: Vec<ToolConnection<C::Client>>,
    started: bool,
}

/// Outcome of [`ToolLifecycleManager::stop_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Connections that closed cleanly.
    pub closed: Vec<String>,
    /// One [`Error::Shutdown`] per connection that failed to close.
    pub failures: Vec<Error>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<C: Connector> ToolLifecycleManager<C> {
    pub fn new(connector: C, descriptors: impl IntoIterator<Item = LaunchDescriptor>) -> Self {
        Self {
            connector,
            connections: descriptors.into_iter().map(ToolConnection::new).collect(),
            started: false,
        }
    }

    /// Name and state of every managed connection, in configuration order.
    pub fn states(&self) -> Vec<(String, ConnectionState)> {
        self.connections
            .iter()
            .map(|c| (c.name().to_string(), c.state()))
            .collect()
    }

    /// Connect every configured tool and merge their catalogues.
    ///
    /// May be called once per manager.
    pub async fn start_all(&mut self) -> Result<ToolSet<C::Client>> {
        if self.started {
            return Err(Error::InvalidState("tool set already started".into()));
        }
        self.started = true;

        for index in 0..self.connections.len() {
            let connection = &mut self.connections[index];
            if let Err(e) = connection.connect(&self.connector).await {
                let tool = connection.name().to_string();
                error!(tool = %tool, error = %e, "tool failed to connect");
                self.abort_startup().await;
                return Err(Error::Startup {
                    tool,
                    reason: e.to_string(),
                });
            }
        }

        let clients: Vec<_> = self
            .connections
            .iter()
            .filter_map(|c| c.client().map(|client| (c.name().to_string(), client)))
            .collect();

        let mut tools = ToolSet::empty();
        for (name, client) in clients {
            match client.list_tools().await {
                Ok(specs) => {
                    info!(tool = %name, count = specs.len(), "discovered tools");
                    tools.register(&name, client, specs);
                }
                Err(e) => {
                    error!(tool = %name, error = %e, "tool listing failed");
                    drop(tools);
                    self.abort_startup().await;
                    return Err(Error::Startup {
                        tool: name,
                        reason: format!("listing tools: {e}"),
                    });
                }
            }
        }

        Ok(tools)
    }

    /// Close every connected tool, continuing past individual failures.
    pub async fn stop_all(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for connection in &mut self.connections {
            if connection.state() != ConnectionState::Connected {
                continue;
            }
            let name = connection.name().to_string();
            info!(tool = %name, "closing tool");
            match connection.close().await {
                Ok(()) => report.closed.push(name),
                Err(e) => report.failures.push(Error::Shutdown {
                    tool: name,
                    reason: e.to_string(),
                }),
            }
        }
        report
    }

    async fn abort_startup(&mut self) {
        for connection in &mut self.connections {
            if let Err(e) = connection.close().await {
                warn!(tool = %connection.name(), error = %e, "close after failed startup");
            }
        }
    }
}
