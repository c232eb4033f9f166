//! Process-wide wiring of tools, session and request handling.

use std::time::Duration;

use storage::EventStore;
use tracing::{error, info, warn};

use crate::agent::{AgentSession, DEFAULT_MAX_TOOL_ROUNDS};
use crate::charts::ExtractOptions;
use crate::model::Backend;
use crate::orchestrator::RequestOrchestrator;
use crate::prompts::{DEFAULT_AGENT_NAME, PREAMBLE};
use crate::serializer::RequestSerializer;
use crate::Result;
use crate::tools::{
    ConnectionState, Connector, LaunchDescriptor, ShutdownReport, ToolLifecycleManager,
};

/// How the agent session is set up.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub name: String,
    pub preamble: String,
    pub max_tool_rounds: usize,
    /// Deadline for each request, queueing included. `None` waits forever.
    pub request_deadline: Option<Duration>,
    pub extract: ExtractOptions,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            preamble: PREAMBLE.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_deadline: None,
            extract: ExtractOptions::default(),
        }
    }
}

/// Everything that lives from startup to shutdown.
///
/// Built once before serving traffic; request handlers only ever see the
/// [`RequestOrchestrator`] handle.
pub struct AnalyticsContext<C: Connector> {
    tools: ToolLifecycleManager<C>,
    serializer: RequestSerializer,
    orchestrator: RequestOrchestrator,
}

impl<C: Connector> AnalyticsContext<C> {
    /// Connect every tool, then create the session over them.
    ///
    /// Fails with [`Error::Startup`](crate::Error::Startup) if any tool does
    /// not connect; no tool is left running in that case.
    pub async fn start<B>(
        connector: C,
        descriptors: Vec<LaunchDescriptor>,
        backend: B,
        store: EventStore,
        settings: SessionSettings,
    ) -> Result<Self>
    where
        B: Backend + 'static,
    {
        info!(tools = descriptors.len(), "starting analytics context");
        let mut tools = ToolLifecycleManager::new(connector, descriptors);
        let toolset = tools.start_all().await?;

        let session = match AgentSession::new(
            settings.name,
            settings.preamble,
            backend,
            toolset,
            store,
        ) {
            Ok(session) => session.with_max_tool_rounds(settings.max_tool_rounds),
            Err(e) => {
                error!(error = %e, "could not create agent session");
                let report = tools.stop_all().await;
                for failure in &report.failures {
                    warn!(error = %failure, "tool shutdown after failed startup");
                }
                return Err(e);
            }
        };

        let serializer = RequestSerializer::spawn(session).with_deadline(settings.request_deadline);
        let orchestrator = RequestOrchestrator::new(serializer.clone(), settings.extract);
        info!("analytics context ready");

        Ok(Self {
            tools,
            serializer,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> RequestOrchestrator {
        self.orchestrator.clone()
    }

    pub fn tool_states(&self) -> Vec<(String, ConnectionState)> {
        self.tools.states()
    }

    /// End the session, then close every tool.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("shutting down analytics context");
        self.serializer.shutdown().await;

        let report = self.tools.stop_all().await;
        for failure in &report.failures {
            warn!(error = %failure, "tool did not shut down cleanly");
        }
        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "analytics context stopped"
        );
        report
    }
}
