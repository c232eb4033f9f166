use std::time::Duration;

use thiserror::Error;

/// Runtime errors.
///
/// Chart extraction problems are never reported here; they travel as
/// [`Diagnostic`](crate::charts::Diagnostic)s alongside the extracted charts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A tool connection did not reach the connected state during startup.
    #[error("startup failed: tool '{tool}': {reason}")]
    Startup { tool: String, reason: String },

    /// A tool connection failed to close during shutdown.
    #[error("shutdown failed: tool '{tool}': {reason}")]
    Shutdown { tool: String, reason: String },

    /// The agent session failed while processing an instruction.
    #[error("agent failure: {0}")]
    Agent(String),

    /// No agent session is available to serve the request.
    #[error("agent session not initialized")]
    NotInitialized,

    /// The request did not complete within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller supplied unusable input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
