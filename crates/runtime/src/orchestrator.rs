//! The four request kinds and how each reaches the agent.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::charts::{ChartSpec, ChartSpecExtractor, ChartType, Diagnostic, ExtractOptions};
use crate::serializer::RequestSerializer;
use crate::{Error, Result, prompts};

/// Preferred number of data points per dashboard chart.
pub const DASHBOARD_POINTS: std::ops::RangeInclusive<usize> = 3..=10;

/// Largest dashboard snapshot accepted as command context, in bytes.
pub const MAX_SNAPSHOT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReply {
    /// Agent prose with chart blocks removed.
    pub text: String,
    pub charts: Vec<ChartSpec>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartDataReply {
    Charts {
        charts: Vec<ChartSpec>,
        diagnostics: Vec<Diagnostic>,
    },
    /// The reply held no usable chart; the agent's text is returned instead.
    Raw {
        text: String,
        diagnostics: Vec<Diagnostic>,
    },
}

/// Entry point for request handlers.
///
/// Cheap to clone. An orchestrator built with [`uninitialized`] answers every
/// request with [`Error::NotInitialized`].
///
/// [`uninitialized`]: RequestOrchestrator::uninitialized
#[derive(Clone)]
pub struct RequestOrchestrator {
    serializer: Option<RequestSerializer>,
    extractor: ChartSpecExtractor,
}

impl RequestOrchestrator {
    pub fn new(serializer: RequestSerializer, options: ExtractOptions) -> Self {
        Self {
            serializer: Some(serializer),
            extractor: ChartSpecExtractor::new(options),
        }
    }

    pub fn uninitialized() -> Self {
        Self {
            serializer: None,
            extractor: ChartSpecExtractor::default(),
        }
    }

    /// Whether requests can currently reach an agent.
    pub fn is_ready(&self) -> bool {
        self.serializer.as_ref().is_some_and(RequestSerializer::is_running)
    }

    fn session(&self) -> Result<&RequestSerializer> {
        self.serializer
            .as_ref()
            .filter(|s| s.is_running())
            .ok_or(Error::NotInitialized)
    }

    /// Free-form conversation. The reply is returned verbatim.
    pub async fn chat(&self, message: &str) -> Result<ChatReply> {
        let session = self.session()?;
        let message = required("message", message)?;
        info!(kind = "chat", chars = message.len(), "request");

        let text = session.submit(message).await?;
        Ok(ChatReply { text })
    }

    pub async fn generate_dashboard(&self, query: &str) -> Result<DashboardReply> {
        let session = self.session()?;
        let query = required("query", query)?;
        info!(kind = "dashboard_generate", chars = query.len(), "request");

        let raw = session.submit(prompts::dashboard(query)).await?;
        let mut reply = self.dashboard_reply(&raw);
        for chart in &mut reply.charts {
            let points = chart.data_points.len();
            if !DASHBOARD_POINTS.contains(&points) {
                chart.warn(format!(
                    "expected {} to {} data points, got {points}",
                    DASHBOARD_POINTS.start(),
                    DASHBOARD_POINTS.end()
                ));
            }
        }
        Ok(reply)
    }

    /// Interpret a command against the caller's dashboard.
    ///
    /// `current` is forwarded to the agent as opaque context; it is neither
    /// inspected nor modified here.
    pub async fn dashboard_command(
        &self,
        command: &str,
        current: Option<&Value>,
    ) -> Result<DashboardReply> {
        let session = self.session()?;
        let command = required("command", command)?;
        let snapshot = current.filter(|v| !v.is_null()).map(Value::to_string);
        if let Some(snapshot) = &snapshot
            && snapshot.len() > MAX_SNAPSHOT_BYTES
        {
            return Err(Error::InvalidRequest(format!(
                "currentDashboard is {} bytes; the limit is {MAX_SNAPSHOT_BYTES}",
                snapshot.len()
            )));
        }
        info!(
            kind = "dashboard_command",
            chars = command.len(),
            with_snapshot = snapshot.is_some(),
            "request"
        );

        let raw = session
            .submit(prompts::dashboard_command(command, snapshot.as_deref()))
            .await?;
        Ok(self.dashboard_reply(&raw))
    }

    /// Fetch data for one chart, optionally of a requested type.
    pub async fn chart_data(&self, query: &str, hint: Option<&str>) -> Result<ChartDataReply> {
        let session = self.session()?;
        let query = required("query", query)?;
        let hint = parse_hint(hint)?;
        info!(kind = "chart_data", chars = query.len(), hint = ?hint, "request");

        let raw = session.submit(prompts::chart_data(query, hint)).await?;
        let extraction = self.extractor.extract(&raw);
        if extraction.charts.is_empty() {
            return Ok(ChartDataReply::Raw {
                text: raw.trim().to_string(),
                diagnostics: extraction.diagnostics,
            });
        }

        let mut charts = extraction.charts;
        if let Some(wanted) = hint {
            for chart in charts.iter_mut().filter(|c| c.chart_type != wanted) {
                let got = chart.chart_type;
                chart.warn(format!("requested a {wanted} chart, got {got}"));
            }
        }
        Ok(ChartDataReply::Charts {
            charts,
            diagnostics: extraction.diagnostics,
        })
    }

    fn dashboard_reply(&self, raw: &str) -> DashboardReply {
        let extraction = self.extractor.extract(raw);
        info!(
            charts = extraction.charts.len(),
            diagnostics = extraction.diagnostics.len(),
            "dashboard reply extracted"
        );
        DashboardReply {
            text: extraction.display_text,
            charts: extraction.charts,
            diagnostics: extraction.diagnostics,
        }
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn parse_hint(hint: Option<&str>) -> Result<Option<ChartType>> {
    match hint.map(str::trim) {
        None | Some("") => Ok(None),
        Some(h) if h.eq_ignore_ascii_case("auto") => Ok(None),
        Some(h) => h
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidRequest(format!("chartType: {e}"))),
    }
}
