//! Turning agent replies into typed chart specifications.
//!
//! The agent embeds chart data in its prose as
//!
//! ````text
//! **Monthly Revenue (TYPE: line)**
//! ```json
//! [{"name": "Jan", "value": 45000}, {"name": "Feb", "value": 52000}]
//! ```
//! ````
//!
//! [`ChartSpecExtractor::extract`] finds those blocks, validates each payload
//! against its chart type and returns the surviving [`ChartSpec`]s together
//! with the prose that remains once the blocks are cut out. The input is
//! untrusted: every problem is confined to the block it occurs in and
//! reported as a [`Diagnostic`], never as an error.

mod scan;
mod shape;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub use scan::{MAX_BLOCKS, MAX_PAYLOAD_BYTES};
use shape::Shape;

/// Categories above which a pie chart is flagged.
pub const PIE_CATEGORY_LIMIT: usize = 7;

/// Categories kept when a pie chart is clamped; the rest become "Other".
pub const PIE_CLAMP_KEEP: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// Chart Types
// ─────────────────────────────────────────────────────────────────────────────

/// The chart types a front end knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Area,
    Scatter,
    Table,
    Radar,
    Heatmap,
    Gauge,
    Funnel,
}

impl ChartType {
    pub const ALL: [ChartType; 10] = [
        Self::Bar,
        Self::Line,
        Self::Pie,
        Self::Area,
        Self::Scatter,
        Self::Table,
        Self::Radar,
        Self::Heatmap,
        Self::Gauge,
        Self::Funnel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Area => "area",
            Self::Scatter => "scatter",
            Self::Table => "table",
            Self::Radar => "radar",
            Self::Heatmap => "heatmap",
            Self::Gauge => "gauge",
            Self::Funnel => "funnel",
        }
    }

    fn shape(self) -> Shape {
        match self {
            Self::Bar
            | Self::Line
            | Self::Area
            | Self::Radar
            | Self::Pie
            | Self::Gauge
            | Self::Funnel => Shape::Category,
            Self::Scatter => Shape::Scatter,
            Self::Table => Shape::Table,
            Self::Heatmap => Shape::Heatmap,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown chart type '{0}'")]
pub struct UnknownChartType(pub String);

impl FromStr for ChartType {
    type Err = UnknownChartType;

    /// Case-insensitive. Separators and a trailing "chart" or "plot" are
    /// ignored, so `Scatter Plot` and `heat-map` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        for suffix in ["chart", "plot"] {
            if key.len() > suffix.len() && key.ends_with(suffix) {
                key.truncate(key.len() - suffix.len());
            }
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| UnknownChartType(s.trim().to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chart Specs
// ─────────────────────────────────────────────────────────────────────────────

/// One validated record of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataPoint {
    /// Bar, line, pie, area, radar, gauge and funnel records.
    Category {
        name: String,
        value: f64,
        /// Additional numeric series, keyed by field name.
        #[serde(flatten)]
        series: BTreeMap<String, f64>,
    },
    Scatter {
        x: f64,
        y: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Heatmap intensity at a pair of categories.
    Cell { x: String, y: String, value: f64 },
    /// A table row, passed through as-is.
    Row(Map<String, Value>),
}

impl DataPoint {
    /// A category point with a single value.
    pub fn category(name: impl Into<String>, value: f64) -> Self {
        Self::Category {
            name: name.into(),
            value,
            series: BTreeMap::new(),
        }
    }

    fn value(&self) -> Option<f64> {
        match self {
            Self::Category { value, .. } | Self::Cell { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// A chart ready for rendering. `data_points` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub title: String,
    pub chart_type: ChartType,
    pub data_points: Vec<DataPoint>,
    /// Advisory notes; the chart is still usable.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ChartSpec {
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedJson,
    UnknownChartType,
    NotAnArray,
    NoValidRecords,
    RecordsDropped,
    Unterminated,
    MissingPayload,
    PayloadTooLarge,
    TooManyBlocks,
}

/// A problem found in one chart block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// 1-based position of the block in the reply.
    pub block: usize,
    pub title: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    fn new(block: usize, title: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            block,
            title: title.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Whether the block produced no chart.
    pub fn is_fatal(&self) -> bool {
        self.kind != DiagnosticKind::RecordsDropped
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "block {}: {}", self.block, self.message)
        } else {
            write!(f, "block {} ({}): {}", self.block, self.title, self.message)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// What to do with pie charts that have too many slices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiePolicy {
    /// Keep every slice and attach a warning.
    #[default]
    Annotate,
    /// Keep the largest slices and fold the rest into "Other".
    Clamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub pie_policy: PiePolicy,
}

/// Result of [`ChartSpecExtractor::extract`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// The reply with every recognized chart block removed.
    pub display_text: String,
    /// Surviving charts in source order.
    pub charts: Vec<ChartSpec>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartSpecExtractor {
    options: ExtractOptions,
}

impl ChartSpecExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }

    /// Extract chart specs from an agent reply. Never fails.
    pub fn extract(&self, raw: &str) -> Extraction {
        let scan = scan::scan(raw);
        let mut diagnostics = scan.diagnostics;
        let mut charts = Vec::with_capacity(scan.blocks.len());

        for block in scan.blocks {
            match self.build(block) {
                Ok((chart, note)) => {
                    charts.push(chart);
                    diagnostics.extend(note);
                }
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        diagnostics.sort_by_key(|d| d.block);
        for d in diagnostics.iter().filter(|d| d.is_fatal()) {
            warn!(block = d.block, title = %d.title, kind = ?d.kind, "{}", d.message);
        }

        debug!(
            charts = charts.len(),
            diagnostics = diagnostics.len(),
            "chart extraction finished"
        );
        Extraction {
            display_text: scan.display_text,
            charts,
            diagnostics,
        }
    }

    fn build(
        &self,
        block: scan::RawBlock,
    ) -> Result<(ChartSpec, Option<Diagnostic>), Diagnostic> {
        let fail = |kind, message: String| Diagnostic::new(block.index, &block.title, kind, message);

        let payload: Value = serde_json::from_str(&block.payload)
            .map_err(|e| fail(DiagnosticKind::MalformedJson, format!("invalid JSON: {e}")))?;
        let chart_type: ChartType = block
            .declared_type
            .parse()
            .map_err(|e: UnknownChartType| fail(DiagnosticKind::UnknownChartType, e.to_string()))?;
        let Value::Array(records) = payload else {
            return Err(fail(
                DiagnosticKind::NotAnArray,
                "payload must be a JSON array of records".into(),
            ));
        };

        let total = records.len();
        let validated = shape::validate(chart_type.shape(), records);
        if validated.points.is_empty() {
            let detail = validated
                .rejected
                .first()
                .map(|r| format!(" (record {}: {})", r.record, r.reason))
                .unwrap_or_default();
            return Err(fail(
                DiagnosticKind::NoValidRecords,
                format!("no valid {chart_type} records{detail}"),
            ));
        }

        let note = validated.rejected.first().map(|first| {
            fail(
                DiagnosticKind::RecordsDropped,
                format!(
                    "dropped {} of {total} records; record {}: {}",
                    validated.rejected.len(),
                    first.record,
                    first.reason
                ),
            )
        });

        let mut chart = ChartSpec {
            title: block.title.clone(),
            chart_type,
            data_points: validated.points,
            warnings: validated.warnings,
        };
        if chart_type == ChartType::Pie {
            self.apply_pie_policy(&mut chart);
        }
        Ok((chart, note))
    }

    fn apply_pie_policy(&self, chart: &mut ChartSpec) {
        let count = chart.data_points.len();
        if count <= PIE_CATEGORY_LIMIT {
            return;
        }
        match self.options.pie_policy {
            PiePolicy::Annotate => chart.warn(format!(
                "pie chart has {count} categories; more than {PIE_CATEGORY_LIMIT} are hard to read"
            )),
            PiePolicy::Clamp => {
                let mut ranked: Vec<usize> = (0..count).collect();
                ranked.sort_by(|&a, &b| {
                    let value = |i: usize| chart.data_points[i].value().unwrap_or(0.0);
                    value(b).total_cmp(&value(a))
                });
                let mut keep = ranked[..PIE_CLAMP_KEEP].to_vec();
                keep.sort_unstable();

                let other: f64 = ranked[PIE_CLAMP_KEEP..]
                    .iter()
                    .filter_map(|&i| chart.data_points[i].value())
                    .sum();
                let mut points: Vec<DataPoint> = keep
                    .into_iter()
                    .map(|i| chart.data_points[i].clone())
                    .collect();
                points.push(DataPoint::category("Other", other));

                chart.data_points = points;
                chart.warn(format!(
                    "pie chart had {count} categories; the smallest {} were merged into \"Other\"",
                    count - PIE_CLAMP_KEEP
                ));
            }
        }
    }
}
