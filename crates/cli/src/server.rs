//! HTTP routes over the request orchestrator.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use runtime::charts::{ChartSpec, Diagnostic};
use runtime::{ChartDataReply, DashboardReply, RequestOrchestrator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: RequestOrchestrator,
}

/// Build the router with CORS and request tracing.
pub fn router(orchestrator: RequestOrchestrator) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/chat", post(chat))
        .route("/dashboard/generate", post(generate_dashboard))
        .route("/dashboard/command", post(dashboard_command))
        .route("/dashboard/chart-data", post(chart_data))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { orchestrator })
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    /// Machine-readable code such as `not_initialized`.
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// The body was not the JSON the route expects.
    Body(String),
    Runtime(runtime::Error),
}

impl From<runtime::Error> for ApiError {
    fn from(err: runtime::Error) -> Self {
        Self::Runtime(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use runtime::Error as E;

        let (status, error, message) = match self {
            ApiError::Body(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            ApiError::Runtime(err) => {
                let (status, code) = match &err {
                    E::NotInitialized => (StatusCode::SERVICE_UNAVAILABLE, "not_initialized"),
                    E::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                    E::Agent(_) => (StatusCode::BAD_GATEWAY, "agent_failure"),
                    E::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                };
                (status, code, err.to_string())
            }
        };
        if status.is_server_error() {
            warn!(%status, error, %message, "request failed");
        }

        let body = ErrorBody {
            success: false,
            error,
            message,
        };
        (status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    ready: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        status: "datalens analytics API is running",
        ready: state.orchestrator.is_ready(),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body?;
    let reply = state.orchestrator.chat(&request.message).await?;
    Ok(Json(ChatResponse {
        response: reply.text,
    }))
}

#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequest {
    #[serde(default)]
    command: String,
    current_dashboard: Option<Value>,
}

#[derive(Serialize)]
struct DashboardResponse {
    success: bool,
    response: String,
    charts: Vec<ChartSpec>,
    diagnostics: Vec<Diagnostic>,
}

impl From<DashboardReply> for DashboardResponse {
    fn from(reply: DashboardReply) -> Self {
        Self {
            success: true,
            response: reply.text,
            charts: reply.charts,
            diagnostics: reply.diagnostics,
        }
    }
}

async fn generate_dashboard(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let Json(request) = body?;
    let reply = state.orchestrator.generate_dashboard(&request.query).await?;
    Ok(Json(reply.into()))
}

async fn dashboard_command(
    State(state): State<AppState>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let Json(request) = body?;
    let reply = state
        .orchestrator
        .dashboard_command(&request.command, request.current_dashboard.as_ref())
        .await?;
    Ok(Json(reply.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartDataRequest {
    #[serde(default)]
    query: String,
    chart_type: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChartDataResponse {
    Charts {
        success: bool,
        charts: Vec<ChartSpec>,
        diagnostics: Vec<Diagnostic>,
    },
    Raw {
        success: bool,
        data: String,
        diagnostics: Vec<Diagnostic>,
    },
}

async fn chart_data(
    State(state): State<AppState>,
    body: Result<Json<ChartDataRequest>, JsonRejection>,
) -> Result<Json<ChartDataResponse>, ApiError> {
    let Json(request) = body?;
    let reply = state
        .orchestrator
        .chart_data(&request.query, request.chart_type.as_deref())
        .await?;

    Ok(Json(match reply {
        ChartDataReply::Charts {
            charts,
            diagnostics,
        } => ChartDataResponse::Charts {
            success: true,
            charts,
            diagnostics,
        },
        ChartDataReply::Raw { text, diagnostics } => ChartDataResponse::Raw {
            success: true,
            data: text,
            diagnostics,
        },
    }))
}
