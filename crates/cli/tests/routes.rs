//! HTTP route tests driven through the router without a socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use datalens::server::router;
use runtime::{Agent, ExtractOptions, RequestOrchestrator, RequestSerializer};
use serde_json::{Value, json};
use tower::ServiceExt;

const DASHBOARD_REPLY: &str = "Orders grew steadily.\n\n\
**Orders per Month (TYPE: line)**\n```json\n\
[{\"name\": \"Jan\", \"value\": 12}, {\"name\": \"Feb\", \"value\": 18}, {\"name\": \"Mar\", \"value\": 25}]\n```\n\n\
**Broken (TYPE: bar)**\n```json\n[{\"name\": \"A\", \"value\": 1},]\n```";

struct Fixed(&'static str);

impl Agent for Fixed {
    async fn run(&mut self, _instruction: &str) -> runtime::Result<String> {
        Ok(self.0.to_string())
    }
}

struct Failing;

impl Agent for Failing {
    async fn run(&mut self, _instruction: &str) -> runtime::Result<String> {
        Err(runtime::Error::Agent("model call failed".into()))
    }
}

fn app<A: Agent>(agent: A) -> Router {
    router(RequestOrchestrator::new(
        RequestSerializer::spawn(agent),
        ExtractOptions::default(),
    ))
}

async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn status_reports_readiness() {
    let response = router(RequestOrchestrator::uninitialized())
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn uninitialized_service_is_unavailable() {
    let app = router(RequestOrchestrator::uninitialized());

    let (status, body) = post(app, "/chat", r#"{"message": "hello"}"#).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "not_initialized");
}

#[tokio::test]
async fn chat_returns_reply_verbatim() {
    let (status, body) = post(app(Fixed("Hello there")), "/chat", r#"{"message": "hi"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "Hello there"}));
}

#[tokio::test]
async fn empty_input_is_a_bad_request() {
    let (status, body) = post(app(Fixed("unused")), "/dashboard/generate", r#"{"query": "  "}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, _) = post(app(Fixed("unused")), "/chat", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_returns_charts_and_diagnostics() {
    let (status, body) = post(
        app(Fixed(DASHBOARD_REPLY)),
        "/dashboard/generate",
        r#"{"query": "orders by month"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "Orders grew steadily.");

    let charts = body["charts"].as_array().unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0]["title"], "Orders per Month");
    assert_eq!(charts[0]["chartType"], "line");
    assert_eq!(charts[0]["dataPoints"][2], json!({"name": "Mar", "value": 25.0}));

    let diagnostics = body["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["kind"], "malformed_json");
}

#[tokio::test]
async fn command_accepts_dashboard_snapshot() {
    let (status, body) = post(
        app(Fixed("Removed the revenue chart.")),
        "/dashboard/command",
        r#"{"command": "remove revenue", "currentDashboard": {"charts": []}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Removed the revenue chart.");
    assert_eq!(body["charts"], json!([]));
}

#[tokio::test]
async fn chart_data_without_charts_returns_raw_text() {
    let (status, body) = post(
        app(Fixed("Nothing matched that filter.")),
        "/dashboard/chart-data",
        r#"{"query": "refunds", "chartType": "pie"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], "Nothing matched that filter.");
    assert!(body.get("charts").is_none());
}

#[tokio::test]
async fn agent_failure_is_a_bad_gateway() {
    let (status, body) = post(app(Failing), "/chat", r#"{"message": "hi"}"#).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "agent_failure");
}
