//! Test utilities for CLI testing
//!
//! A small in-process stand-in for the daemon: same routes and envelopes,
//! with an instant start and a fixed four-point scan.

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use lidar_core::api::{ApiResponse, InfoResponse, StatusResponse};
use lidar_core::{LidarConfig, OverflowPolicy, Sample, Scan};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Shared mock daemon state
#[derive(Debug, Clone, Default)]
pub struct MockServerState {
    inner: Arc<Mutex<MockDevice>>,
}

#[derive(Debug, Default)]
struct MockDevice {
    running: bool,
    config: LidarConfig,
    latest: Option<Scan>,
}

impl MockServerState {
    /// Current configuration held by the mock
    pub fn config(&self) -> LidarConfig {
        self.inner.lock().unwrap().config.clone()
    }

    fn status(&self) -> StatusResponse {
        let device = self.inner.lock().unwrap();
        StatusResponse {
            state: if device.running { "running" } else { "idle" }.to_string(),
            fault: None,
            config: device.config.clone(),
            subscriber_count: 0,
            malformed_sample_count: 0,
            scans_published: u64::from(device.latest.is_some()),
            uptime_secs: 1,
        }
    }
}

/// Mock server implementation
pub struct MockServer {
    state: MockServerState,
}

impl MockServer {
    /// Create a new mock server
    pub fn new() -> Self {
        Self {
            state: MockServerState::default(),
        }
    }

    /// Start the mock server and return its base URL
    pub async fn start(self) -> Result<(Self, String)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server_url = format!("http://{}", listener.local_addr()?);
        let app = router(self.state.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Mock server error: {}", e);
            }
        });

        Ok((self, server_url))
    }

    /// Get a reference to the server state
    pub fn state(&self) -> &MockServerState {
        &self.state
    }
}

fn router(state: MockServerState) -> Router {
    Router::new()
        .route("/api/v0/info", get(info_handler))
        .route("/api/v0/status", get(status_handler))
        .route("/api/v0/start", post(start_handler))
        .route("/api/v0/stop", post(stop_handler))
        .route("/api/v0/reset", post(reset_handler))
        .route("/api/v0/config", get(get_config_handler).put(put_config_handler))
        .route("/api/v0/scan/latest", get(latest_scan_handler))
        .with_state(state)
}

fn fail(status: StatusCode, reason: &str, message: &str) -> Response {
    (status, Json(ApiResponse::<()>::error(reason, message))).into_response()
}

async fn info_handler() -> Json<ApiResponse<InfoResponse>> {
    Json(ApiResponse::success(InfoResponse {
        version: "0.0.0-test".to_string(),
        hardware_mode: "mock".to_string(),
        uptime: 1,
        subscriber_capacity: 10,
        overflow_policy: OverflowPolicy::DropOldest,
    }))
}

async fn status_handler(State(state): State<MockServerState>) -> Json<ApiResponse<StatusResponse>> {
    Json(ApiResponse::success(state.status()))
}

async fn start_handler(State(state): State<MockServerState>) -> Response {
    {
        let mut device = state.inner.lock().unwrap();
        if device.running {
            return fail(StatusCode::CONFLICT, "AlreadyRunning", "LiDAR is already running");
        }
        device.running = true;
        device.latest = Some(Scan::new(vec![
            Sample::new(0.0, 1000.0, 40),
            Sample::new(90.0, 0.0, 0),
            Sample::new(180.0, 2500.5, 47),
            Sample::new(270.0, 500.0, 30),
        ]));
    }
    Json(ApiResponse::success(state.status())).into_response()
}

async fn stop_handler(State(state): State<MockServerState>) -> Json<ApiResponse<StatusResponse>> {
    state.inner.lock().unwrap().running = false;
    Json(ApiResponse::success(state.status()))
}

async fn reset_handler() -> Response {
    fail(
        StatusCode::CONFLICT,
        "InvalidTransition",
        "Invalid transition: cannot reset while idle",
    )
}

async fn get_config_handler(State(state): State<MockServerState>) -> Json<ApiResponse<LidarConfig>> {
    Json(ApiResponse::success(state.config()))
}

async fn put_config_handler(
    State(state): State<MockServerState>,
    Json(config): Json<LidarConfig>,
) -> Response {
    if let Err(e) = config.validate() {
        return fail(StatusCode::BAD_REQUEST, e.code(), &e.to_string());
    }
    state.inner.lock().unwrap().config = config.clone();
    Json(ApiResponse::success(config)).into_response()
}

async fn latest_scan_handler(State(state): State<MockServerState>) -> Response {
    match state.inner.lock().unwrap().latest.clone() {
        Some(scan) => Json(ApiResponse::success(scan)).into_response(),
        None => fail(StatusCode::NOT_FOUND, "NoScanYet", "No scan available yet"),
    }
}
