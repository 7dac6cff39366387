//! Lifecycle control handlers

use crate::api::error::ApiError;
use crate::api::AppState;

use axum::{extract::State, Json};
use lidar_core::api::{ApiResponse, StatusResponse};
use tracing::{debug, info};

/// Get the manager status.
///
/// Always succeeds; faults are reported in the `state`/`fault` fields.
///
/// # Endpoint
///
/// `GET /api/v0/status`
pub(crate) async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    debug!("Request: GET /api/v0/status");
    crate::api_ok!(state.manager.status().await)
}

/// Start the device.
///
/// Responds once the motor has stabilized and scans are flowing.
///
/// # Endpoint
///
/// `POST /api/v0/start`
///
/// # Errors
///
/// - `AlreadyRunning` (409) - Starting or running already
/// - `InvalidTransition` (409) - Stopping, or in the error state
/// - `HardwareOpenFailed` (503) - The serial port could not be opened
/// - `RpmStabilizationTimeout` (504) - Motor never reached the target RPM
pub(crate) async fn start(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    debug!("Request: POST /api/v0/start");

    state.manager.start().await?;
    info!("LiDAR started via API");
    crate::api_ok!(state.manager.status().await)
}

/// Stop the device. Idempotent.
///
/// # Endpoint
///
/// `POST /api/v0/stop`
pub(crate) async fn stop(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    debug!("Request: POST /api/v0/stop");

    state.manager.stop().await?;
    info!("LiDAR stopped via API");
    crate::api_ok!(state.manager.status().await)
}

/// Clear a fault (Error → Idle).
///
/// # Endpoint
///
/// `POST /api/v0/reset`
pub(crate) async fn reset(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    debug!("Request: POST /api/v0/reset");

    state.manager.reset().await?;
    crate::api_ok!(state.manager.status().await)
}
