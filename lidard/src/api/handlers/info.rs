//! Info handlers for system information and root endpoint

use crate::api::error::ApiError;
use crate::api::AppState;

use axum::{extract::State, Json};
use lidar_core::api::{ApiResponse, InfoResponse};
use serde_json::{json, Value};
use tracing::debug;

/// Handle the root endpoint.
///
/// Basic service identification, useful as a health check.
///
/// # Endpoint
///
/// `GET /`
pub(crate) async fn root() -> Result<Json<ApiResponse<Value>>, ApiError> {
    debug!("Request: GET /");

    let data = json!({
        "service": "LiDAR Management Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok"
    });

    crate::api_ok!(data)
}

/// Retrieve server information.
///
/// # Endpoint
///
/// `GET /api/v0/info`
///
/// # Returns
///
/// - `version` - Server version
/// - `hardware_mode` - "serial" or "mock"
/// - `uptime` - Server uptime in seconds
/// - `subscriber_capacity` / `overflow_policy` - Stream queue settings
pub(crate) async fn get_info(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<InfoResponse>>, ApiError> {
    debug!("Request: GET /api/v0/info");

    let hub = state.manager.hub();
    let info = InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        hardware_mode: state.manager.hardware_mode().to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        subscriber_capacity: hub.default_capacity(),
        overflow_policy: hub.default_policy(),
    };

    crate::api_ok!(info)
}
