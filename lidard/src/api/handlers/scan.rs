//! Latest scan handler

use crate::api::error::ApiError;
use crate::api::AppState;

use axum::{extract::State, Json};
use lidar_core::api::ApiResponse;
use lidar_core::Scan;
use std::sync::Arc;
use tracing::debug;

/// Get the most recently completed scan.
///
/// The cache survives stop and reconfigure, so the last scan stays
/// available after the device is idle.
///
/// # Endpoint
///
/// `GET /api/v0/scan/latest`
///
/// # Errors
///
/// - `NoScanYet` (404) - No scan has been completed since startup
pub(crate) async fn latest_scan(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Arc<Scan>>>, ApiError> {
    debug!("Request: GET /api/v0/scan/latest");

    match state.manager.latest_scan() {
        Some(scan) => crate::api_ok!(scan),
        None => Err(ApiError::not_found("NoScanYet", "No scan available yet")),
    }
}
