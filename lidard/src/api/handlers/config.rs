//! Configuration handlers

use crate::api::error::ApiError;
use crate::api::AppState;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use lidar_core::api::ApiResponse;
use lidar_core::LidarConfig;
use tracing::{debug, info};

/// Get the active hardware configuration.
///
/// # Endpoint
///
/// `GET /api/v0/config`
pub(crate) async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LidarConfig>>, ApiError> {
    debug!("Request: GET /api/v0/config");
    crate::api_ok!(state.manager.config().await)
}

/// Replace the hardware configuration.
///
/// While running, the device is stopped and restarted with the new
/// configuration; the response arrives after the restart.
///
/// # Endpoint
///
/// `PUT /api/v0/config`
///
/// # Errors
///
/// - `InvalidConfig` (400) - Body missing fields or structurally invalid
/// - `ReconfigureWhileError` (409) - Stop or reset first
/// - `InvalidTransition` (409) - Starting or stopping
pub(crate) async fn put_config(
    State(state): State<AppState>,
    body: Result<Json<LidarConfig>, JsonRejection>,
) -> Result<Json<ApiResponse<LidarConfig>>, ApiError> {
    debug!("Request: PUT /api/v0/config");

    let Json(config) = match body {
        Ok(body) => body,
        Err(rejection) => return crate::api_fail!("InvalidConfig", rejection.body_text()),
    };

    let applied = state.manager.reconfigure(config).await?;
    info!(
        "Configuration replaced via API: {} @ {} baud, pwm {}, target {} RPM",
        applied.serial_port, applied.baud_rate, applied.pwm_duty, applied.motor_rpm_target
    );
    crate::api_ok!(applied)
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{body_json, mock_app, send};
    use axum::http::StatusCode;
    use serde_json::json;

    fn config_body(target: u32) -> serde_json::Value {
        json!({
            "serial_port": "/dev/ttyUSB1",
            "baud_rate": 115200,
            "pwm_duty": 660,
            "motor_rpm_target": target
        })
    }

    #[tokio::test]
    async fn test_get_config() {
        let (app, _) = mock_app();
        let json = body_json(send(&app, "GET", "/api/v0/config", None).await).await;
        assert_eq!(json["data"]["serial_port"], "/dev/ttyUSB0");
        assert_eq!(json["data"]["pwm_duty"], 600);
    }

    #[tokio::test]
    async fn test_put_config_while_idle() {
        let (app, manager) = mock_app();
        let response = send(&app, "PUT", "/api/v0/config", Some(config_body(660))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["data"]["serial_port"], "/dev/ttyUSB1");
        assert_eq!(json["data"]["rpm_tolerance"], 0.1);
        assert_eq!(manager.config().await.baud_rate, 115200);
    }

    #[tokio::test]
    async fn test_put_invalid_config() {
        let (app, manager) = mock_app();
        let response = send(&app, "PUT", "/api/v0/config", Some(config_body(0))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["reason"], "InvalidConfig");
        assert_eq!(manager.config().await.serial_port, "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_put_malformed_body() {
        let (app, _) = mock_app();
        let response = send(
            &app,
            "PUT",
            "/api/v0/config",
            Some(json!({"serial_port": "/dev/ttyUSB1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["reason"], "InvalidConfig");
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_invalid_config_while_running_keeps_running() {
        let (app, manager) = mock_app();
        manager.start().await.unwrap();

        let response = send(&app, "PUT", "/api/v0/config", Some(config_body(0))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(send(&app, "GET", "/api/v0/status", None).await).await;
        assert_eq!(json["data"]["state"], "running");
        assert_eq!(json["data"]["config"]["serial_port"], "/dev/ttyUSB0");
    }
}
