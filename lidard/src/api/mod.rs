//! API module for the LiDAR daemon
//!
//! Contains the REST and WebSocket surface with the Axum router and handlers.

pub(crate) mod handlers;

use crate::manager::LidarManager;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    /// The management layer
    pub manager: Arc<LidarManager>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(manager: Arc<LidarManager>) -> Self {
        Self {
            manager,
            start_time: Instant::now(),
        }
    }
}

/// Create the main API router with all endpoints
pub(crate) fn create_router(state: AppState) -> Router {
    info!("Setting up API router...");

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(tower_http::cors::Any);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(64 * 1024));

    Router::new()
        // Lifecycle control
        .route("/api/v0/status", get(handlers::control::get_status))
        .route("/api/v0/start", post(handlers::control::start))
        .route("/api/v0/stop", post(handlers::control::stop))
        .route("/api/v0/reset", post(handlers::control::reset))
        // Configuration
        .route(
            "/api/v0/config",
            get(handlers::config::get_config).put(handlers::config::put_config),
        )
        // Scan data
        .route("/api/v0/scan/latest", get(handlers::scan::latest_scan))
        .route("/api/v0/ws/scan", get(handlers::stream::ws_scan))
        // System info endpoint
        .route("/api/v0/info", get(handlers::info::get_info))
        // Root endpoint
        .route("/", get(handlers::info::root))
        .layer(middleware_stack)
        .with_state(state)
}

/// Error handling utilities
pub(crate) mod error {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use lidar_core::api::ApiResponse;
    use lidar_core::LidarError;

    use tracing::{debug, error};

    /// Custom error type for API responses
    #[derive(Debug)]
    pub struct ApiError {
        pub status_code: StatusCode,
        /// Machine-readable reason code
        pub reason: String,
        pub message: String,
    }

    impl ApiError {
        /// Create a new API error
        pub fn new(
            status_code: StatusCode,
            reason: impl Into<String>,
            message: impl Into<String>,
        ) -> Self {
            Self {
                status_code,
                reason: reason.into(),
                message: message.into(),
            }
        }

        /// Create a bad request error
        pub fn bad_request(reason: impl Into<String>, message: impl Into<String>) -> Self {
            Self::new(StatusCode::BAD_REQUEST, reason, message)
        }

        /// Create a not found error
        pub fn not_found(reason: impl Into<String>, message: impl Into<String>) -> Self {
            Self::new(StatusCode::NOT_FOUND, reason, message)
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            if self.status_code.is_server_error() {
                error!("API Error {}: {}", self.status_code, self.message);
            } else {
                debug!("API Error {}: {}", self.status_code, self.message);
            }

            let response: ApiResponse<()> = ApiResponse::error(self.reason, self.message);

            (self.status_code, Json(response)).into_response()
        }
    }

    /// Convert LidarError to ApiError
    impl From<LidarError> for ApiError {
        fn from(err: LidarError) -> Self {
            let status_code = match &err {
                LidarError::InvalidConfig(_)
                | LidarError::Config(_)
                | LidarError::Serialization(_) => StatusCode::BAD_REQUEST,
                LidarError::AlreadyRunning(_)
                | LidarError::InvalidTransition { .. }
                | LidarError::ReconfigureWhileError
                | LidarError::StartAborted => StatusCode::CONFLICT,
                LidarError::RpmStabilizationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                LidarError::HardwareOpenFailed(_)
                | LidarError::HardwareFault(_)
                | LidarError::DeviceNotFound
                | LidarError::DeviceDisconnected(_)
                | LidarError::Serial(_)
                | LidarError::Protocol(_)
                | LidarError::Timeout(_)
                | LidarError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
                LidarError::MalformedSample(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Self::new(status_code, err.code(), err.to_string())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_status_mapping() {
            let cases = [
                (
                    LidarError::InvalidConfig("x".to_string()),
                    StatusCode::BAD_REQUEST,
                ),
                (
                    LidarError::AlreadyRunning("running".to_string()),
                    StatusCode::CONFLICT,
                ),
                (LidarError::ReconfigureWhileError, StatusCode::CONFLICT),
                (
                    LidarError::RpmStabilizationTimeout { timeout_ms: 5000 },
                    StatusCode::GATEWAY_TIMEOUT,
                ),
                (
                    LidarError::HardwareOpenFailed("x".to_string()),
                    StatusCode::SERVICE_UNAVAILABLE,
                ),
            ];

            for (err, expected) in cases {
                let code = err.code();
                let api_err = ApiError::from(err);
                assert_eq!(api_err.status_code, expected);
                assert_eq!(api_err.reason, code);
            }
        }
    }
}

/// Helper macros for common responses
#[macro_export]
macro_rules! api_ok {
    ($data:expr) => {
        Ok(axum::Json(lidar_core::api::ApiResponse::success($data)))
    };
}

#[macro_export]
macro_rules! api_fail {
    ($reason:expr, $message:expr) => {
        Err($crate::api::error::ApiError::bad_request($reason, $message))
    };
}
