//! API request handlers for the LiDAR daemon.
//!
//! # Handler Modules
//!
//! - [`info`] - System information and root endpoint
//! - [`control`] - Status and lifecycle control (start/stop/reset)
//! - [`config`] - Reading and replacing the hardware configuration
//! - [`scan`] - Latest completed scan
//! - [`stream`] - WebSocket scan stream
//!
//! All REST handlers accept `State<AppState>` and return
//! `Result<Json<ApiResponse<T>>, ApiError>`; manager errors convert into
//! `ApiError` with their reason code.

pub mod config;
pub mod control;
pub mod info;
pub mod scan;
pub mod stream;
