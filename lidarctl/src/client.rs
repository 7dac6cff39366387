//! HTTP client for communicating with the LiDAR daemon.

use anyhow::{Context, Result};
use lidar_core::api::{ApiResponse, InfoResponse, StatusResponse};
use lidar_core::{LidarConfig, Scan};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Normalize a server URL by removing trailing slashes.
fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// HTTP client for the daemon's REST API.
///
/// Requests that fail to reach the server (connection refused, timeout) are
/// retried with a linearly growing delay. HTTP error responses are never
/// retried; their `reason` code is surfaced in the returned error.
///
/// # Examples
///
/// ```no_run
/// use lidarctl::client::LidarClient;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = LidarClient::with_config(
///     "http://localhost:8000".to_string(),
///     10,  // timeout in seconds
///     3,   // max retries
///     Duration::from_millis(500),  // initial retry delay
/// ).await?;
///
/// let status = client.get_status().await?;
/// println!("LiDAR is {}", status.state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LidarClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    server_info: InfoResponse,
}

impl LidarClient {
    /// Create a client and check the server is reachable.
    ///
    /// Server information is fetched once here and kept for
    /// [`server_info`](Self::server_info).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the server
    /// does not answer `GET /api/v0/info`.
    pub async fn with_config(
        server_url: String,
        timeout_secs: u64,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("lidarctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = normalize_url(&server_url);
        let server_info = fetch_info(&client, &base_url, max_retries, retry_delay)
            .await
            .context("Failed to fetch server information")?;

        Ok(Self {
            client,
            base_url,
            max_retries,
            retry_delay,
            server_info,
        })
    }

    /// Server information fetched when the client was created
    pub fn server_info(&self) -> &InfoResponse {
        &self.server_info
    }

    /// Retrieve fresh server information.
    pub async fn get_info(&self) -> Result<InfoResponse> {
        let url = format!("{}/api/v0/info", self.base_url);
        self.execute_with_retry("info", || self.client.get(&url).send())
            .await
    }

    /// Retrieve the manager status.
    pub async fn get_status(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/v0/status", self.base_url);
        self.execute_with_retry("status", || self.client.get(&url).send())
            .await
    }

    /// Start the device. Returns once it is running.
    pub async fn start(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/v0/start", self.base_url);
        self.execute_with_retry("start", || self.client.post(&url).send())
            .await
    }

    /// Stop the device.
    pub async fn stop(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/v0/stop", self.base_url);
        self.execute_with_retry("stop", || self.client.post(&url).send())
            .await
    }

    /// Clear a fault.
    pub async fn reset(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/v0/reset", self.base_url);
        self.execute_with_retry("reset", || self.client.post(&url).send())
            .await
    }

    /// Retrieve the active hardware configuration.
    pub async fn get_config(&self) -> Result<LidarConfig> {
        let url = format!("{}/api/v0/config", self.base_url);
        self.execute_with_retry("config", || self.client.get(&url).send())
            .await
    }

    /// Replace the hardware configuration. Returns the applied config.
    pub async fn set_config(&self, config: &LidarConfig) -> Result<LidarConfig> {
        let url = format!("{}/api/v0/config", self.base_url);
        self.execute_with_retry("config", || self.client.put(&url).json(config).send())
            .await
    }

    /// Retrieve the most recent completed scan.
    pub async fn latest_scan(&self) -> Result<Scan> {
        let url = format!("{}/api/v0/scan/latest", self.base_url);
        self.execute_with_retry("scan/latest", || self.client.get(&url).send())
            .await
    }

    async fn execute_with_retry<F, Fut, T>(&self, endpoint: &str, request_fn: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
        T: DeserializeOwned,
    {
        retry(endpoint, self.max_retries, self.retry_delay, request_fn).await
    }
}

async fn fetch_info(
    client: &Client,
    base_url: &str,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<InfoResponse> {
    let url = format!("{}/api/v0/info", base_url);
    retry("info", max_retries, retry_delay, || client.get(&url).send()).await
}

/// Execute a request, retrying connection-level failures.
///
/// The delay grows with each attempt (`delay * (attempt + 1)`).
async fn retry<F, Fut, T>(
    endpoint: &str,
    max_retries: u32,
    retry_delay: Duration,
    request_fn: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    T: DeserializeOwned,
{
    let mut attempt = 0;
    loop {
        match request_fn().await {
            Ok(response) => return handle_response(response, endpoint).await,
            Err(e) => {
                let should_retry = e.is_connect() || e.is_timeout() || e.is_request();
                if attempt < max_retries && should_retry {
                    tokio::time::sleep(retry_delay * (attempt + 1)).await;
                    attempt += 1;
                    continue;
                }
                return Err(anyhow::anyhow!(
                    "Failed to reach {} after {} attempts: {}",
                    endpoint,
                    attempt + 1,
                    e
                ));
            }
        }
    }
}

/// Unwrap the API envelope.
///
/// Error envelopes become `"<reason>: <message>"` so the reason code the
/// daemon reported is always visible to the user.
async fn handle_response<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {}", endpoint))?;

    match serde_json::from_str::<ApiResponse<T>>(&text) {
        Ok(ApiResponse::Success { data }) if status.is_success() => Ok(data),
        Ok(ApiResponse::Success { .. }) => Err(anyhow::anyhow!(
            "HTTP {} from {} with a success body",
            status,
            endpoint
        )),
        Ok(ApiResponse::Error { reason, error }) => {
            Err(anyhow::anyhow!("{}: {} (HTTP {})", reason, error, status.as_u16()))
        }
        Err(_) if !status.is_success() => Err(anyhow::anyhow!(describe_status(status, endpoint, &text))),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to parse JSON response from {}", endpoint))),
    }
}

fn describe_status(status: StatusCode, endpoint: &str, text: &str) -> String {
    match status {
        StatusCode::NOT_FOUND => format!("Endpoint {} not found", endpoint),
        StatusCode::BAD_REQUEST => format!("Bad request to {}: {}", endpoint, text),
        StatusCode::SERVICE_UNAVAILABLE => format!("Service unavailable at {}", endpoint),
        _ => format!("HTTP {} error at {}: {}", status, endpoint, text),
    }
}
