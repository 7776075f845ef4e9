//! Health probing for started sidecar containers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::sidecar::error::{HealthTimeoutError, ProbeError};
use crate::sidecar::status::{ContainerRuntimeStatus, ContainerState};

/// Request timeout of a single HTTP probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single liveness check against a container endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(true)` when the endpoint answered in the healthy class,
    /// `Ok(false)` when it answered with anything else.
    async fn probe(&self, url: &str) -> Result<bool, ProbeError>;
}

/// Successful responses count, and so does 405: the endpoint exists but
/// rejects a plain GET.
pub fn is_healthy_response(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED
}

/// HTTP GET probe.
pub struct HttpHealthProbe {
    /// Reusable HTTP client for health checks (avoids per-request allocation).
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            // Endpoints are always on the loopback interface.
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str) -> Result<bool, ProbeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError(e.to_string()))?;
        Ok(is_healthy_response(response.status()))
    }
}

/// Poll `status`'s endpoint until it is healthy or `timeout` elapses.
///
/// Only `Running` containers are probed; anything else is returned as is.
/// Probe errors count as "not yet healthy". On timeout the container is left
/// running and marked `Unhealthy`.
pub async fn wait_healthy(
    probe: &dyn HealthProbe,
    mut status: ContainerRuntimeStatus,
    timeout: Duration,
    interval: Duration,
) -> ContainerRuntimeStatus {
    if status.state != ContainerState::Running {
        return status;
    }

    let name = status.container_name();
    let url = status.url();
    let deadline = Instant::now() + timeout;

    tracing::info!(container = %name, "Waiting for {} to become healthy", url);

    loop {
        match probe.probe(&url).await {
            Ok(true) => {
                status.mark_healthy();
                tracing::info!(container = %name, "Container is healthy");
                return status;
            }
            Ok(false) => {
                tracing::debug!(container = %name, "Health endpoint not ready yet");
            }
            Err(e) => {
                tracing::debug!(container = %name, "Health check failed: {}", e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }

    let err = HealthTimeoutError { timeout };
    tracing::warn!(container = %name, "Container failed health check: {}", err);
    status.mark_unhealthy(err.to_string());
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::config::{ContainerSpec, SidecarKind, SidecarRequest};
    use crate::testing::ScriptedProbe;

    fn running(port: u16) -> ContainerRuntimeStatus {
        let spec = ContainerSpec::build(
            "acme",
            &SidecarRequest::new(SidecarKind::Grafana),
            "grafana/mcp-grafana:latest",
            SidecarKind::Grafana.default_ports(),
            port,
        );
        let mut status = ContainerRuntimeStatus::new(spec);
        status.mark_running("c1".to_string());
        status
    }

    #[test]
    fn test_healthy_response_class() {
        assert!(is_healthy_response(StatusCode::OK));
        assert!(is_healthy_response(StatusCode::NO_CONTENT));
        assert!(is_healthy_response(StatusCode::METHOD_NOT_ALLOWED));
        assert!(!is_healthy_response(StatusCode::NOT_FOUND));
        assert!(!is_healthy_response(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_boundary() {
        let probe = ScriptedProbe::never();
        let started = Instant::now();

        let status = wait_healthy(
            &probe,
            running(3100),
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await;

        let elapsed = started.elapsed();
        assert_eq!(status.state, ContainerState::Unhealthy);
        assert_eq!(status.error.as_deref(), Some("health check timed out after 5s"));
        assert!(elapsed >= Duration::from_secs(5), "gave up early: {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(6), "overran: {elapsed:?}");
        assert_eq!(probe.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_healthy_after_retries() {
        let probe = ScriptedProbe::healthy_after(3);

        let status = wait_healthy(
            &probe,
            running(3100),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(status.state, ContainerState::Healthy);
        assert!(status.healthy_at.is_some());
        assert!(status.error.is_none());
        assert_eq!(probe.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_until_success() {
        let probe = ScriptedProbe::always();
        probe.fail_url("http://127.0.0.1:3100/mcp", 2);

        let status = wait_healthy(
            &probe,
            running(3100),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(status.state, ContainerState::Healthy);
        assert!(status.error.is_none());
        assert_eq!(probe.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_overruns_by_at_most_one_attempt() {
        let latency = Duration::from_secs(2);
        let probe = ScriptedProbe::never().with_latency(latency);
        let started = Instant::now();

        let status = wait_healthy(
            &probe,
            running(3100),
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await;

        let elapsed = started.elapsed();
        assert_eq!(status.state, ContainerState::Unhealthy);
        assert!(elapsed >= Duration::from_secs(5), "gave up early: {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(5) + latency, "overran: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_non_running_status_is_not_probed() {
        let probe = ScriptedProbe::always();
        let mut status = running(3100);
        status.mark_error("pull failed");

        let status = wait_healthy(&probe, status, Duration::from_secs(1), Duration::from_millis(10)).await;

        assert_eq!(status.state, ContainerState::Error);
        assert_eq!(probe.attempts(), 0);
    }

    #[tokio::test]
    async fn test_http_probe_against_local_server() {
        use axum::Router;
        use axum::http::StatusCode as AxumStatus;
        use axum::routing::{get, post};

        let app = Router::new()
            .route("/mcp", post(|| async { "ok" }))
            .route("/sse", get(|| async { "data" }))
            .route("/down", get(|| async { AxumStatus::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let probe = HttpHealthProbe::new(Duration::from_secs(2));
        // GET on a POST-only route answers 405, which still counts.
        assert!(probe.probe(&format!("http://{addr}/mcp")).await.unwrap());
        assert!(probe.probe(&format!("http://{addr}/sse")).await.unwrap());
        assert!(!probe.probe(&format!("http://{addr}/down")).await.unwrap());
        assert!(!probe.probe(&format!("http://{addr}/missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpHealthProbe::new(Duration::from_secs(1));
        assert!(probe.probe(&format!("http://127.0.0.1:{port}/mcp")).await.is_err());
    }
}
