//! Client for the downstream processor that works the queue.
//!
//! Submissions are gated on the processor's cluster health and followed by a
//! fire-and-forget "work available" ping. The ping's outcome never affects the
//! submission; it only shows up in the logs.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Outcome of the work-available ping, echoed in create-job responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Scheduled,
    Unscheduled,
    Error,
}

impl ProcessingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Unscheduled => "unscheduled",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the cluster health probe refused a submission.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Service is temporarily unavailable (cluster status code={0})")]
    Status(u16),
    #[error("Service may be overloaded")]
    Unhealthy,
    #[error("Service is temporarily unavailable (error={0})")]
    Transport(String),
}

#[derive(Debug, Deserialize)]
struct ClusterStatus {
    #[serde(default)]
    status: Option<String>,
}

/// HTTP client for one processor host.
#[derive(Debug, Clone)]
pub struct ProcessorClient {
    client: Client,
    host: String,
    probe_timeout: Duration,
    notify_timeout: Duration,
}

impl ProcessorClient {
    pub fn new(
        host: &str,
        probe_timeout: Duration,
        notify_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("octoqueue/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            probe_timeout,
            notify_timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `GET {host}/cluster/status` must answer 200 with `{"status": "healthy"}`.
    pub async fn check_health(&self) -> Result<(), ProbeError> {
        let url = format!("{}/cluster/status", self.host);
        info!(%url, "checking cluster status");

        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "failed to check cluster status");
                ProbeError::Transport(e.to_string())
            })?;

        if response.status() != StatusCode::OK {
            let code = response.status().as_u16();
            warn!(status = code, "cluster status check failed");
            return Err(ProbeError::Status(code));
        }

        let body: ClusterStatus = response.json().await.map_err(|e| {
            error!(%url, error = %e, "unreadable cluster status");
            ProbeError::Transport(e.to_string())
        })?;
        if body.status.as_deref() != Some("healthy") {
            warn!(status = ?body.status, "cluster reported unhealthy status");
            return Err(ProbeError::Unhealthy);
        }

        info!("cluster status check passed");
        Ok(())
    }

    /// `POST {host}/run-the-queue`, tagged with `request_id`.
    pub async fn notify(&self, request_id: &str) -> ProcessingStatus {
        let url = format!("{}/run-the-queue", self.host);
        info!(%request_id, %url, "pinging processor");

        let result = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(self.notify_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(%request_id, "processor ping accepted");
                ProcessingStatus::Scheduled
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                warn!(%request_id, status, response = %snippet, "processor ping rejected");
                ProcessingStatus::Unscheduled
            }
            Err(e) if e.is_timeout() => {
                error!(%request_id, error = %e, "processor ping timed out");
                ProcessingStatus::Error
            }
            Err(e) => {
                error!(%request_id, error = %e, "processor ping failed");
                ProcessingStatus::Error
            }
        }
    }

    /// Run [`notify`](Self::notify) on a detached task with a fresh request id.
    pub fn spawn_notify(&self) -> (String, JoinHandle<ProcessingStatus>) {
        let request_id = new_request_id();
        let client = self.clone();
        let id = request_id.clone();
        let handle = tokio::spawn(async move { client.notify(&id).await });
        (request_id, handle)
    }
}

/// Short request id for correlating the ping across services.
fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
