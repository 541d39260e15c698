use anyhow::{bail, Context, Result};
use std::{future::Future, time::Duration};

use super::models::{EventBatch, QueuedEvent, SessionLifecycle, SessionSummary, StatusReport};

/// The remote aggregator, as seen by the batcher and the session orchestrator.
pub trait TelemetryClient: Clone + Send + Sync + 'static {
    /// Delivers one batch; anything but HTTP 200 is a failure.
    fn post_batch(&self, events: &[QueuedEvent]) -> impl Future<Output = Result<()>> + Send;

    /// Seconds the remote side believes the current session has been running.
    fn fetch_session_elapsed(&self) -> impl Future<Output = Result<f64>> + Send;

    fn notify_lifecycle(&self, event: SessionLifecycle)
        -> impl Future<Output = Result<()>> + Send;

    fn save_session(&self, summary: &SessionSummary) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP client for the aggregator service.
#[derive(Clone)]
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl AggregatorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build aggregator HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl TelemetryClient for AggregatorClient {
    fn post_batch(&self, events: &[QueuedEvent]) -> impl Future<Output = Result<()>> + Send {
        let request = self
            .http
            .post(self.url("/api/events"))
            .json(&EventBatch { events });
        async move {
            let response = request.send().await.context("event batch request failed")?;
            let status = response.status();
            if status != reqwest::StatusCode::OK {
                bail!("aggregator rejected batch with {status}");
            }
            Ok(())
        }
    }

    fn fetch_session_elapsed(&self) -> impl Future<Output = Result<f64>> + Send {
        let request = self.http.get(self.url("/api/status"));
        async move {
            let response = request.send().await.context("status request failed")?;
            let status = response.status();
            if !status.is_success() {
                bail!("status request returned {status}");
            }
            let report: StatusReport = response
                .json()
                .await
                .context("status response has no usable session_seconds")?;
            report.elapsed_secs()
        }
    }

    fn notify_lifecycle(
        &self,
        event: SessionLifecycle,
    ) -> impl Future<Output = Result<()>> + Send {
        let request = self.http.post(self.url(event.path()));
        async move {
            let response = request.send().await.context("session lifecycle request failed")?;
            let status = response.status();
            if !status.is_success() {
                bail!("{} returned {status}", event.path());
            }
            Ok(())
        }
    }

    fn save_session(&self, summary: &SessionSummary) -> impl Future<Output = Result<()>> + Send {
        let request = self.http.post(self.url("/api/sessions")).json(summary);
        async move {
            let response = request.send().await.context("session save request failed")?;
            let status = response.status();
            if !status.is_success() {
                bail!("session save returned {status}");
            }
            Ok(())
        }
    }
}
