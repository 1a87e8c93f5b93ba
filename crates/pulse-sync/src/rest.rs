//! REST API client
//!
//! HTTP fallback and refresh surface. Writes go here when the socket is down;
//! `fetch_aggregate` backs the periodic reconciliation refresh.

use async_trait::async_trait;
use pulse_common::{SyncError, SyncResult};
use pulse_core::EventId;

use crate::protocol::{SubmitFeedback, UpdateAlert};
use crate::reconciler::AggregateSnapshot;

/// HTTP surface the sync layer falls back to
#[async_trait]
pub trait RestApi: Send + Sync + 'static {
    /// Submit feedback over HTTP
    async fn submit_feedback(&self, request: &SubmitFeedback) -> SyncResult<()>;

    /// Update an alert's status over HTTP
    async fn update_alert(&self, request: &UpdateAlert) -> SyncResult<()>;

    /// Fetch the full server-side aggregate for one event
    async fn fetch_aggregate(&self, event_id: &EventId) -> SyncResult<AggregateSnapshot>;
}

/// reqwest-backed implementation against the dashboard's HTTP API
pub struct HttpRestApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRestApi {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, "REST request rejected");
        Err(SyncError::Rest(if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        }))
    }
}

#[async_trait]
impl RestApi for HttpRestApi {
    async fn submit_feedback(&self, request: &SubmitFeedback) -> SyncResult<()> {
        let response = self
            .client
            .post(self.url("/feedback/submit"))
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::Rest(e.to_string()))?;

        Self::check(response).await?;
        tracing::debug!(source_id = %request.source_id, "Feedback submitted over REST");
        Ok(())
    }

    async fn update_alert(&self, request: &UpdateAlert) -> SyncResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/alerts/{}/status", request.alert_id)))
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::Rest(e.to_string()))?;

        Self::check(response).await?;
        tracing::debug!(alert_id = %request.alert_id, "Alert updated over REST");
        Ok(())
    }

    async fn fetch_aggregate(&self, event_id: &EventId) -> SyncResult<AggregateSnapshot> {
        let response = self
            .client
            .get(self.url(&format!("/events/{event_id}/aggregate")))
            .send()
            .await
            .map_err(|e| SyncError::Rest(e.to_string()))?;

        let snapshot = Self::check(response)
            .await?
            .json::<AggregateSnapshot>()
            .await
            .map_err(|e| SyncError::Rest(e.to_string()))?;

        Ok(snapshot)
    }
}
