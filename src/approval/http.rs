//! HTTP client for the external approval service
//!
//! The service exposes a small REST surface:
//! - `GET  /api/pending-actions` lists unresolved actions
//! - `POST /api/pending-actions/{id}/approve` executes and resolves one
//! - `POST /api/pending-actions/{id}/deny` resolves one without executing
//!
//! A 404 on approve/deny means the action was already resolved through
//! another front-end; the service remains authoritative, so that maps to
//! success with no payload rather than an error.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::ApprovalClient;

pub struct HttpApprovalClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PendingListResponse {
    pending: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ApproveResponse {
    #[serde(default)]
    result: serde_json::Value,
}

impl HttpApprovalClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn action_url(&self, request_id: &str, verb: &str) -> String {
        format!("{}/api/pending-actions/{request_id}/{verb}", self.base_url)
    }
}

#[async_trait]
impl ApprovalClient for HttpApprovalClient {
    async fn approve(&self, request_id: &str) -> Result<serde_json::Value> {
        let url = self.action_url(request_id, "approve");
        debug!("Approving pending action via {url}");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("sending approve request")?;

        match response.status() {
            status if status.is_success() => {
                let body: ApproveResponse =
                    response.json().await.context("parsing approve response")?;
                Ok(body.result)
            }
            // Resolved elsewhere already; treat as success without a result.
            StatusCode::NOT_FOUND => Ok(serde_json::Value::Null),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("approval service returned {status}: {body}"))
            }
        }
    }

    async fn deny(&self, request_id: &str) -> Result<()> {
        let url = self.action_url(request_id, "deny");
        debug!("Denying pending action via {url}");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("sending deny request")?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("approval service returned {status}: {body}"))
            }
        }
    }

    async fn pending_count(&self) -> Result<usize> {
        let url = format!("{}/api/pending-actions", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("querying pending actions")?
            .error_for_status()
            .context("approval service rejected pending-actions query")?;
        let body: PendingListResponse = response
            .json()
            .await
            .context("parsing pending-actions response")?;
        Ok(body.pending.len())
    }
}
