//! Generation provider client
//!
//! Thin client for a Replicate-style predictions API. A job is created with
//! the webhook target pointing back at this process; everything after that
//! arrives through the callback ingress, never by polling. Only the `id`
//! field of the provider response is modeled.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

const DEFAULT_API_URL: &str = "https://api.replicate.com/v1/predictions";

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    version: &'a str,
    input: &'a Value,
    webhook: &'a str,
    webhook_events_filter: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    id: String,
}

/// Client for submitting generation jobs.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    api_url: String,
    api_token: String,
    webhook_url: String,
}

impl ProviderClient {
    pub fn new(api_token: &str, webhook_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            api_token: api_token.to_string(),
            webhook_url: webhook_url.to_string(),
        }
    }

    /// Override the API endpoint, used by tests against a local server.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Create a remote job. The input block carries the originating chat id
    /// and caption so a callback can be correlated even if the local record
    /// goes missing. Returns the provider-assigned job id.
    pub async fn create_job(&self, version: &str, input: &Value) -> Result<String> {
        let request = CreateJobRequest {
            version,
            input,
            webhook: &self.webhook_url,
            webhook_events_filter: &["start", "logs", "completed"],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .context("Provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Provider returned {}: {}", status, body);
        }

        let created: CreateJobResponse = response
            .json()
            .await
            .context("Provider response missing job id")?;

        info!("Created job {} (version {})", created.id, version);
        Ok(created.id)
    }
}
