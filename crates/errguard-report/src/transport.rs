//! HTTP transport adapter
//!
//! Implements [`ITransport`] over a shared `reqwest::Client` with a
//! per-request timeout. Non-2xx responses are returned, not raised; only
//! connection-level failures become errors.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde_json::Value;

use errguard_core::ports::{ITransport, TransportResponse};

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ITransport for HttpTransport {
    async fn post_json(&self, endpoint: &str, body: &Value) -> anyhow::Result<TransportResponse> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).ok();
        tracing::debug!(endpoint, status, "Transport request completed");
        Ok(TransportResponse::new(status, body))
    }
}
