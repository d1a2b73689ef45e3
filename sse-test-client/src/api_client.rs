use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// A response kept whole, for checks on status, content type and body.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach the gateway")?;

        if !response.status().is_success() {
            anyhow::bail!("Health check failed: {}", response.status());
        }

        Ok(())
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let url = format!("{}/sse/publish", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("channel", channel), ("message", message)])
            .send()
            .await
            .context("Failed to publish message")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to publish message: {} - Response: {}", status, body);
        }

        Ok(())
    }

    pub async fn enqueue(&self, event: &str, data: &str) -> Result<u64> {
        let url = format!("{}/sse/queue", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "event": event, "data": data }))
            .send()
            .await
            .context("Failed to queue event")?;

        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to queue event: {} - Response: {}", status, body);
        }

        let result: Value = response.json().await?;
        result["data"]["queued"]
            .as_u64()
            .context("No queue length in response")
    }

    pub async fn sessions(&self) -> Result<Value> {
        let url = format!("{}/sessions", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get sessions")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get sessions: {}", response.status());
        }

        let result: Value = response.json().await?;
        Ok(result["data"].clone())
    }

    /// Poll the session summary until `channel` has at least one live stream.
    pub async fn wait_for_subscriber(&self, channel: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let sessions = self.sessions().await?;
            if sessions["channels"][channel].as_u64().unwrap_or(0) > 0 {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        anyhow::bail!("No subscriber appeared on channel {}", channel)
    }

    /// GET `path` with an optional `Accept` header, without interpreting the response.
    pub async fn get_raw(&self, path: &str, accept: Option<&str>) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.get(&url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }

        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
