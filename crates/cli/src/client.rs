//! API client for communicating with the crash-dump daemon

use anyhow::{Context, Result};
use crashdump_lib::{CollectionSummary, StoredLog};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the crash-dump daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        Ok(response)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request returning the raw body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self.send(self.client.get(self.url(path)?)).await?;
        response.text().await.context("Failed to read response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .send(self.client.post(self.url(path)?).json(body))
            .await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.delete(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn trigger(&self, trigger_type: &str) -> Result<TriggerResponse> {
        let request = TriggerRequest {
            trigger_type: trigger_type.to_string(),
        };
        self.post("crashdump", &request).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("crashdump/status").await
    }

    pub async fn list_logs(&self) -> Result<Vec<StoredLog>> {
        self.get("crashdump/logs").await
    }

    pub async fn read_log(&self, name: &str) -> Result<String> {
        self.get_text(&format!("crashdump/logs/{}", name)).await
    }

    pub async fn delete_logs(&self) -> Result<DeleteResponse> {
        self.delete("crashdump/logs").await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub trigger_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub trigger_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub busy: bool,
    pub last: Option<CollectionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}
