//! HTTP transport for the collector batch endpoint

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};

use super::events::{BatchPayload, LIBRARY_NAME, LIBRARY_VERSION};
use super::Transport;

/// Posts batches as JSON to the configured batch endpoint
///
/// No request timeout is applied: a hung request holds the tracker's
/// in-flight guard until the HTTP stack gives up.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    batch_url: String,
}

impl HttpTransport {
    /// Create a transport from tracker configuration
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let batch_url = config.batch_endpoint();
        reqwest::Url::parse(&batch_url)
            .map_err(|e| Error::Config(format!("invalid batch endpoint {}: {}", batch_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("{}/{}", LIBRARY_NAME, LIBRARY_VERSION))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            batch_url,
        })
    }

    /// Endpoint batches are posted to
    pub fn batch_url(&self) -> &str {
        &self.batch_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, batch: &BatchPayload) -> Result<()> {
        post_batch(&self.http_client, &self.batch_url, batch).await
    }

    fn send_beacon(&self, batch: BatchPayload) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime available, dropping unload batch");
            return false;
        };

        let client = self.http_client.clone();
        let url = self.batch_url.clone();
        runtime.spawn(async move {
            if let Err(e) = post_batch(&client, &url, &batch).await {
                tracing::debug!(error = %e, "Unload batch was not delivered");
            }
        });
        true
    }
}

async fn post_batch(client: &reqwest::Client, url: &str, batch: &BatchPayload) -> Result<()> {
    let response = client
        .post(url)
        .json(batch)
        .send()
        .await
        .map_err(|e| Error::Delivery(format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(Error::Delivery(format!(
        "API error ({}): {}",
        status, error_text
    )))
}
