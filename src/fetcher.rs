//! Cluster health fetcher using the Elasticsearch HTTP API.
//!
//! The fetcher issues a plain `GET /_cluster/health` against a single node
//! and decodes the body into an untyped [`HealthDocument`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use esmetrics::{HealthFetcher, HealthSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = HealthFetcher::builder()
//!         .url(HealthFetcher::cluster_health_url("localhost", 9200))
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let doc = fetcher.fetch().await?;
//!     println!("status: {}", doc["status"]);
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{with_root_cause, ConfigError, FetchError};
use crate::HealthDocument;

/// Default bound for connecting to the node and for the whole request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can produce a cluster health document on demand.
#[async_trait]
pub trait HealthSource: Send + Sync + Debug {
    /// Fetch one document. No retries are attempted.
    async fn fetch(&self) -> Result<HealthDocument, FetchError>;

    /// Human-readable description of where documents come from.
    fn endpoint(&self) -> &str;
}

/// HTTP fetcher for the Elasticsearch cluster health endpoint.
#[derive(Debug, Clone)]
pub struct HealthFetcher {
    client: Client,
    url: String,
}

impl HealthFetcher {
    /// Create a new builder for configuring the fetcher.
    pub fn builder() -> HealthFetcherBuilder {
        HealthFetcherBuilder::default()
    }

    /// Format the cluster health URL for a node.
    pub fn cluster_health_url(host: &str, port: u16) -> String {
        format!("http://{}:{}/_cluster/health", host, port)
    }

    /// The URL this fetcher queries.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthSource for HealthFetcher {
    async fn fetch(&self) -> Result<HealthDocument, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        // Dropping an unread response releases its connection.
        if response.status() != StatusCode::OK {
            return Err(FetchError::BadStatus {
                code: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::ReadFailed {
                detail: with_root_cause(&e),
            })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::ParseFailed {
            detail: e.to_string(),
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Builder for HealthFetcher.
#[derive(Debug, Default)]
pub struct HealthFetcherBuilder {
    url: Option<String>,
    timeout: Option<Duration>,
}

impl HealthFetcherBuilder {
    /// Set the full endpoint URL (e.g., "http://localhost:9200/_cluster/health").
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the connect and request timeout (default: 5 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HealthFetcher, ConfigError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(HealthFetcher {
            client,
            url: self
                .url
                .unwrap_or_else(|| HealthFetcher::cluster_health_url("localhost", 9200)),
        })
    }
}
