//! Fetches a URL from its origin server on a cache miss. Wrapped by
//! `dht_cache::SingleFlight` so at most one fetch per URL is in flight per
//! node at a time (§4.7).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum OriginError {
    #[error("origin request failed: {0}")]
    Request(String),

    #[error("origin returned status {0}")]
    Status(u16),
}

pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub struct OriginFetcher {
    client: reqwest::Client,
}

impl OriginFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedObject, OriginError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OriginError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OriginError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| OriginError::Request(e.to_string()))?;

        Ok(FetchedObject {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
