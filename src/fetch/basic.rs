use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::client::HttpClient;

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }

    /// Client with a total request timeout, so a stalled provider surfaces
    /// as an ordinary per-provider failure instead of hanging the cycle.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .0
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        // GBFS endpoints serve plain JSON; anything non-2xx means the
        // provider is misbehaving.
        let resp = resp
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;

        resp.json()
            .await
            .with_context(|| format!("GET {url} returned a non-JSON body"))
    }
}
