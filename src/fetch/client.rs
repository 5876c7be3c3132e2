use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Seam between feed logic and the HTTP layer.
///
/// Production code goes through [`super::BasicClient`]; tests substitute
/// canned documents per URL without touching the network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetches `url` and decodes the response body as JSON.
    async fn get_json(&self, url: &str) -> Result<Value>;
}
