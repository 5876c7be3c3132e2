use async_trait::async_trait;
use thiserror::Error;

/// Delivery failure classes.
#[derive(Debug, Error)]
pub enum PushError {
    /// The connection has closed on the remote side; its registry record is
    /// stale and should be dropped.
    #[error("connection is gone")]
    Gone,
    #[error("push delivery failed: {0}")]
    Service(String),
}

/// Sends one payload to one live connection.
///
/// Production delivery goes through [`super::GatewayPush`]; tests record
/// payloads in memory instead.
#[async_trait]
pub trait ConnectionPush: Send + Sync {
    async fn send(&self, connection_id: &str, payload: &[u8]) -> Result<(), PushError>;
}
