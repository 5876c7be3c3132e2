//! Subscriber registry bookkeeping.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::ConnectionStore;

/// One registered subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,

    /// Registration time in seconds since epoch.
    pub timestamp: i64,
}

pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Registers a connection. Registering an already known id refreshes its
    /// record rather than failing.
    pub async fn connect(&self, connection_id: &str) -> Result<()> {
        let record = ConnectionRecord {
            connection_id: connection_id.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        self.store.put(&record).await?;
        info!(connection_id, "Connection registered");
        Ok(())
    }

    /// Removes a connection. Unknown ids succeed, so disconnect notifications
    /// can be replayed.
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        self.store.delete(connection_id).await?;
        info!(connection_id, "Connection removed");
        Ok(())
    }
}
