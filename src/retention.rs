//! Retention sweeps: delete records older than the configured window.
//!
//! The sweep walks each provider's expired keys page by page and deletes
//! them in backend-sized batches. Keys a batch delete reports as unprocessed
//! are retried with a linearly growing delay. Providers are swept
//! independently; a failing provider is reported only after every other
//! provider has been attempted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ProviderConfig;
use crate::stats::StatsKey;
use crate::store::StatsStore;

/// Batch delete ceiling imposed by the record table backend.
const DELETE_BATCH_SIZE: usize = 25;

/// Total delete attempts per batch, the first one included.
const MAX_BATCH_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Sweep report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub message: String,
    pub providers_processed: Vec<String>,
}

pub struct RetentionSweeper {
    store: Arc<dyn StatsStore>,
    retention_days: u32,
    base_delay: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn StatsStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Overrides the retry delay unit. The delay before retry `n` is
    /// `n * base_delay`.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sweeps every provider, then fails if any of them could not be fully
    /// cleaned, naming the providers concerned.
    pub async fn run(&self, providers: &[ProviderConfig]) -> Result<SweepSummary> {
        let cutoff = Utc::now().timestamp() - i64::from(self.retention_days) * 86_400;
        info!(
            retention_days = self.retention_days,
            cutoff, "Starting retention sweep"
        );

        let mut processed = Vec::new();
        let mut failures = Vec::new();

        for provider in providers {
            match self.sweep_provider(&provider.name, cutoff).await {
                Ok(deleted) => {
                    info!(provider = %provider.name, deleted, "Provider sweep finished");
                    processed.push(provider.name.clone());
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(provider = %provider.name, error = %message, "Provider sweep failed");
                    failures.push(provider.name.clone());
                }
            }
        }

        if !failures.is_empty() {
            bail!(
                "retention sweep failed for providers: {}",
                failures.join(", ")
            );
        }

        Ok(SweepSummary {
            message: "Data cleanup completed successfully".to_string(),
            providers_processed: processed,
        })
    }

    /// Deletes all of one provider's records older than `cutoff`, paging
    /// through the key scan. Returns the number of keys deleted.
    async fn sweep_provider(&self, provider: &str, cutoff: i64) -> Result<usize> {
        let mut deleted = 0;
        let mut cursor = None;

        loop {
            let page = self.store.expired_keys(provider, cutoff, cursor).await?;

            for batch in page.keys.chunks(DELETE_BATCH_SIZE) {
                self.delete_with_retry(batch).await?;
                deleted += batch.len();
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(deleted)
    }

    /// Deletes one batch, re-submitting any unprocessed remainder until it
    /// drains or the attempts are exhausted.
    async fn delete_with_retry(&self, keys: &[StatsKey]) -> Result<()> {
        let mut pending = keys.to_vec();

        for attempt in 1..=MAX_BATCH_ATTEMPTS {
            pending = self.store.delete_batch(&pending).await?;
            if pending.is_empty() {
                return Ok(());
            }

            if attempt < MAX_BATCH_ATTEMPTS {
                warn!(
                    remaining = pending.len(),
                    attempt, "Batch delete left unprocessed keys, retrying"
                );
                tokio::time::sleep(self.base_delay * attempt).await;
            }
        }

        bail!(
            "{} keys still unprocessed after {MAX_BATCH_ATTEMPTS} delete attempts",
            pending.len()
        )
    }
}
