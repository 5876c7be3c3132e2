//! Collection cycles: fetch every configured provider's feeds, normalize
//! them into one record each, and persist the results.
//!
//! Providers are independent. A cycle fetches them concurrently under a
//! semaphore, waits for all of them, and reports one outcome per provider;
//! a failing provider never hides the remaining ones.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info};

use crate::config::ProviderConfig;
use crate::fetch::HttpClient;
use crate::gbfs;
use crate::store::{SnapshotSink, StatsStore};

/// Outcome of one provider within a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderOutcome {
    pub provider: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cycle report. Every configured provider appears in `outcomes` exactly
/// once, successes and failures alike.
#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub outcomes: Vec<ProviderOutcome>,
}

pub struct Collector {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn StatsStore>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
    retention_days: u32,
    concurrency: usize,
}

impl Collector {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn StatsStore>,
        retention_days: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            http,
            store,
            snapshots: None,
            retention_days,
            concurrency: concurrency.max(1),
        }
    }

    /// Also archives every collected record through `sink`.
    pub fn with_snapshots(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(sink);
        self
    }

    /// Runs one collection cycle over `providers`.
    ///
    /// Per-provider failures land in the summary; only a panicked task aborts
    /// the cycle itself.
    pub async fn run(&self, providers: &[ProviderConfig]) -> Result<CollectionSummary> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(providers.len());

        for provider in providers {
            let sem = semaphore.clone();
            let http = self.http.clone();
            let store = self.store.clone();
            let snapshots = self.snapshots.clone();
            let retention_days = self.retention_days;
            let provider = provider.clone();

            let span = tracing::info_span!("collect_provider", provider = %provider.name);

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire().await.context("semaphore closed")?;
                    collect_one(
                        http.as_ref(),
                        store.as_ref(),
                        snapshots.as_deref(),
                        &provider,
                        retention_days,
                    )
                    .await
                }
                .instrument(span),
            ));
        }

        let mut outcomes = Vec::with_capacity(providers.len());
        for (provider, task) in providers.iter().zip(tasks) {
            let outcome = match task.await {
                Ok(Ok(())) => ProviderOutcome {
                    provider: provider.name.clone(),
                    ok: true,
                    error: None,
                },
                Ok(Err(e)) => {
                    let message = format!("{e:#}");
                    error!(provider = %provider.name, error = %message, "Provider collection failed");
                    ProviderOutcome {
                        provider: provider.name.clone(),
                        ok: false,
                        error: Some(message),
                    }
                }
                Err(e) => return Err(e).context("collection task panicked"),
            };
            outcomes.push(outcome);
        }

        let success = outcomes.iter().filter(|o| o.ok).count();
        let summary = CollectionSummary {
            total: outcomes.len(),
            success,
            failed: outcomes.len() - success,
            outcomes,
        };

        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            "Collection cycle finished"
        );
        Ok(summary)
    }
}

/// Fetches, normalizes, and persists a single provider.
async fn collect_one(
    http: &dyn HttpClient,
    store: &dyn StatsStore,
    snapshots: Option<&dyn SnapshotSink>,
    provider: &ProviderConfig,
    retention_days: u32,
) -> Result<()> {
    let stats = gbfs::fetch_provider_stats(http, provider, retention_days).await?;

    store
        .put(&stats)
        .await
        .with_context(|| format!("cannot persist record for '{}'", provider.name))?;

    if let Some(sink) = snapshots {
        sink.put_historical(&stats)
            .await
            .with_context(|| format!("cannot archive snapshot for '{}'", provider.name))?;
        sink.put_latest(&stats)
            .await
            .with_context(|| format!("cannot refresh latest snapshot for '{}'", provider.name))?;
    }

    info!(
        stations = stats.total_stations,
        active = stats.active_stations,
        bikes = stats.total_bikes_available,
        "Provider collected"
    );
    Ok(())
}
