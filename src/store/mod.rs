//! Persistence seams for collected statistics.
//!
//! [`StatsStore`] covers the record table (writes, windowed reads, retention
//! key scans and batch deletes); [`ConnectionStore`] tracks push subscribers;
//! [`SnapshotSink`] archives raw per-cycle documents. Production backends live
//! in [`dynamo`] and [`s3`]; tests swap in in-memory implementations.

pub mod dynamo;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;

use crate::stats::{BikeStats, StatsKey};
use crate::ws::registry::ConnectionRecord;

pub use dynamo::{DynamoConnectionStore, DynamoStatsStore};
pub use s3::S3SnapshotSink;

/// One page of expired record keys plus the cursor for the next page, if any.
#[derive(Debug, Default)]
pub struct KeyPage {
    pub keys: Vec<StatsKey>,
    pub next: Option<StatsKey>,
}

/// Table of per-provider statistics records, keyed by provider and collection
/// timestamp and indexed by calendar date for windowed reads.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Persists one collected record.
    async fn put(&self, stats: &BikeStats) -> Result<()>;

    /// Returns the records of one date partition whose timestamps fall within
    /// `start..=end`, optionally restricted to a single provider.
    async fn query_date(
        &self,
        date: &str,
        start: i64,
        end: i64,
        provider: Option<&str>,
    ) -> Result<Vec<BikeStats>>;

    /// Returns the most recent record for `provider`, if any exist.
    async fn latest(&self, provider: &str) -> Result<Option<BikeStats>>;

    /// Returns one page of keys for `provider` records older than `cutoff`,
    /// resuming after the `after` cursor when set.
    async fn expired_keys(
        &self,
        provider: &str,
        cutoff: i64,
        after: Option<StatsKey>,
    ) -> Result<KeyPage>;

    /// Deletes up to one batch of records, returning the keys the backend
    /// reported as unprocessed.
    async fn delete_batch(&self, keys: &[StatsKey]) -> Result<Vec<StatsKey>>;
}

/// Registry of push subscribers.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Registers a connection, overwriting any record with the same id.
    async fn put(&self, record: &ConnectionRecord) -> Result<()>;

    /// Removes a connection. Unknown ids are not an error.
    async fn delete(&self, connection_id: &str) -> Result<()>;
}

/// Archive for collection snapshots, written alongside the record table.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Archives one record under the time-partitioned historical prefix.
    async fn put_historical(&self, record: &BikeStats) -> Result<()>;

    /// Refreshes the provider's fixed latest-snapshot object.
    async fn put_latest(&self, record: &BikeStats) -> Result<()>;
}
