//! S3 snapshot archive.
//!
//! Every collected record is archived twice: once under an hour-partitioned
//! historical prefix, and once at a fixed per-provider key that always holds
//! the newest snapshot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::Serialize;

use super::SnapshotSink;
use crate::stats::BikeStats;

pub struct S3SnapshotSink {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3SnapshotSink {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Serializes a value to JSON and uploads it with `application/json`
    /// content type.
    async fn write_json(&self, key: &str, value: &impl Serialize) -> Result<()> {
        let body = serde_json::to_vec(value)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .content_type("application/json")
            .send()
            .await
            .with_context(|| format!("cannot write s3://{}/{key}", self.bucket))?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotSink for S3SnapshotSink {
    async fn put_historical(&self, record: &BikeStats) -> Result<()> {
        let key = historical_key(&record.provider, record.timestamp)?;
        self.write_json(&key, record).await
    }

    async fn put_latest(&self, record: &BikeStats) -> Result<()> {
        let key = format!("latest/{}.json", record.provider);
        self.write_json(&key, record).await
    }
}

/// Hive-style archive key, partitioned down to the collection hour.
fn historical_key(provider: &str, timestamp: i64) -> Result<String> {
    let when = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .with_context(|| format!("record timestamp {timestamp} is out of range"))?;

    Ok(format!(
        "historical/year={}/month={:02}/day={:02}/hour={:02}/{provider}/{timestamp}.json",
        when.year(),
        when.month(),
        when.day(),
        when.hour(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_key_partitions_by_hour() {
        // 2024-01-15T09:30:00Z
        let key = historical_key("citybike", 1_705_311_000).unwrap();
        assert_eq!(
            key,
            "historical/year=2024/month=01/day=15/hour=09/citybike/1705311000.json"
        );
    }

    #[test]
    fn test_historical_key_rejects_out_of_range_timestamp() {
        assert!(historical_key("citybike", i64::MAX).is_err());
    }
}
