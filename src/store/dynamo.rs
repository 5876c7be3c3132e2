//! DynamoDB-backed record and connection tables.
//!
//! The stats table is keyed by `provider` (partition) and `timestamp` (sort),
//! with a `date`/`timestamp` global secondary index for windowed reads.
//! `date` and `timestamp` are reserved words, so every expression goes
//! through attribute-name placeholders.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};

use super::{ConnectionStore, KeyPage, StatsStore};
use crate::stats::{BikeStats, StatsKey};
use crate::ws::registry::ConnectionRecord;

/// Index serving date-partitioned window queries.
const GSI_DATE_TIMESTAMP: &str = "date-timestamp-index";

/// Page size for retention key scans.
const EXPIRED_PAGE_LIMIT: i32 = 500;

pub struct DynamoStatsStore {
    client: Client,
    table: String,
}

impl DynamoStatsStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl StatsStore for DynamoStatsStore {
    async fn put(&self, stats: &BikeStats) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(stats)))
            .send()
            .await
            .with_context(|| {
                format!(
                    "cannot write record for '{}' to table '{}'",
                    stats.provider, self.table
                )
            })?;
        Ok(())
    }

    async fn query_date(
        &self,
        date: &str,
        start: i64,
        end: i64,
        provider: Option<&str>,
    ) -> Result<Vec<BikeStats>> {
        let mut records = Vec::new();
        let mut cursor = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(GSI_DATE_TIMESTAMP)
                .key_condition_expression("#d = :date AND #ts BETWEEN :start AND :end")
                .expression_attribute_names("#d", "date")
                .expression_attribute_names("#ts", "timestamp")
                .expression_attribute_values(":date", AttributeValue::S(date.to_string()))
                .expression_attribute_values(":start", AttributeValue::N(start.to_string()))
                .expression_attribute_values(":end", AttributeValue::N(end.to_string()))
                .set_exclusive_start_key(cursor);

            if let Some(provider) = provider {
                request = request
                    .filter_expression("#p = :provider")
                    .expression_attribute_names("#p", "provider")
                    .expression_attribute_values(
                        ":provider",
                        AttributeValue::S(provider.to_string()),
                    );
            }

            let output = request.send().await.with_context(|| {
                format!("window query on '{}' for date {date} failed", self.table)
            })?;

            for item in output.items() {
                records.push(from_item(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) => cursor = Some(key.clone()),
                None => break,
            }
        }

        Ok(records)
    }

    async fn latest(&self, provider: &str) -> Result<Option<BikeStats>> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#p = :provider")
            .expression_attribute_names("#p", "provider")
            .expression_attribute_values(":provider", AttributeValue::S(provider.to_string()))
            .scan_index_forward(false)
            .limit(1)
            .send()
            .await
            .with_context(|| format!("latest-record query for '{provider}' failed"))?;

        output.items().first().map(from_item).transpose()
    }

    async fn expired_keys(
        &self,
        provider: &str,
        cutoff: i64,
        after: Option<StatsKey>,
    ) -> Result<KeyPage> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#p = :provider AND #ts < :cutoff")
            .expression_attribute_names("#p", "provider")
            .expression_attribute_names("#ts", "timestamp")
            .expression_attribute_values(":provider", AttributeValue::S(provider.to_string()))
            .expression_attribute_values(":cutoff", AttributeValue::N(cutoff.to_string()))
            .projection_expression("#p, #ts")
            .limit(EXPIRED_PAGE_LIMIT)
            .set_exclusive_start_key(after.as_ref().map(key_item))
            .send()
            .await
            .with_context(|| format!("expired-key query for '{provider}' failed"))?;

        let keys = output
            .items()
            .iter()
            .map(key_from_item)
            .collect::<Result<Vec<_>>>()?;
        let next = output.last_evaluated_key().map(key_from_item).transpose()?;

        Ok(KeyPage { keys, next })
    }

    async fn delete_batch(&self, keys: &[StatsKey]) -> Result<Vec<StatsKey>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut requests = Vec::with_capacity(keys.len());
        for key in keys {
            let delete = DeleteRequest::builder()
                .set_key(Some(key_item(key)))
                .build()
                .context("delete request is missing its key")?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .with_context(|| format!("batch delete on '{}' failed", self.table))?;

        let mut unprocessed = Vec::new();
        if let Some(remaining) = output.unprocessed_items() {
            for request in remaining.get(&self.table).into_iter().flatten() {
                if let Some(delete) = request.delete_request() {
                    unprocessed.push(key_from_item(delete.key())?);
                }
            }
        }

        Ok(unprocessed)
    }
}

pub struct DynamoConnectionStore {
    client: Client,
    table: String,
}

impl DynamoConnectionStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ConnectionStore for DynamoConnectionStore {
    async fn put(&self, record: &ConnectionRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item(
                "connection_id",
                AttributeValue::S(record.connection_id.clone()),
            )
            .item(
                "timestamp",
                AttributeValue::N(record.timestamp.to_string()),
            )
            .send()
            .await
            .with_context(|| format!("cannot register connection '{}'", record.connection_id))?;
        Ok(())
    }

    async fn delete(&self, connection_id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("connection_id", AttributeValue::S(connection_id.to_string()))
            .send()
            .await
            .with_context(|| format!("cannot remove connection '{connection_id}'"))?;
        Ok(())
    }
}

fn to_item(stats: &BikeStats) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "provider".to_string(),
            AttributeValue::S(stats.provider.clone()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::N(stats.timestamp.to_string()),
        ),
        ("date".to_string(), AttributeValue::S(stats.date.clone())),
        (
            "total_stations".to_string(),
            AttributeValue::N(stats.total_stations.to_string()),
        ),
        (
            "total_capacity".to_string(),
            AttributeValue::N(stats.total_capacity.to_string()),
        ),
        (
            "total_bikes_available".to_string(),
            AttributeValue::N(stats.total_bikes_available.to_string()),
        ),
        (
            "total_docks_available".to_string(),
            AttributeValue::N(stats.total_docks_available.to_string()),
        ),
        (
            "active_stations".to_string(),
            AttributeValue::N(stats.active_stations.to_string()),
        ),
        (
            "expiry_time".to_string(),
            AttributeValue::N(stats.expiry_time.to_string()),
        ),
    ])
}

fn from_item(item: &HashMap<String, AttributeValue>) -> Result<BikeStats> {
    Ok(BikeStats {
        provider: string_attr(item, "provider")?,
        timestamp: number_attr(item, "timestamp")?,
        date: string_attr(item, "date")?,
        total_stations: number_attr(item, "total_stations")?,
        total_capacity: number_attr(item, "total_capacity")?,
        total_bikes_available: number_attr(item, "total_bikes_available")?,
        total_docks_available: number_attr(item, "total_docks_available")?,
        active_stations: number_attr(item, "active_stations")?,
        expiry_time: number_attr(item, "expiry_time")?,
    })
}

fn key_item(key: &StatsKey) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "provider".to_string(),
            AttributeValue::S(key.provider.clone()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::N(key.timestamp.to_string()),
        ),
    ])
}

fn key_from_item(item: &HashMap<String, AttributeValue>) -> Result<StatsKey> {
    Ok(StatsKey {
        provider: string_attr(item, "provider")?,
        timestamp: number_attr(item, "timestamp")?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<String> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .with_context(|| format!("item is missing string attribute '{name}'"))
}

fn number_attr<T>(item: &HashMap<String, AttributeValue>, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = item
        .get(name)
        .and_then(|value| value.as_n().ok())
        .with_context(|| format!("item is missing numeric attribute '{name}'"))?;
    raw.parse()
        .with_context(|| format!("attribute '{name}' holds non-numeric value '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stats() -> BikeStats {
        BikeStats {
            provider: "citybike".to_string(),
            timestamp: 1_705_311_000,
            date: "2024-01-15".to_string(),
            total_stations: 42,
            total_capacity: 380,
            total_bikes_available: 117,
            total_docks_available: 201,
            active_stations: 40,
            expiry_time: 1_707_903_000,
        }
    }

    #[test]
    fn test_item_round_trip() {
        let stats = sample_stats();
        let restored = from_item(&to_item(&stats)).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn test_key_round_trip() {
        let key = sample_stats().key();
        let restored = key_from_item(&key_item(&key)).unwrap();
        assert_eq!(restored, key);
    }

    #[test]
    fn test_from_item_reports_missing_attribute() {
        let mut item = to_item(&sample_stats());
        item.remove("total_capacity");

        let err = from_item(&item).unwrap_err();
        assert!(err.to_string().contains("total_capacity"));
    }

    #[test]
    fn test_from_item_rejects_wrong_attribute_type() {
        let mut item = to_item(&sample_stats());
        item.insert(
            "timestamp".to_string(),
            AttributeValue::S("not-a-number".to_string()),
        );

        assert!(from_item(&item).is_err());
    }
}
