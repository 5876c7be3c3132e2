//! Feed normalization: one provider's heterogeneous GBFS documents in, one
//! canonical [`BikeStats`] record out.
//!
//! Every failure here is scoped to the provider being normalized; the
//! collector treats them as per-provider outcomes, never as fatal errors.

pub mod discovery;
pub mod station;

pub use discovery::FeedRef;
pub use station::{StationInformation, StationStatus};

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::fetch::HttpClient;
use crate::stats::BikeStats;

pub const STATION_INFORMATION: &str = "station_information";
pub const STATION_STATUS: &str = "station_status";

/// Why a provider's feeds could not be turned into a record.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network-level failure, non-2xx status, or a non-JSON body.
    #[error("feed fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    /// The document parsed as JSON but not as the expected feed shape.
    #[error("feed schema mismatch: {0}")]
    Schema(String),

    /// None of the known feed-list locations held a non-empty list.
    #[error("discovery document has no feed list under data.en.feeds, data.feeds or data.de.feeds")]
    MissingFeedList,

    /// The feed list lacks one of the two required sub-feeds.
    #[error("discovery document is missing the required '{0}' feed")]
    MissingRequiredFeed(&'static str),
}

/// Fetches and normalizes one provider: discovery document, then both
/// station sub-feeds (concurrently), then the station join.
///
/// The record's `timestamp` is the collection time captured on entry, not
/// the feed's own `last_updated`.
pub async fn fetch_provider_stats<C: HttpClient + ?Sized>(
    http: &C,
    provider: &ProviderConfig,
    retention_days: u32,
) -> Result<BikeStats, FeedError> {
    let collected_at = Utc::now();

    let root = http
        .get_json(&provider.url)
        .await
        .map_err(FeedError::Fetch)?;
    let feeds = discovery::locate_feeds(&root)?;

    let information_url = discovery::required_feed(&feeds, STATION_INFORMATION)?;
    let status_url = discovery::required_feed(&feeds, STATION_STATUS)?;

    // The two sub-feeds are independent; fetch them together.
    let (information_doc, status_doc) =
        tokio::join!(http.get_json(information_url), http.get_json(status_url));

    let information = station::parse_information(&information_doc.map_err(FeedError::Fetch)?)?;
    let statuses = station::parse_status(&status_doc.map_err(FeedError::Fetch)?)?;

    debug!(
        provider = %provider.name,
        stations = information.len(),
        statuses = statuses.len(),
        "Station feeds fetched"
    );

    Ok(BikeStats::from_station_feeds(
        &provider.name,
        &information,
        &statuses,
        collected_at,
        retention_days,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct CannedHttp {
        responses: HashMap<String, Value>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn get_json(&self, url: &str) -> anyhow::Result<Value> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no route to host: {url}"))
        }
    }

    fn provider() -> ProviderConfig {
        ProviderConfig {
            name: "testbike".to_string(),
            url: "https://gbfs.test/gbfs.json".to_string(),
        }
    }

    fn full_feed_set() -> HashMap<String, Value> {
        HashMap::from([
            (
                "https://gbfs.test/gbfs.json".to_string(),
                json!({"data": {"en": {"feeds": [
                    {"name": "station_information", "url": "https://gbfs.test/info.json"},
                    {"name": "station_status", "url": "https://gbfs.test/status.json"}
                ]}}}),
            ),
            (
                "https://gbfs.test/info.json".to_string(),
                json!({"data": {"stations": [
                    {"station_id": "a", "capacity": 10},
                    {"station_id": "b", "capacity": 8}
                ]}}),
            ),
            (
                "https://gbfs.test/status.json".to_string(),
                json!({"data": {"stations": [
                    {"station_id": "a", "num_bikes_available": 3, "num_docks_available": 5,
                     "is_installed": true, "is_renting": true, "is_returning": true},
                    {"station_id": "b", "num_bikes_available": 2, "num_docks_available": 6,
                     "is_installed": true, "is_renting": false, "is_returning": true}
                ]}}),
            ),
        ])
    }

    #[tokio::test]
    async fn test_normalizes_full_provider() {
        let http = CannedHttp {
            responses: full_feed_set(),
        };

        let stats = fetch_provider_stats(&http, &provider(), 30).await.unwrap();

        assert_eq!(stats.provider, "testbike");
        assert_eq!(stats.total_stations, 2);
        assert_eq!(stats.total_capacity, 18);
        assert_eq!(stats.active_stations, 1);
        assert_eq!(stats.total_bikes_available, 3);
        assert_eq!(stats.total_docks_available, 5);
        assert_eq!(stats.expiry_time, stats.timestamp + 30 * 86_400);
    }

    #[tokio::test]
    async fn test_missing_status_feed_is_typed() {
        let mut responses = full_feed_set();
        responses.insert(
            "https://gbfs.test/gbfs.json".to_string(),
            json!({"data": {"en": {"feeds": [
                {"name": "station_information", "url": "https://gbfs.test/info.json"}
            ]}}}),
        );
        let http = CannedHttp { responses };

        let err = fetch_provider_stats(&http, &provider(), 30)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FeedError::MissingRequiredFeed(STATION_STATUS)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_discovery_is_fetch_error() {
        let http = CannedHttp {
            responses: HashMap::new(),
        };

        let err = fetch_provider_stats(&http, &provider(), 30)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Fetch(_)));
    }
}
