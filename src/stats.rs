use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gbfs::station::{StationInformation, StationStatus};

/// One canonical statistics record: a single provider sampled at a single
/// collection time. Identity is `(provider, timestamp)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BikeStats {
    pub provider: String,

    /// Collection time in seconds since epoch, not the feed's own clock.
    pub timestamp: i64,

    /// `YYYY-MM-DD` of `timestamp` in UTC; partition key of the date index.
    pub date: String,

    pub total_stations: u32,
    pub total_capacity: u32,
    pub total_bikes_available: u32,
    pub total_docks_available: u32,
    pub active_stations: u32,

    /// When the record becomes eligible for passive expiry by the store.
    pub expiry_time: i64,
}

/// Identity of a stored record; also the unit of batched deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsKey {
    pub provider: String,
    pub timestamp: i64,
}

impl BikeStats {
    /// Joins the two station feeds into one record.
    ///
    /// `total_stations` counts every information entry. The remaining
    /// counters only see stations with a matching status entry: capacity for
    /// all of them, bikes/docks/active for the active ones.
    pub fn from_station_feeds(
        provider: &str,
        information: &[StationInformation],
        statuses: &[StationStatus],
        collected_at: DateTime<Utc>,
        retention_days: u32,
    ) -> Self {
        let by_id: HashMap<&str, &StationStatus> = statuses
            .iter()
            .map(|status| (status.station_id.as_str(), status))
            .collect();

        let timestamp = collected_at.timestamp();
        let mut stats = BikeStats {
            provider: provider.to_string(),
            timestamp,
            date: collected_at.format("%Y-%m-%d").to_string(),
            expiry_time: timestamp + i64::from(retention_days) * 86_400,
            total_stations: information.len() as u32,
            ..Default::default()
        };

        for station in information {
            let Some(status) = by_id.get(station.station_id.as_str()) else {
                // No status entry: the station only counts toward total_stations.
                continue;
            };

            stats.total_capacity += station.capacity;

            if status.is_active() {
                stats.active_stations += 1;
                stats.total_bikes_available += status.num_bikes_available;
                stats.total_docks_available += status.num_docks_available;
            }
        }

        stats
    }

    pub fn key(&self) -> StatsKey {
        StatsKey {
            provider: self.provider.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_one_active_one_inactive_station() {
        let information = vec![info("a", 10), info("b", 8)];
        let statuses = vec![
            status("a", 3, 5, true, true, true),
            status("b", 2, 6, true, false, true),
        ];

        let stats =
            BikeStats::from_station_feeds("citybike", &information, &statuses, sample_time(), 30);

        assert_eq!(stats.total_stations, 2);
        assert_eq!(stats.total_capacity, 18);
        assert_eq!(stats.active_stations, 1);
        assert_eq!(stats.total_bikes_available, 3);
        assert_eq!(stats.total_docks_available, 5);
        assert!(stats.active_stations <= stats.total_stations);
    }

    #[test]
    fn test_unmatched_station_counts_for_total_only() {
        let information = vec![info("a", 10), info("ghost", 99)];
        let statuses = vec![status("a", 1, 2, true, true, true)];

        let stats =
            BikeStats::from_station_feeds("citybike", &information, &statuses, sample_time(), 30);

        assert_eq!(stats.total_stations, 2);
        assert_eq!(stats.total_capacity, 10);
        assert_eq!(stats.active_stations, 1);
    }

    #[test]
    fn test_active_requires_all_three_flags() {
        let information = vec![info("a", 4), info("b", 4), info("c", 4)];
        let statuses = vec![
            status("a", 1, 1, true, true, false),
            status("b", 1, 1, false, true, true),
            status("c", 1, 1, true, false, true),
        ];

        let stats =
            BikeStats::from_station_feeds("citybike", &information, &statuses, sample_time(), 30);

        assert_eq!(stats.active_stations, 0);
        assert_eq!(stats.total_bikes_available, 0);
        assert_eq!(stats.total_docks_available, 0);
        // Capacity still accumulates for matched inactive stations.
        assert_eq!(stats.total_capacity, 12);
    }

    #[test]
    fn test_derives_date_and_expiry_from_collection_time() {
        let stats = BikeStats::from_station_feeds("citybike", &[], &[], sample_time(), 5);

        assert_eq!(stats.timestamp, sample_time().timestamp());
        assert_eq!(stats.date, "2024-01-15");
        assert_eq!(stats.expiry_time, stats.timestamp + 5 * 86_400);
        assert_eq!(stats.total_stations, 0);
    }

    // Helper constructors for test fixtures
    fn info(id: &str, capacity: u32) -> StationInformation {
        StationInformation {
            station_id: id.to_string(),
            capacity,
        }
    }

    fn status(
        id: &str,
        bikes: u32,
        docks: u32,
        installed: bool,
        renting: bool,
        returning: bool,
    ) -> StationStatus {
        StationStatus {
            station_id: id.to_string(),
            num_bikes_available: bikes,
            num_docks_available: docks,
            is_installed: installed,
            is_renting: renting,
            is_returning: returning,
        }
    }

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }
}
