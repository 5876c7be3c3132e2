//! Windowed stats queries pushed to subscribers.
//!
//! An inbound message names an action plus an optional time window and
//! provider filter. The service resolves the window, reads every calendar
//! date the window touches from the record table, merges the pages into one
//! timestamp-ordered list, and pushes exactly one response back to the
//! requesting connection, success or error alike.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::push::{ConnectionPush, PushError};
use crate::stats::BikeStats;
use crate::store::{ConnectionStore, StatsStore};

/// The only action the query surface understands.
pub const ACTION_GET_BIKE_STATS: &str = "getBikeStats";

const DEFAULT_WINDOW_HOURS: i64 = 1;

/// Inbound query message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsRequest {
    pub action: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub provider: Option<String>,
}

impl StatsRequest {
    /// A well-formed [`ACTION_GET_BIKE_STATS`] request.
    pub fn window(
        start_date: Option<String>,
        end_date: Option<String>,
        provider: Option<String>,
    ) -> Self {
        Self {
            action: ACTION_GET_BIKE_STATS.to_string(),
            start_date,
            end_date,
            provider,
        }
    }
}

/// Outbound message. Exactly one of these is pushed per inbound request.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsResponse {
    BikeStats { data: Vec<BikeStats> },
    Error { message: String },
}

/// Resolved query window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    /// Resolves the requested bounds. Only a request carrying both bounds
    /// narrows the window; anything else falls back to the trailing default
    /// window ending now.
    pub fn resolve(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                start: parse_bound(start)?,
                end: parse_bound(end)?,
            }),
            _ => {
                let end = Utc::now();
                Ok(Self {
                    start: end - chrono::Duration::hours(DEFAULT_WINDOW_HOURS),
                    end,
                })
            }
        }
    }

    /// Calendar dates the window touches, oldest first. Empty for an
    /// inverted window.
    pub fn dates(&self) -> Vec<String> {
        let mut dates = Vec::new();
        let last = self.end.date_naive();
        let mut current = self.start.date_naive();

        while current <= last {
            dates.push(current.format("%Y-%m-%d").to_string());
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }

        dates
    }
}

/// Accepts RFC 3339 with offset, a naive date-time, or a bare date taken as
/// midnight UTC.
fn parse_bound(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(parsed.and_time(NaiveTime::MIN).and_utc());
    }
    bail!("unrecognized date '{raw}', expected an ISO 8601 date or date-time")
}

pub struct StatsQueryService {
    store: Arc<dyn StatsStore>,
    connections: Arc<dyn ConnectionStore>,
    push: Arc<dyn ConnectionPush>,
}

impl StatsQueryService {
    pub fn new(
        store: Arc<dyn StatsStore>,
        connections: Arc<dyn ConnectionStore>,
        push: Arc<dyn ConnectionPush>,
    ) -> Self {
        Self {
            store,
            connections,
            push,
        }
    }

    /// Handles one raw inbound message, pushing the response back to
    /// `connection_id`. Request problems become an error push, not an `Err`.
    pub async fn handle_message(&self, connection_id: &str, raw: &str) -> Result<()> {
        let response = match serde_json::from_str::<StatsRequest>(raw) {
            Ok(request) if request.action == ACTION_GET_BIKE_STATS => {
                self.response_for_request(&request).await
            }
            Ok(request) => {
                warn!(action = %request.action, "Unsupported action");
                WsResponse::Error {
                    message: format!("unsupported action '{}'", request.action),
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed request");
                WsResponse::Error {
                    message: format!("malformed request: {e}"),
                }
            }
        };

        self.deliver(connection_id, &response).await
    }

    /// Handles an already parsed request.
    pub async fn handle_request(&self, connection_id: &str, request: &StatsRequest) -> Result<()> {
        let response = self.response_for_request(request).await;
        self.deliver(connection_id, &response).await
    }

    async fn response_for_request(&self, request: &StatsRequest) -> WsResponse {
        match self.query_window(request).await {
            Ok(data) => WsResponse::BikeStats { data },
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "Stats query failed");
                WsResponse::Error { message }
            }
        }
    }

    /// Reads the window's records, one date partition at a time, merged and
    /// sorted by collection timestamp.
    async fn query_window(&self, request: &StatsRequest) -> Result<Vec<BikeStats>> {
        let window =
            QueryWindow::resolve(request.start_date.as_deref(), request.end_date.as_deref())?;
        let provider = request.provider.as_deref();

        let mut records = Vec::new();
        for date in window.dates() {
            let mut page = self
                .store
                .query_date(
                    &date,
                    window.start.timestamp(),
                    window.end.timestamp(),
                    provider,
                )
                .await?;
            records.append(&mut page);
        }

        records.sort_by_key(|r| r.timestamp);

        info!(
            start = window.start.timestamp(),
            end = window.end.timestamp(),
            records = records.len(),
            "Window query finished"
        );
        Ok(records)
    }

    /// Single push per request. A gone connection drops its registry record
    /// best-effort and is not an error.
    async fn deliver(&self, connection_id: &str, response: &WsResponse) -> Result<()> {
        let payload = serde_json::to_vec(response)?;

        match self.push.send(connection_id, &payload).await {
            Ok(()) => Ok(()),
            Err(PushError::Gone) => {
                warn!(connection_id, "Connection gone, dropping registry record");
                if let Err(e) = self.connections.delete(connection_id).await {
                    warn!(connection_id, error = %format!("{e:#}"), "Stale connection cleanup failed");
                }
                Ok(())
            }
            Err(err) => {
                Err(err).with_context(|| format!("cannot push to connection '{connection_id}'"))
            }
        }
    }
}
