//! Push-subscriber surface: connection bookkeeping, windowed stats queries,
//! and delivery to live connections.

pub mod gateway;
pub mod push;
pub mod query;
pub mod registry;

pub use gateway::GatewayPush;
pub use push::{ConnectionPush, PushError};
pub use query::{ACTION_GET_BIKE_STATS, QueryWindow, StatsQueryService, StatsRequest, WsResponse};
pub use registry::{ConnectionRecord, ConnectionRegistry};
