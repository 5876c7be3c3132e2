pub mod collector;
pub mod config;
pub mod fetch;
pub mod gbfs;
pub mod retention;
pub mod stats;
pub mod store;
pub mod ws;
