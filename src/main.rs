//! CLI entry point for the GBFS stats collector.
//!
//! Provides subcommands for running collection cycles over the configured
//! bike-share providers, sweeping expired records, reading the latest
//! snapshots, and serving the push-subscriber routes (connect, disconnect,
//! windowed stats queries).

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use gbfs_stats::collector::Collector;
use gbfs_stats::config;
use gbfs_stats::fetch::BasicClient;
use gbfs_stats::retention::RetentionSweeper;
use gbfs_stats::stats::BikeStats;
use gbfs_stats::store::{DynamoConnectionStore, DynamoStatsStore, S3SnapshotSink, StatsStore};
use gbfs_stats::ws::{ConnectionRegistry, GatewayPush, StatsQueryService, StatsRequest};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gbfs_stats")]
#[command(about = "Collects availability statistics from GBFS bike-share feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collection cycles over the configured providers
    Collect {
        /// Provider list file (defaults to $PROVIDERS_FILE or providers.json)
        #[arg(short, long)]
        providers: Option<String>,

        /// Maximum number of concurrent provider fetches
        #[arg(short, long, default_value_t = 8)]
        concurrency: usize,

        /// Seconds to wait between cycles
        #[arg(short = 'r', long, default_value_t = 900)]
        interval_secs: u64,

        /// Number of cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        cycles: usize,
    },
    /// Delete records older than the retention window
    Sweep {
        /// Provider list file (defaults to $PROVIDERS_FILE or providers.json)
        #[arg(short, long)]
        providers: Option<String>,

        /// Retention window in days (defaults to $RETENTION_DAYS or 30)
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Print the newest stored record for every provider
    Latest {
        /// Provider list file (defaults to $PROVIDERS_FILE or providers.json)
        #[arg(short, long)]
        providers: Option<String>,
    },
    /// Register a subscriber connection
    Connect {
        /// Gateway connection id
        #[arg(value_name = "CONNECTION_ID")]
        connection_id: String,
    },
    /// Remove a subscriber connection
    Disconnect {
        /// Gateway connection id
        #[arg(value_name = "CONNECTION_ID")]
        connection_id: String,
    },
    /// Query a stats window and push the result to a connection
    Query {
        /// Gateway connection id to push the response to
        #[arg(value_name = "CONNECTION_ID")]
        connection_id: String,

        /// Window start (ISO 8601 date or date-time)
        #[arg(long)]
        start_date: Option<String>,

        /// Window end (ISO 8601 date or date-time)
        #[arg(long)]
        end_date: Option<String>,

        /// Restrict results to one provider
        #[arg(long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gbfs_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gbfs_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            providers,
            concurrency,
            interval_secs,
            cycles,
        } => {
            run_collect(&providers_path(providers), concurrency, interval_secs, cycles).await?;
        }
        Commands::Sweep {
            providers,
            retention_days,
        } => {
            run_sweep(&providers_path(providers), retention_days).await?;
        }
        Commands::Latest { providers } => {
            run_latest(&providers_path(providers)).await?;
        }
        Commands::Connect { connection_id } => {
            connection_registry().await?.connect(&connection_id).await?;
        }
        Commands::Disconnect { connection_id } => {
            connection_registry()
                .await?
                .disconnect(&connection_id)
                .await?;
        }
        Commands::Query {
            connection_id,
            start_date,
            end_date,
            provider,
        } => {
            run_query(&connection_id, start_date, end_date, provider).await?;
        }
    }

    Ok(())
}

/// Point-read response: the newest stored record per provider.
#[derive(Serialize)]
struct LatestSnapshot {
    timestamp: i64,
    providers: Vec<BikeStats>,
}

fn providers_path(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var("PROVIDERS_FILE").ok())
        .unwrap_or_else(|| "providers.json".to_string())
}

/// Runs collection cycles at the configured interval, printing one summary
/// JSON document per cycle.
#[tracing::instrument(skip_all, fields(providers_file = %providers_file, concurrency, cycles))]
async fn run_collect(
    providers_file: &str,
    concurrency: usize,
    interval_secs: u64,
    cycles: usize,
) -> Result<()> {
    let providers = config::load_providers(providers_file)?;
    let retention_days = config::env_or("RETENTION_DAYS", config::DEFAULT_RETENTION_DAYS);
    let timeout_secs = config::env_or("FEED_TIMEOUT_SECS", config::DEFAULT_FEED_TIMEOUT_SECS);
    let table = config::require_env("DYNAMODB_TABLE")?;

    let sdk_config = aws_config::load_from_env().await;
    let store = Arc::new(DynamoStatsStore::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        table,
    ));
    let http = Arc::new(BasicClient::with_timeout(Duration::from_secs(timeout_secs))?);

    let mut collector = Collector::new(http, store, retention_days, concurrency);

    match std::env::var("HISTORY_BUCKET") {
        Ok(bucket) if !bucket.is_empty() => {
            info!(bucket = %bucket, "Snapshot archive enabled");
            let s3 = aws_sdk_s3::Client::new(&sdk_config);
            collector = collector.with_snapshots(Arc::new(S3SnapshotSink::new(s3, bucket)));
        }
        _ => info!("HISTORY_BUCKET not set, skipping snapshot archive"),
    }

    info!(
        providers = providers.len(),
        retention_days, "Providers loaded"
    );

    if cycles == 0 {
        info!(interval_secs, "Collecting until interrupted. Press Ctrl+C to stop.");
    } else {
        info!(cycles, interval_secs, "Starting collection");
    }

    let mut cycle = 0;
    loop {
        if cycles > 0 && cycle >= cycles {
            break;
        }
        cycle += 1;

        info!(
            cycle,
            total = if cycles == 0 { None } else { Some(cycles) },
            "Starting collection cycle"
        );

        let summary = collector.run(&providers).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);

        if cycles == 0 || cycle < cycles {
            info!(interval_secs, "Waiting before next cycle");
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }

    Ok(())
}

#[tracing::instrument(skip_all, fields(providers_file = %providers_file))]
async fn run_sweep(providers_file: &str, retention_days: Option<u32>) -> Result<()> {
    let providers = config::load_providers(providers_file)?;
    let retention_days = retention_days
        .unwrap_or_else(|| config::env_or("RETENTION_DAYS", config::DEFAULT_RETENTION_DAYS));
    let table = config::require_env("DYNAMODB_TABLE")?;

    let sdk_config = aws_config::load_from_env().await;
    let store = Arc::new(DynamoStatsStore::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        table,
    ));

    let summary = RetentionSweeper::new(store, retention_days)
        .run(&providers)
        .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn run_latest(providers_file: &str) -> Result<()> {
    let providers = config::load_providers(providers_file)?;
    let table = config::require_env("DYNAMODB_TABLE")?;

    let sdk_config = aws_config::load_from_env().await;
    let store = DynamoStatsStore::new(aws_sdk_dynamodb::Client::new(&sdk_config), table);

    let mut records = Vec::new();
    for provider in &providers {
        match store.latest(&provider.name).await? {
            Some(record) => records.push(record),
            None => info!(provider = %provider.name, "No stored records yet"),
        }
    }

    let snapshot = LatestSnapshot {
        timestamp: Utc::now().timestamp(),
        providers: records,
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

async fn connection_registry() -> Result<ConnectionRegistry> {
    let table = config::require_env("CONNECTIONS_TABLE")?;

    let sdk_config = aws_config::load_from_env().await;
    let store = Arc::new(DynamoConnectionStore::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        table,
    ));

    Ok(ConnectionRegistry::new(store))
}

async fn run_query(
    connection_id: &str,
    start_date: Option<String>,
    end_date: Option<String>,
    provider: Option<String>,
) -> Result<()> {
    let table = config::require_env("DYNAMODB_TABLE")?;
    let connections_table = config::require_env("CONNECTIONS_TABLE")?;
    let ws_endpoint = config::require_env("WS_ENDPOINT")?;

    let sdk_config = aws_config::load_from_env().await;
    let dynamo = aws_sdk_dynamodb::Client::new(&sdk_config);

    let store = Arc::new(DynamoStatsStore::new(dynamo.clone(), table));
    let connections = Arc::new(DynamoConnectionStore::new(dynamo, connections_table));
    let push = Arc::new(GatewayPush::new(&sdk_config, &ws_endpoint));

    let service = StatsQueryService::new(store, connections, push);
    let request = StatsRequest::window(start_date, end_date, provider);
    service.handle_request(connection_id, &request).await
}
