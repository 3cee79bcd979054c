//! CLI entry point for the realtime bus position service.
//!
//! Provides subcommands for serving the websocket streams, printing a one-off
//! position snapshot for a line, and loading timetable data.

use anyhow::{Context, Result};
use bus_stream::config::{
    DEFAULT_HEARTBEAT_PERIOD, DEFAULT_POSITION_PERIOD, DEFAULT_SEND_TIMEOUT, OriginPolicy,
    StreamConfig,
};
use bus_stream::model::LineId;
use bus_stream::output::write_json;
use bus_stream::server::{AppState, create_router};
use bus_stream::store::SqliteStore;
use bus_stream::stream::PositionFeed;
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_stream")]
#[command(about = "Streams schedule-based bus position estimates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the heartbeat and position websocket streams
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,

        /// Path to the schedule database
        #[arg(short, long, env = "DATABASE_PATH", default_value = "schedule.db")]
        database: String,

        /// Maximum number of pooled database connections
        #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
        max_connections: u32,

        /// Milliseconds between two position frames
        #[arg(
            long,
            env = "POSITION_PERIOD_MS",
            default_value_t = DEFAULT_POSITION_PERIOD.as_millis() as u64,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        position_period_ms: u64,

        /// Milliseconds between two heartbeat frames
        #[arg(
            long,
            env = "HEARTBEAT_PERIOD_MS",
            default_value_t = DEFAULT_HEARTBEAT_PERIOD.as_millis() as u64,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        heartbeat_period_ms: u64,

        /// Milliseconds a client may take to accept one frame
        #[arg(
            long,
            env = "SEND_TIMEOUT_MS",
            default_value_t = DEFAULT_SEND_TIMEOUT.as_millis() as u64,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        send_timeout_ms: u64,

        /// Browser origin allowed to open streams (repeatable; none means any)
        #[arg(long = "allowed-origin", env = "ALLOWED_ORIGINS", value_delimiter = ',')]
        allowed_origins: Vec<String>,
    },
    /// Print the positions a line's stream would emit at a given instant
    Snapshot {
        /// Path to the schedule database
        #[arg(short, long, env = "DATABASE_PATH", default_value = "schedule.db")]
        database: String,

        /// Line to resolve
        #[arg(short, long)]
        line: LineId,

        /// Local time as "YYYY-MM-DD HH:MM:SS" (defaults to now)
        #[arg(long, value_parser = parse_local_datetime)]
        at: Option<NaiveDateTime>,
    },
    /// Execute a SQL script against the schedule database
    Load {
        /// Path to the schedule database
        #[arg(short, long, env = "DATABASE_PATH", default_value = "schedule.db")]
        database: String,

        /// SQL file with timetable and route rows
        #[arg(short, long)]
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_stream.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_stream.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            addr,
            database,
            max_connections,
            position_period_ms,
            heartbeat_period_ms,
            send_timeout_ms,
            allowed_origins,
        } => {
            let config = StreamConfig {
                position_period: Duration::from_millis(position_period_ms),
                heartbeat_period: Duration::from_millis(heartbeat_period_ms),
                send_timeout: Duration::from_millis(send_timeout_ms),
                origin_policy: OriginPolicy::from_origins(allowed_origins),
            };
            serve(&addr, &database, max_connections, config).await?;
        }
        Commands::Snapshot { database, line, at } => {
            let store = SqliteStore::connect(&database, 1).await?;
            let feed = PositionFeed::new(Arc::new(store), line);
            let as_of = at.unwrap_or_else(|| Local::now().naive_local());

            let positions = feed.positions_at(as_of).await?;
            info!(line, %as_of, count = positions.len(), "Snapshot resolved");

            write_json(std::io::stdout().lock(), &positions)?;
        }
        Commands::Load { database, script } => {
            let sql = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read {}", script.display()))?;
            let store = SqliteStore::connect(&database, 1).await?;
            store.load_script(&sql).await?;
            info!(script = %script.display(), "Schedule script loaded");
        }
    }

    Ok(())
}

/// Binds the listener and serves until Ctrl-C.
#[tracing::instrument(skip(config))]
async fn serve(
    addr: &str,
    database: &str,
    max_connections: u32,
    config: StreamConfig,
) -> Result<()> {
    let store = SqliteStore::connect(database, max_connections).await?;
    info!(?config, "Stream configuration");

    let app = create_router(AppState::new(Arc::new(store), config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM:SS\": {e}"))
}
