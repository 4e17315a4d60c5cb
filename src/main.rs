//! MegaRAID Exporter
//!
//! Serves MegaRAID controller, virtual drive, physical drive and battery
//! metrics for Prometheus.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Path Monitor │───▶│  Collector   │───▶│ HTTP Server  │
//! │ (background) │    │ (per scrape) │    │ /metrics     │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use megaraid_exporter::collector::{CollectorConfig, MegaraidCollector};
use megaraid_exporter::error::{Error, Result};
use megaraid_exporter::invoker::{OutputFormat, SubprocessRunner};
use megaraid_exporter::monitoring::PathMonitor;
use megaraid_exporter::server::{self, AppState};

// =============================================================================
// CLI Arguments
// =============================================================================

/// MegaRAID Exporter - Prometheus metrics from MegaCLI / StorCLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on for the web interface and telemetry
    #[arg(long, env = "MEGARAID_LISTEN_ADDRESS", default_value = "0.0.0.0:9216")]
    listen_address: String,

    /// Path under which to expose metrics
    #[arg(long, env = "MEGARAID_METRICS_PATH", default_value = "/metrics")]
    metrics_path: String,

    /// Diagnostic binary path (auto-discovered if not specified)
    #[arg(long, env = "MEGARAID_BINARY_PATH")]
    binary_path: Option<String>,

    /// Diagnostic output format: text (MegaCLI) or json (StorCLI)
    #[arg(long, env = "MEGARAID_FORMAT", value_enum, default_value = "text")]
    format: OutputFormat,

    /// Timeout for one diagnostic command in seconds
    #[arg(long, env = "MEGARAID_COMMAND_TIMEOUT_SECONDS", default_value = "30")]
    command_timeout_seconds: u64,

    /// Timeout for a whole scrape in seconds
    #[arg(long, env = "MEGARAID_SCRAPE_TIMEOUT_SECONDS", default_value = "60")]
    scrape_timeout_seconds: u64,

    /// Binary path check interval in seconds
    #[arg(long, env = "MEGARAID_PATH_CHECK_INTERVAL_SECONDS", default_value = "30")]
    path_check_interval_seconds: u64,

    /// Refuse to start without a usable diagnostic binary
    #[arg(long, env = "MEGARAID_STRICT")]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MEGARAID_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "MEGARAID_LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting MegaRAID exporter v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listen address: {}", args.listen_address);
    info!("  Metrics path: {}", args.metrics_path);
    info!("  Output format: {}", args.format);
    info!("  Command timeout: {}s", args.command_timeout_seconds);
    info!("  Scrape timeout: {}s", args.scrape_timeout_seconds);

    let addr: SocketAddr = args
        .listen_address
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

    // Resolve the binary before serving anything
    let monitor = Arc::new(PathMonitor::new(
        args.binary_path.clone(),
        args.format,
        Duration::from_secs(args.path_check_interval_seconds.max(1)),
    ));
    monitor.probe();

    if let Err(e) = monitor.ensure_healthy() {
        if args.strict {
            error!("Strict mode: {}", e);
            return Err(e);
        }
        warn!("{} - metrics will be empty until it appears", e);
    }

    let collector = MegaraidCollector::new(
        CollectorConfig {
            format: args.format,
            command_timeout: Duration::from_secs(args.command_timeout_seconds),
            scrape_timeout: Duration::from_secs(args.scrape_timeout_seconds),
        },
        Arc::new(SubprocessRunner::new(monitor.clone())),
    )?;

    let shutdown = CancellationToken::new();

    // Start path monitor
    let monitor_handle = {
        let monitor = monitor.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { monitor.run(token).await })
    };

    // Start HTTP server
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        Error::Config(format!("Failed to bind {}: {}", addr, e))
    })?;
    let state = Arc::new(AppState {
        collector,
        monitor,
        metrics_path: args.metrics_path.clone(),
    });
    let server_handle = tokio::spawn(server::serve(listener, state, shutdown.clone()));

    wait_for_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    match server_handle.await {
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    if let Err(e) = monitor_handle.await {
        error!("Path monitor task failed: {}", e);
    }

    info!("Exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Signals
// =============================================================================

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
