use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sketchguard::config::SketchguardConfig;
use sketchguard::http::HttpServer;
use sketchguard::ratelimit::PolicySet;

/// Sketchguard rate limiting service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "SKETCHGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the HTTP server (overrides the config file)
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Seconds between sweeps of expired counters (overrides the config file)
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Sketchguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = SketchguardConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.rate_limiting.sweep_interval_secs = secs;
    }
    config.validate()?;
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let policies = PolicySet::from_config(&config.rate_limiting)?;
    let sweepers = policies.spawn_sweepers(config.rate_limiting.sweep_interval());
    info!(
        policies = ?policies.names(),
        sweep_interval_secs = config.rate_limiting.sweep_interval_secs,
        "Rate limiters initialized"
    );

    let server = HttpServer::new(config.server.http_addr, policies);
    server.serve_with_shutdown(shutdown_signal()).await?;

    for sweeper in sweepers {
        sweeper.stop().await;
    }

    info!("Sketchguard stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sketchguard=info,tower_http=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
