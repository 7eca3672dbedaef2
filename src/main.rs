//! TideStore -- S3-compatible object storage server.
//!
//! Crash-only design: every startup is a recovery.  Multipart state is
//! durable on disk, so there is no separate recovery mode.  SIGTERM and
//! SIGINT only stop accepting connections and wait for in-flight
//! requests before exiting.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the TideStore server.
#[derive(Parser, Debug)]
#[command(
    name = "tidestore",
    version,
    about = "S3-compatible object storage server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "tidestore.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config);
    let config = tidestore::config::load_config(&cli.config)?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    tidestore::metrics::init_metrics();
    tidestore::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    // Lock instrumentation: config flag or TIDESTORE_DEBUG=lock, decided
    // once at startup for the whole process.
    let instrumented = config.debug.lock
        || std::env::var("TIDESTORE_DEBUG")
            .map(|v| v.split(',').any(|part| part.trim() == "lock"))
            .unwrap_or(false);
    let nslock = Arc::new(tidestore::nslock::NsLockMap::new(instrumented));
    if instrumented {
        info!("Namespace lock instrumentation enabled");
    }

    // Filesystem object layer; every startup IS recovery.
    let objects = tidestore::object::FsObjects::new(&config.storage.root_dir, nslock.clone())
        .map_err(|err| anyhow::anyhow!("failed to open storage root: {err}"))?
        .with_min_part_size(config.storage.min_part_size);
    info!("Filesystem object layer initialized at {}", config.storage.root_dir);

    let state = Arc::new(tidestore::AppState {
        config: config.clone(),
        objects: Arc::new(objects),
        nslock,
    });

    let app = tidestore::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("TideStore listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections,
    // wait for in-flight requests to complete, then exit.  No cleanup --
    // the next startup handles recovery.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("TideStore shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
