//! Sale Relay Server
//!
//! Accepts sale notifications from a single producer and pushes each one to
//! every connected live-update subscriber.

mod api;
mod config;
mod server;
mod shutdown;
mod state;
#[cfg(test)]
mod test_support;

use clap::{Parser, ValueEnum};
use config::{CliOverrides, ConfigLoader};
use server::{build_live_router, build_router, run_server};
use shutdown::{close_subscribers, spawn_config_reload_handler, spawn_shutdown_watch};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Sale Relay - live fan-out of point-of-sale notifications
#[derive(Parser, Debug)]
#[command(name = "salerelay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SALERELAY_CONFIG", default_value = "./salerelay.toml")]
    config: PathBuf,

    /// Override the ingress listen address (e.g., 0.0.0.0:40509)
    #[arg(short, long, env = "SALERELAY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Override the live-update listen address (e.g., 0.0.0.0:40510)
    #[arg(long, env = "SALERELAY_LIVE_LISTEN")]
    live_listen: Option<SocketAddr>,

    /// Serve the live endpoint at /live on the ingress listener instead
    #[arg(long, env = "SALERELAY_SHARED_LIVE")]
    shared_live: bool,

    /// Require ingress bodies to be signed with this secret
    #[arg(long, env = "SALERELAY_INGRESS_SECRET", hide_env_values = true)]
    ingress_secret: Option<String>,

    /// Require live subscribers to present this token
    #[arg(long, env = "SALERELAY_SUBSCRIBER_TOKEN", hide_env_values = true)]
    subscriber_token: Option<String>,

    /// Log output format
    #[arg(long, env = "SALERELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// How long live subscribers get to receive their close frame on shutdown.
const SUBSCRIBER_CLOSE_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_format);

    tracing::info!("Starting salerelay-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let overrides = CliOverrides {
        listen: args.listen,
        live_listen: args.live_listen,
        shared_live: args.shared_live,
        ingress_secret: args.ingress_secret,
        subscriber_token: args.subscriber_token,
    };
    let config_loader = Arc::new(ConfigLoader::new(&args.config, overrides));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", config_loader.config_path());

    let listen_addr = loaded_config.server.listen;
    let live_addr = loaded_config.server.live_listen;
    tracing::info!(
        policy = ?loaded_config.relay.policy,
        buffer = loaded_config.relay.subscriber_buffer,
        "Relay configured"
    );

    // Create application state
    let state = AppState::new(
        loaded_config.server,
        loaded_config.relay,
        loaded_config.auth,
    );

    // Shutdown watch stops both listeners
    let shutdown_rx = spawn_shutdown_watch();

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let result = match live_addr {
        Some(live_addr) => {
            tracing::info!("Starting ingress on {} and live updates on {}", listen_addr, live_addr);
            tokio::try_join!(
                run_server(build_router(state.clone()), listen_addr, shutdown_rx.clone()),
                run_server(build_live_router(state.clone()), live_addr, shutdown_rx),
            )
            .map(|_| ())
        }
        None => {
            tracing::info!("Starting ingress and live updates on {}", listen_addr);
            run_server(build_router(state.clone()), listen_addr, shutdown_rx).await
        }
    };

    // Upgraded connections outlive the listeners; close them explicitly
    close_subscribers(&state.registry, SUBSCRIBER_CLOSE_GRACE).await;

    // Signal the config reload handler to stop
    shutdown_notify.notify_one();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
