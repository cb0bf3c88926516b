//! Print every sale pushed by a relay's live endpoint.
//!
//! Stays connected across relay restarts and network failures.

use clap::{Parser, ValueEnum};
use salerelay_sdk::client::{ConnectionState, ReconnectPolicy, ReconnectingClient};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Follow a sale relay's live-update stream
#[derive(Parser, Debug)]
#[command(name = "salerelay-tail")]
#[command(version, about, long_about = None)]
struct Args {
    /// Live endpoint URL
    #[arg(short, long, env = "SALERELAY_LIVE_URL", default_value = "ws://127.0.0.1:40510/")]
    url: Url,

    /// Subscriber token, if the relay requires one
    #[arg(short, long, env = "SALERELAY_SUBSCRIBER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds to wait before reconnecting
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    reconnect_secs: u64,

    /// Back off exponentially up to this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_reconnect_secs: Option<u64>,

    /// Randomize reconnect delays
    #[arg(long)]
    jitter: bool,

    /// Log output format
    #[arg(long, env = "SALERELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    fn policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_secs(self.reconnect_secs);
        let policy = match self.max_reconnect_secs {
            Some(max) => ReconnectPolicy::exponential(delay, Duration::from_secs(max)),
            None => ReconnectPolicy::fixed(delay),
        };
        if self.jitter {
            policy.with_jitter()
        } else {
            policy
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let policy = args.policy();
    let mut client = ReconnectingClient::new(args.url.clone()).with_policy(policy);
    if let Some(token) = &args.token {
        client = client.with_token(token);
    }

    let mut subscription = client.spawn(64);
    let mut state = subscription.state_watcher();
    tracing::info!(url = %args.url, "Following live sales");

    loop {
        tokio::select! {
            event = subscription.next_event() => {
                let Some(sale) = event else { break };
                tracing::info!(amount = %sale.amount, date = %sale.date, time = %sale.time, "sale");
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == ConnectionState::Connected {
                    tracing::info!("Connected to relay");
                } else {
                    tracing::debug!(state = ?current, "connection state changed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, exiting");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_reconnect_delay_is_refused() {
        assert!(Args::try_parse_from(["salerelay-tail", "--reconnect-secs", "0"]).is_err());
        assert!(Args::try_parse_from(["salerelay-tail", "--max-reconnect-secs", "0"]).is_err());
    }

    #[test]
    fn max_reconnect_selects_exponential_policy() {
        let args = Args::try_parse_from([
            "salerelay-tail",
            "--reconnect-secs",
            "2",
            "--max-reconnect-secs",
            "30",
        ])
        .unwrap();
        assert_eq!(
            args.policy(),
            ReconnectPolicy::exponential(Duration::from_secs(2), Duration::from_secs(30))
        );
    }
}
