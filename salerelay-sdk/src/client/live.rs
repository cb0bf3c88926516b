//! Subscriber-side live connection with automatic reconnect.
//!
//! [`ReconnectingClient`] cycles through
//! `Disconnected → Connecting → Connected → (Closed | Errored) → Disconnected`
//! for as long as it runs. After every closed or failed session it waits for
//! the [`ReconnectPolicy`] delay (a fixed 5 seconds by default) before the
//! next attempt. There is no terminal state.
//!
//! Malformed frames are logged and discarded without tearing down the
//! connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::objects::SaleEvent;
use crate::objects::ws::TOKEN_QUERY;

/// Delay between a closed or failed session and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state of a [`ReconnectingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Errored,
}

/// Errors observed on the live connection.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// The handshake failed or the transport broke mid-session.
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] tungstenite::Error),

    /// A frame could not be decoded as a [`SaleEvent`].
    #[error("undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Delay schedule between reconnect attempts.
///
/// The default is a constant [`DEFAULT_RECONNECT_DELAY`]. A hardened variant
/// grows the delay by `factor` per consecutive failure up to `max_delay` and
/// may add up to 10% random jitter. The delay never drops below `delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Base delay.
    pub delay: Duration,
    /// Upper bound for the grown delay.
    pub max_delay: Duration,
    /// Multiplicative growth per consecutive failed attempt.
    pub factor: f64,
    /// Add up to 10% random jitter on top of the computed delay.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// A constant delay between attempts.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay,
            factor: 1.0,
            jitter: false,
        }
    }

    /// Double the delay after each consecutive failure, capped at `max_delay`.
    pub const fn exponential(first: Duration, max_delay: Duration) -> Self {
        Self {
            delay: first,
            max_delay,
            factor: 2.0,
            jitter: false,
        }
    }

    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before the next attempt, given the number of consecutive
    /// failures since the last successful handshake.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base = self.delay.as_secs_f64();
        let grown = base * self.factor.powi(failures.min(32) as i32);
        let capped = if grown.is_finite() {
            grown.min(self.max_delay.as_secs_f64()).max(base)
        } else {
            base.max(self.max_delay.as_secs_f64())
        };
        let delay = Duration::try_from_secs_f64(capped)
            .unwrap_or_else(|_| self.max_delay.max(self.delay));

        if self.jitter {
            let spread = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);
            delay.saturating_add(Duration::from_millis(rand::rng().random_range(0..=spread)))
        } else {
            delay
        }
    }
}

/// A live-update subscriber that stays connected to the relay.
pub struct ReconnectingClient {
    url: Url,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl ReconnectingClient {
    /// Create a client for a live endpoint URL
    /// (e.g. `ws://localhost:40510/`).
    pub fn new(url: Url) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            policy: ReconnectPolicy::default(),
            state_tx,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Present a subscriber token as the `?token=` query parameter.
    pub fn with_token(mut self, token: &str) -> Self {
        self.url.query_pairs_mut().append_pair(TOKEN_QUERY, token);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Watch state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Run the connect/receive/reconnect loop forever, handing every decoded
    /// event to `on_event`.
    pub async fn run<F>(self, mut on_event: F)
    where
        F: FnMut(SaleEvent),
    {
        let mut failures: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting);
            debug!(host = ?self.url.host_str(), "connecting to relay");

            match self.session(&mut failures, &mut on_event).await {
                Ok(()) => {
                    self.set_state(ConnectionState::Closed);
                    info!("relay closed the live connection");
                }
                Err(e) => {
                    self.set_state(ConnectionState::Errored);
                    warn!(error = %e, "live connection failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = self.policy.delay_for(failures);
            failures = failures.saturating_add(1);
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            tokio::time::sleep(delay).await;
        }
    }

    /// Spawn [`run`](Self::run) on the tokio runtime and deliver events
    /// through a bounded channel of `buffer` entries.
    ///
    /// Events arriving while the channel is full are dropped with a warning.
    pub fn spawn(self, buffer: usize) -> LiveSubscription {
        let (tx, events) = mpsc::channel(buffer.max(1));
        let state = self.state();
        let task = tokio::spawn(self.run(move |event| {
            if let Err(e) = tx.try_send(event) {
                warn!(error = %e, "dropping sale, subscriber channel unavailable");
            }
        }));
        LiveSubscription {
            events,
            state,
            task,
        }
    }

    /// One connection lifetime. `Ok` means the relay closed the stream,
    /// `Err` means the handshake or transport failed.
    async fn session<F>(&self, failures: &mut u32, on_event: &mut F) -> Result<(), LiveError>
    where
        F: FnMut(SaleEvent),
    {
        let (mut stream, _) = connect_async(self.url.as_str()).await?;
        *failures = 0;
        self.set_state(ConnectionState::Connected);
        info!(host = ?self.url.host_str(), "live connection ready");

        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    let _ = stream.close(None).await;
                    return Err(e.into());
                }
            };
            match decode_frame(frame) {
                Ok(Some(event)) => on_event(event),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "discarding malformed live message"),
            }
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

/// Decode a data frame; control frames yield `None`.
fn decode_frame(frame: Message) -> Result<Option<SaleEvent>, LiveError> {
    match frame {
        Message::Text(text) => Ok(Some(SaleEvent::decode(text.as_bytes())?)),
        Message::Binary(data) => Ok(Some(SaleEvent::decode(&data)?)),
        _ => Ok(None),
    }
}

/// Handle to a spawned [`ReconnectingClient`].
///
/// Dropping it stops the client.
pub struct LiveSubscription {
    events: mpsc::Receiver<SaleEvent>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    /// Wait for the next sale.
    pub async fn next_event(&mut self) -> Option<SaleEvent> {
        self.events.recv().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_watcher(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// `true` while the background loop is alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio::time::{Instant, timeout};

    #[test]
    fn default_policy_is_fixed_five_seconds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(7), Duration::from_secs(5));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn huge_delay_saturates_instead_of_overflowing() {
        let longest = Duration::from_secs(u64::MAX);
        assert_eq!(ReconnectPolicy::fixed(longest).delay_for(0), longest);
        assert!(ReconnectPolicy::fixed(longest).with_jitter().delay_for(3) >= longest);
        assert_eq!(
            ReconnectPolicy::exponential(Duration::from_secs(1), longest).delay_for(u32::MAX),
            Duration::from_secs(1 << 32)
        );
    }

    #[test]
    fn exponential_policy_grows_to_cap() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(8));
        let delays: Vec<u64> = (0..6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(5)).with_jitter();
        for _ in 0..100 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_millis(5_500));
        }
    }

    #[test]
    fn token_is_appended_as_query() {
        let client = ReconnectingClient::new(Url::parse("ws://relay.local/live").unwrap())
            .with_token("s3cret");
        assert_eq!(client.url().as_str(), "ws://relay.local/live?token=s3cret");
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(decode_frame(Message::Ping(vec![1])).unwrap().is_none());
        assert!(matches!(
            decode_frame(Message::Text("not json".into())),
            Err(LiveError::Decode(_))
        ));
    }

    async fn bind() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();
        (listener, url)
    }

    #[tokio::test]
    async fn malformed_message_does_not_drop_connection() {
        let (listener, url) = bind().await;
        let accepted = Arc::new(Mutex::new(0usize));
        let counter = accepted.clone();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                *counter.lock().unwrap() += 1;
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                ws.send(Message::Text("not json".into())).await.unwrap();
                ws.send(Message::Text(
                    r#"{"amount":100,"date":"2024-01-01","time":"10:00"}"#.into(),
                ))
                .await
                .unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        let mut sub = ReconnectingClient::new(url)
            .with_policy(ReconnectPolicy::fixed(Duration::from_millis(50)))
            .spawn(8);

        let event = timeout(Duration::from_secs(5), sub.next_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.amount, "100".parse().unwrap());
        assert_eq!(event.time, "10:00");
        assert_eq!(sub.state(), ConnectionState::Connected);
        assert_eq!(*accepted.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn reconnects_with_delay_after_each_close() {
        let (listener, url) = bind().await;
        let attempts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorded = attempts.clone();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                recorded.lock().unwrap().push(Instant::now());
                if let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await {
                    let _ = ws.close(None).await;
                }
            }
        });

        let delay = Duration::from_millis(200);
        let sub = ReconnectingClient::new(url)
            .with_policy(ReconnectPolicy::fixed(delay))
            .spawn(8);

        timeout(Duration::from_secs(10), async {
            while attempts.lock().unwrap().len() < 4 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        assert!(sub.is_running());
        let seen = attempts.lock().unwrap().clone();
        for pair in seen.windows(2) {
            // small margin for loopback connect jitter
            assert!(pair[1] - pair[0] >= delay - Duration::from_millis(20));
        }
    }

    #[tokio::test]
    async fn unreachable_relay_keeps_retrying() {
        let (listener, url) = bind().await;
        drop(listener);

        let sub = ReconnectingClient::new(url)
            .with_policy(ReconnectPolicy::fixed(Duration::from_millis(20)))
            .spawn(1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sub.is_running());
        assert_ne!(sub.state(), ConnectionState::Connected);
    }
}
