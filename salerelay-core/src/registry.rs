//! Registry of connected live-update subscribers.
//!
//! Every WebSocket connection that completes its upgrade is registered here
//! with a handle to its outbound queue. The [`Broadcaster`](crate::Broadcaster)
//! iterates the registry to deliver each sale; connection tasks unregister
//! themselves when their socket goes away.
//!
//! All mutation and iteration go through one async mutex, so a broadcast
//! never observes a half-removed entry.

use std::collections::HashMap;
use std::fmt;

use salerelay_sdk::objects::ws::LiveCloseCode;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broadcaster::EncodedEvent;

/// Identifier assigned to a subscriber at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How the registry treats concurrent subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryPolicy {
    /// Every subscriber receives every sale.
    #[default]
    FanOut,
    /// Only the most recently connected subscriber is kept; registering a
    /// new one evicts the rest.
    LatestOnly,
}

/// Connection state of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Open,
    /// The connection is shutting down; broadcasts skip it.
    Closing,
}

/// Why the relay is closing a subscriber's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer subscriber took the single slot.
    Replaced,
    /// The subscriber fell behind or its queue was closed.
    Evicted,
    /// The relay is shutting down.
    ShuttingDown,
}

impl CloseReason {
    /// WebSocket close code sent for this reason.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Replaced => LiveCloseCode::REPLACED,
            CloseReason::Evicted => LiveCloseCode::EVICTED,
            CloseReason::ShuttingDown => LiveCloseCode::GOING_AWAY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Replaced => "replaced by a newer subscriber",
            CloseReason::Evicted => "subscriber evicted",
            CloseReason::ShuttingDown => "relay shutting down",
        }
    }
}

/// Failure to hand a frame to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("subscriber connection closed")]
    Closed,
    #[error("subscriber queue full")]
    Backpressure,
}

/// Next thing a subscriber's connection task has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event(EncodedEvent),
    Close(CloseReason),
}

/// The sending half of a subscriber connection.
pub trait SubscriberSink: Send + Sync + 'static {
    /// Hand a frame over without waiting.
    fn try_deliver(&self, frame: EncodedEvent) -> Result<(), TransportError>;

    /// Ask the connection to close. Best effort.
    fn close(&self, _reason: CloseReason) {}
}

/// Create the channel pair for one subscriber.
///
/// `buffer` is the backpressure limit: a subscriber with this many frames
/// still queued is evicted on the next broadcast. The close signal travels
/// beside the queue, so it is delivered even when the queue is full.
pub fn subscriber_channel(buffer: usize) -> (SubscriberHandle, SubscriberReceiver) {
    let (events_tx, events_rx) = mpsc::channel(buffer.max(1));
    let (close_tx, close_rx) = watch::channel(None);
    (
        SubscriberHandle {
            events: events_tx,
            close: close_tx,
        },
        SubscriberReceiver {
            events: events_rx,
            close: close_rx,
        },
    )
}

/// Sending half of [`subscriber_channel`], stored in the registry.
#[derive(Debug)]
pub struct SubscriberHandle {
    events: mpsc::Sender<EncodedEvent>,
    close: watch::Sender<Option<CloseReason>>,
}

impl SubscriberSink for SubscriberHandle {
    fn try_deliver(&self, frame: EncodedEvent) -> Result<(), TransportError> {
        self.events.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self, reason: CloseReason) {
        self.close.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// Receiving half drained by a subscriber's connection task.
#[derive(Debug)]
pub struct SubscriberReceiver {
    events: mpsc::Receiver<EncodedEvent>,
    close: watch::Receiver<Option<CloseReason>>,
}

impl SubscriberReceiver {
    /// Wait for the next frame or close request.
    ///
    /// A close request takes precedence over queued frames and is returned
    /// again on every later call. `None` means the registry dropped the
    /// handle without giving a reason.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if let Some(reason) = *self.close.borrow_and_update() {
            return Some(Outbound::Close(reason));
        }
        tokio::select! {
            biased;
            Ok(()) = self.close.changed() => {
                (*self.close.borrow_and_update()).map(Outbound::Close)
            }
            event = self.events.recv() => match event {
                Some(frame) => Some(Outbound::Event(frame)),
                None => (*self.close.borrow()).map(Outbound::Close),
            },
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Outbound> {
        if let Some(reason) = *self.close.borrow_and_update() {
            return Some(Outbound::Close(reason));
        }
        self.events.try_recv().ok().map(Outbound::Event)
    }
}

/// A registry entry.
pub struct Subscriber {
    sink: Box<dyn SubscriberSink>,
    state: SubscriberState,
}

impl Subscriber {
    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn try_deliver(&self, frame: EncodedEvent) -> Result<(), TransportError> {
        self.sink.try_deliver(frame)
    }
}

/// The set of currently connected subscribers.
pub struct SubscriberRegistry {
    policy: RegistryPolicy,
    entries: Mutex<HashMap<SubscriberId, Subscriber>>,
    size: watch::Sender<usize>,
}

impl SubscriberRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            size: watch::Sender::new(0),
        }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Store a new subscriber and return its id.
    ///
    /// Under [`RegistryPolicy::LatestOnly`] every existing subscriber is
    /// asked to close and removed first.
    pub async fn register<S: SubscriberSink>(&self, sink: S) -> SubscriberId {
        let id = SubscriberId::generate();
        let mut entries = self.entries.lock().await;

        if self.policy == RegistryPolicy::LatestOnly && !entries.is_empty() {
            info!(
                evicted = entries.len(),
                "replacing previous subscriber with newer connection"
            );
            for (_, previous) in entries.drain() {
                previous.sink.close(CloseReason::Replaced);
            }
        }

        entries.insert(
            id,
            Subscriber {
                sink: Box::new(sink),
                state: SubscriberState::Open,
            },
        );
        self.size.send_replace(entries.len());
        debug!(subscriber = %id, total = entries.len(), "subscriber registered");
        id
    }

    /// Remove a subscriber. Removing an absent id is a no-op.
    ///
    /// Returns whether an entry was removed.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(&id).is_some();
        self.size.send_replace(entries.len());
        drop(entries);
        if removed {
            debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }

    /// Flag a subscriber as closing so broadcasts skip it.
    pub async fn mark_closing(&self, id: SubscriberId) {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            entry.state = SubscriberState::Closing;
        }
    }

    /// Call `f` for each open subscriber present at the time of the call.
    ///
    /// Iteration order is unspecified. The registry lock is held for the
    /// duration, so `f` must not await or re-enter the registry.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SubscriberId, &Subscriber),
    {
        let entries = self.entries.lock().await;
        for (id, subscriber) in entries.iter() {
            if subscriber.state == SubscriberState::Open {
                f(*id, subscriber);
            }
        }
    }

    /// Number of registered subscribers, including closing ones.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    /// Ask every subscriber to close for shutdown and stop broadcasting to
    /// them.
    ///
    /// Entries stay registered until their connection task unregisters
    /// after sending its close frame; see
    /// [`wait_until_empty`](Self::wait_until_empty). Returns how many
    /// subscribers were asked to close.
    pub async fn drain(&self) -> usize {
        let mut entries = self.entries.lock().await;
        for subscriber in entries.values_mut() {
            subscriber.state = SubscriberState::Closing;
            subscriber.sink.close(CloseReason::ShuttingDown);
        }
        entries.len()
    }

    /// Complete once no subscriber is registered.
    pub async fn wait_until_empty(&self) {
        let mut size = self.size.subscribe();
        let _ = size.wait_for(|count| *count == 0).await;
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(RegistryPolicy::default())
    }
}
