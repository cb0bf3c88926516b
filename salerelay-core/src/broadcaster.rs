//! Fan-out of normalized sales to registered subscribers.
//!
//! Delivery is at-most-once and best effort: a sale published while nobody
//! is connected is gone, and a subscriber whose queue is closed or full is
//! dropped from the registry instead of blocking the others.

use std::sync::Arc;

use salerelay_sdk::objects::SaleEvent;
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::registry::{SubscriberId, SubscriberRegistry, TransportError};

/// A sale serialized once for every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent(Arc<str>);

impl EncodedEvent {
    pub fn encode(event: &SaleEvent) -> Result<Self, serde_json::Error> {
        Ok(Self(event.encode()?.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of one [`Broadcaster::publish`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the frame.
    pub delivered: usize,
    /// Subscribers removed because the hand-off failed.
    pub dropped: usize,
}

pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Push a sale to every open subscriber.
    pub async fn publish(&self, event: &SaleEvent) -> PublishReport {
        match EncodedEvent::encode(event) {
            Ok(frame) => self.publish_encoded(frame).await,
            Err(e) => {
                error!(error = %e, "failed to encode sale");
                PublishReport::default()
            }
        }
    }

    /// Push an already encoded frame to every open subscriber.
    pub async fn publish_encoded(&self, frame: EncodedEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut failed: SmallVec<[(SubscriberId, TransportError); 4]> = SmallVec::new();

        self.registry
            .for_each(|id, subscriber| match subscriber.try_deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => failed.push((id, e)),
            })
            .await;

        if report.delivered == 0 && failed.is_empty() {
            debug!("no subscribers connected, sale dropped");
            return report;
        }

        for (id, e) in failed {
            warn!(subscriber = %id, error = %e, "removing subscriber after failed delivery");
            if self.registry.unregister(id).await {
                report.dropped += 1;
            }
        }
        report
    }
}
