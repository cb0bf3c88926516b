#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
#![forbid(unsafe_code)]

pub mod broadcaster;
pub mod ingress;
pub mod registry;

pub use broadcaster::{Broadcaster, EncodedEvent, PublishReport};
pub use ingress::{EventIngress, SalePayload, ValidationError};
pub use registry::{
    CloseReason, Outbound, RegistryPolicy, Subscriber, SubscriberHandle, SubscriberId,
    SubscriberReceiver, SubscriberRegistry, SubscriberSink, SubscriberState, TransportError,
    subscriber_channel,
};
