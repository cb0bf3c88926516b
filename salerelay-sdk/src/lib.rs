//! SDK for the sale relay.
//!
//! Holds the wire types shared by the relay server and its clients, the
//! HMAC signing scheme used by the ingress endpoint, and (behind the
//! `client` feature) the producer and subscriber clients.

#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
