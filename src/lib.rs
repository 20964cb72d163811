//! Low-latency, FEC-protected datagram transport shim.
//!
//! This crate sits underneath an application's own UDP (or UDP-like)
//! transport, cutting outbound data into small windows ("code groups") and
//! generating erasure-coded recovery symbols for each, so that the receiver
//! can often recover from loss without waiting for a retransmit round trip.
//! It never performs I/O itself: the caller supplies a [`Interface`] for
//! sending datagrams and receiving decoded payloads, and drives the engine
//! with [`Endpoint::send`], [`Endpoint::recv`], and a periodic
//! [`Endpoint::tick`].

#![warn(missing_docs)]

pub mod cipher;
pub mod config;
pub mod decoder;
pub mod delay;
pub mod encoder;
mod endpoint;
pub mod fec;
pub mod interface;
pub mod loss;
pub mod oob;
pub mod pool;
pub mod redundancy;
pub mod ring;
pub mod seq;
pub mod stats;
pub mod wire;

#[cfg(feature = "worker")]
pub mod worker;

pub use crate::{
    cipher::SKEY_BYTES,
    config::{ConfigError, Settings},
    endpoint::{Endpoint, SendError, SendOobError},
    interface::Interface,
    stats::Stats,
};
