//! # accord-gateway
//!
//! Implementation of the service's gateway for the Accord ecosystem.
//!
//! The gateway is the persistent event stream: a bot opens one or more
//! sharded websocket connections through which the service pushes state
//! changes. This crate covers the whole lifecycle of those connections:
//!
//! * the [`Shard`] runs one connection's state machine: the identify or
//!   resume handshake, heartbeating with jitter and dead-connection
//!   detection, sequence tracking, and reconnection with capped exponential
//!   backoff driven by a close-code policy;
//! * the [`Cluster`] orchestrates many shards: planning which to run,
//!   logging them in one at a time under the shared identify gate, tracking
//!   each shard's initial guild snapshot, and fanning events out into one
//!   stream.
//!
//! Identify serialization lives in [`accord-gateway-queue`]; REST access and
//! ratelimiting live in [`accord-http`].
//!
//! [`accord-gateway-queue`]: accord_gateway_queue
//! [`accord-http`]: accord_http

#![deny(
    clippy::all,
    clippy::pedantic,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::semicolon_if_nothing_returned
)]

pub mod cluster;
pub mod event;
pub mod shard;

pub use self::{
    cluster::Cluster,
    event::Event,
    shard::{Shard, Stage},
};
