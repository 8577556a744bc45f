//! # accord-rpc
//!
//! Cross-process coordination for bots that run shards of one application in
//! several processes.
//!
//! Two services share a framed request/response protocol over TCP:
//!
//! * the **rate-limit coordinator** mirrors the
//!   [`accord_http_ratelimiting::Ratelimiter`] contract so every process
//!   sees one view of the REST budgets; plug [`RemoteRatelimiter`] into an
//!   `accord-http` client.
//! * the **identify lock** serializes gateway identify handshakes across
//!   processes; plug [`LockClient`]s into a remote-capable identify queue.
//!
//! [`RpcServer`] serves both from one process. Each client carries its own
//! fallback policy for coordinator failure: degrade to local behavior, or
//! surface the error.

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
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod lock;
pub mod protocol;

mod client;
mod error;
mod ratelimiter;
mod server;

pub use self::{
    client::RpcClient,
    error::{RpcError, RpcErrorType},
    lock::LockClient,
    ratelimiter::RemoteRatelimiter,
    server::RpcServer,
};
