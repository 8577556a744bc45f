//! # accord-http
//!
//! REST API client for the Accord ecosystem.
//!
//! The client serializes every request through the ratelimiting engine of
//! [`accord-http-ratelimiting`]: a request waits in its fingerprint's queue
//! until the engine authorizes it, the transport runs, and the response's
//! ratelimit headers feed back into the engine. Typed request builders for
//! individual routes are intentionally out of scope; [`Request`] is the
//! generic surface.
//!
//! [`accord-http-ratelimiting`]: accord_http_ratelimiting

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
    clippy::must_use_candidate
)]

pub mod client;
pub mod error;
pub mod request;
pub mod response;

mod queue;

pub use accord_http_ratelimiting as ratelimiting;

pub use self::{
    client::{Client, ClientBuilder},
    error::{Error, ErrorType},
    request::Request,
    response::Response,
};
pub use accord_http_ratelimiting::Method;
