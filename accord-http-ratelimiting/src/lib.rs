//! # accord-http-ratelimiting
//!
//! Ratelimiting engine for the Accord ecosystem's REST client.
//!
//! The engine learns per-route budgets from response headers and enforces
//! them, together with a process-wide global bucket, before a request is
//! sent. The [`Ratelimiter`] trait is the seam: the bundled
//! [`InMemoryRatelimiter`] keeps all state in-process, while out-of-process
//! coordinators can implement the same contract so multiple processes share
//! one view of the limits.
//!
//! All operations are asynchronous through boxed futures to allow custom
//! implementations to use different backends.

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

pub mod headers;
pub mod request;

mod bucket;
mod global;
mod in_memory;
mod template;

pub use self::{
    global::{GlobalBucket, DEFAULT_PERMITS, DEFAULT_WINDOW},
    headers::RatelimitHeaders,
    in_memory::{BudgetUnderflowError, InMemoryRatelimiter},
    request::{Method, Path},
};

use std::{error::Error, fmt::Debug, future::Future, pin::Pin, time::Duration};

/// A generic error type that implements [`Error`].
pub type GenericError = Box<dyn Error + Send + Sync>;

/// Future returned by [`Ratelimiter::authorize`].
pub type AuthorizeFuture =
    Pin<Box<dyn Future<Output = Result<Duration, GenericError>> + Send + 'static>>;

/// Future returned by [`Ratelimiter::update`].
pub type UpdateFuture = Pin<Box<dyn Future<Output = Result<(), GenericError>> + Send + 'static>>;

/// A ratelimiting backend for the service's REST API.
///
/// Implementations keep track of two kinds of ratelimits:
///
/// * the global request rate, independent of routes;
/// * per-route budgets, keyed by [`Path`] fingerprint until the service
///   reveals a bucket through response headers.
///
/// Consumers ask for authorization before each request and feed every
/// response's parsed headers back in, completing the cycle.
pub trait Ratelimiter: Debug + Send + Sync {
    /// Ask to send the request identified by a fingerprint.
    ///
    /// Resolves to [`Duration::ZERO`] iff the request may proceed now, in
    /// which case a permit has been consumed. Otherwise resolves to the
    /// minimum time to wait before asking again.
    fn authorize(&self, path: &Path) -> AuthorizeFuture;

    /// Feed a response's ratelimit headers back into the backend.
    fn update(&self, path: &Path, headers: RatelimitHeaders) -> UpdateFuture;
}
