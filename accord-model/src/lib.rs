//! # accord-model
//!
//! Wire types for the Accord ecosystem of crates.
//!
//! This crate is deliberately small: it contains the gateway envelope, the
//! opcodes and payloads that connection management reads, and the connection
//! information returned by the REST API. Dispatch payloads are carried as raw
//! JSON values; entity models live with the consumers that need them.

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

pub mod gateway;
