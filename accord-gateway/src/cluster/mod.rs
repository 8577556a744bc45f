//! The multi-shard orchestrator.
//!
//! A [`Cluster`] owns a set of shards and their shared identify gate, logs
//! them in one at a time, tracks each shard's initial guild snapshot, and
//! fans all events out into one stream. Ordinary dispatches from a shard
//! that is still receiving its snapshot are suppressed until the shard's
//! startup completes, unless configured otherwise.

pub mod scheme;

mod builder;
mod config;
mod event;
mod r#impl;
mod startup;

pub use self::{
    builder::ClusterBuilder,
    config::Config,
    event::Events,
    r#impl::{Cluster, ClusterStartError, ClusterStartErrorType},
    scheme::{ShardScheme, ShardSchemeError, ShardSchemeErrorType},
};
