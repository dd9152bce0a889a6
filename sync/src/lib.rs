//! # Tally Sync
//!
//! Background synchronization between the local store of `tally-engine` and
//! a remote multi-tenant table service.
//!
//! ## Flow
//!
//! - Application code writes through the [`Repository`]. The write commits
//!   locally, queues a remote operation and schedules a drain.
//! - The [`SyncEngine`] drains the queue in priority order and stops at the
//!   first failure, leaving the rest for the next trigger.
//! - The [`RemotePuller`] merges remote state back by last-write-wins.
//! - [`OfflineInclusion`] moves anonymous data into an account when the
//!   user asks for it.
//! - [`spawn_triggers`] drains at start, when the network returns, and
//!   periodically.
//!
//! [`SyncClient`] wires all of this from a [`SyncConfig`].

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_backend;
pub mod inclusion;
pub mod network;
pub mod policy;
pub mod pull;
pub mod remote;
pub mod repository;
pub mod rest;
pub mod session;
pub mod telemetry;
pub mod triggers;

pub use client::SyncClient;
pub use config::{ConfigError, SyncConfig};
pub use engine::{DrainOutcome, SkipReason, SyncEngine};
pub use error::{Result, SyncError};
pub use file_backend::FileBackend;
pub use inclusion::{InclusionReport, OfflineInclusion};
pub use network::NetworkStatus;
pub use policy::{AlwaysRetry, ExponentialBackoff, FailureState, RetryPolicy};
pub use pull::{PullReport, RemotePuller, TableSummary};
pub use remote::RemoteBackend;
pub use repository::Repository;
pub use rest::RestRemote;
pub use session::{Session, SignInReport};
pub use triggers::{spawn_triggers, TriggerHandle};
