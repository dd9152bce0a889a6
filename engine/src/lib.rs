//! # Tally Engine
//!
//! The local half of a local-first sync layer for a small business records
//! app: clients, products and the transactions between them.
//!
//! This crate owns everything that happens on the device. It has no network
//! code; pushing and pulling live in `tally-sync`, which drives this crate.
//!
//! ## Design Principles
//!
//! - **Offline first**: local writes never depend on the network
//! - **Namespaced**: each identity gets its own collections and queue
//! - **Typed at the boundary**: stored JSON is validated into typed records
//! - **Pluggable IO**: storage and time come in through the [`KvBackend`] and
//!   [`Clock`] ports
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! [`Product`], [`Client`] and [`Transaction`] share an `{id, updatedAt}`
//! base through the [`Record`] trait. [`Entity`] is the runtime union.
//!
//! ### Namespaces
//!
//! A [`Namespace`] is either the anonymous `"local"` sentinel or a user id.
//! Every persisted key is `base + "_" + namespace`.
//!
//! ### Mutation Queue
//!
//! Local writes enqueue a [`Mutation`] on the namespace's [`MutationQueue`].
//! The queue keeps one entry per `(table, id)` and drains products before
//! clients before transactions.
//!
//! ### Merging
//!
//! [`merge_by_id`] reconciles two collections by last-write-wins on
//! `updatedAt`. Pull and offline-data inclusion both use it.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_engine::{Client, LocalStore, MemoryBackend, Mutation, SystemClock};
//!
//! let store = LocalStore::new(Arc::new(MemoryBackend::new()), Arc::new(SystemClock));
//! let scope = store.current();
//!
//! let client = scope.put(Client::new("c1", "Anna Nowak")).unwrap();
//! scope.queue().enqueue(Mutation::upsert(client)).unwrap();
//!
//! assert_eq!(scope.list::<Client>().len(), 1);
//! assert_eq!(scope.queue().len(), 1);
//! ```

pub mod backend;
pub mod clock;
pub mod error;
pub mod namespace;
pub mod notifier;
pub mod operation;
pub mod queue;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod settings;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use backend::{KvBackend, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use namespace::{Namespace, NamespaceManager, ANONYMOUS_NAMESPACE};
pub use notifier::{ChangeEvent, ChangeNotifier, ChangeReceiver, SubscriptionId};
pub use operation::{Mutation, MutationKind};
pub use queue::MutationQueue;
pub use reconcile::{merge_by_id, Conflict, MergeResult, Resolution};
pub use record::{
    Client, Entity, ItemType, PaymentMethod, Product, Record, Table, Transaction,
    TransactionItem, TransactionStatus,
};
pub use settings::Settings;
pub use snapshot::DataSnapshot;
pub use store::{LocalStore, Scope};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
