//! Queue draining.
//!
//! The [`SyncEngine`] pushes a namespace's mutation queue to the remote, one
//! entry at a time in priority order. At most one drain runs at a time; a
//! concurrent call returns immediately. The first failed remote call stops
//! the drain and leaves that entry and everything after it queued for the
//! next trigger.

use crate::error::{Result, SyncError};
use crate::network::NetworkStatus;
use crate::policy::{AlwaysRetry, FailureState, RetryPolicy};
use crate::remote::RemoteBackend;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tally_engine::{schema, LocalStore, Mutation, Namespace};
use tokio::time::Instant;

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another drain is in flight
    AlreadyRunning,
    /// The network is reported unreachable
    Offline,
    /// Anonymous data has no owner to push under
    Anonymous,
    /// The retry policy asked to wait
    Backoff,
}

/// Result of one [`SyncEngine::drain`] call.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Nothing was attempted
    Skipped(SkipReason),
    /// The queue was emptied
    Completed { pushed: usize },
    /// A remote call failed; `remaining` entries are still queued
    Stopped {
        pushed: usize,
        remaining: usize,
        error: SyncError,
    },
}

impl DrainOutcome {
    /// Entries confirmed by the remote during this drain.
    pub fn pushed(&self) -> usize {
        match self {
            DrainOutcome::Skipped(_) => 0,
            DrainOutcome::Completed { pushed } | DrainOutcome::Stopped { pushed, .. } => *pushed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DrainOutcome::Completed { .. })
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pushes queued mutations to the remote.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    network: Arc<NetworkStatus>,
    policy: Arc<dyn RetryPolicy>,
    in_flight: AtomicBool,
    failures: Mutex<HashMap<Namespace, FailureState>>,
}

impl SyncEngine {
    /// Create an engine that retries on every trigger.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteBackend>,
        network: Arc<NetworkStatus>,
    ) -> Self {
        Self {
            store,
            remote,
            network,
            policy: Arc::new(AlwaysRetry),
            in_flight: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn network(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    /// Whether a drain is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Failure bookkeeping for `namespace`.
    pub fn failure_state(&self, namespace: &Namespace) -> FailureState {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .copied()
            .unwrap_or_default()
    }

    /// Queue `mutation` under `namespace` without draining.
    pub fn enqueue(&self, namespace: &Namespace, mutation: Mutation) -> Result<()> {
        self.store.scope(namespace).queue().enqueue(mutation)?;
        Ok(())
    }

    /// Queue `mutation` under the active namespace and schedule a drain.
    pub fn enqueue_and_sync(self: &Arc<Self>, mutation: Mutation) -> Result<()> {
        let namespace = self.store.namespaces().current_namespace();
        self.enqueue(&namespace, mutation)?;
        self.schedule_drain(namespace);
        Ok(())
    }

    /// Spawn a drain of `namespace` on the current tokio runtime.
    ///
    /// Returns `false` when called outside a runtime; the entry stays queued
    /// for the next trigger.
    pub fn schedule_drain(self: &Arc<Self>, namespace: Namespace) -> bool {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(self);
                handle.spawn(async move {
                    engine.drain(&namespace).await;
                });
                true
            }
            Err(_) => {
                tracing::debug!(namespace = %namespace, "no runtime, drain deferred");
                false
            }
        }
    }

    /// Drain the active namespace.
    pub async fn drain_current(&self) -> DrainOutcome {
        let namespace = self.store.namespaces().current_namespace();
        self.drain(&namespace).await
    }

    /// Push `namespace`'s queue until it is empty or a remote call fails.
    pub async fn drain(&self, namespace: &Namespace) -> DrainOutcome {
        if !self.network.is_online() {
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        let Some(owner) = namespace.owner() else {
            return DrainOutcome::Skipped(SkipReason::Anonymous);
        };
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!(namespace = %namespace, "drain already in flight");
            return DrainOutcome::Skipped(SkipReason::AlreadyRunning);
        };
        if !self
            .policy
            .should_attempt(&self.failure_state(namespace), Instant::now())
        {
            tracing::debug!(namespace = %namespace, "drain deferred by retry policy");
            return DrainOutcome::Skipped(SkipReason::Backoff);
        }

        let queue = self.store.scope(namespace).queue();
        let mut pushed = 0;

        // The snapshot is re-read every step so entries enqueued meanwhile
        // are picked up in priority order.
        while let Some(head) = queue.snapshot().into_iter().next() {
            if let Err(error) = self.send(&head, owner).await {
                tracing::warn!(
                    namespace = %namespace,
                    table = %head.table(),
                    id = %head.record_id(),
                    error = %error,
                    "remote call failed, stopping drain"
                );
                return self.stopped(namespace, pushed, queue.len(), error);
            }

            match queue.acknowledge(&head) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(
                    table = %head.table(),
                    id = %head.record_id(),
                    "entry superseded while in flight"
                ),
                Err(e) => return self.stopped(namespace, pushed, queue.len(), e.into()),
            }
            pushed += 1;
        }

        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace);

        if pushed > 0 {
            tracing::info!(namespace = %namespace, pushed, "queue drained");
        }
        DrainOutcome::Completed { pushed }
    }

    async fn send(&self, mutation: &Mutation, owner: &str) -> Result<()> {
        match mutation {
            Mutation::Upsert(entity) => {
                let row = schema::to_remote_row(entity, owner)?;
                self.remote.upsert(entity.table(), row).await
            }
            Mutation::Delete { table, id } => self.remote.delete(*table, id).await,
        }
    }

    fn stopped(
        &self,
        namespace: &Namespace,
        pushed: usize,
        remaining: usize,
        error: SyncError,
    ) -> DrainOutcome {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(namespace.clone())
            .or_default()
            .record_failure(Instant::now());

        DrainOutcome::Stopped {
            pushed,
            remaining,
            error,
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("policy", &self.policy)
            .field("in_flight", &self.is_draining())
            .finish_non_exhaustive()
    }
}
