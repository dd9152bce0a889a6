//! Durable, deduplicated mutation queue.
//!
//! The queue lives in the key-value backend under `mutation_queue_<namespace>`
//! so pending work survives restarts. It holds at most one entry per
//! `(table, id)`: enqueuing a newer operation for the same entity removes the
//! older one before appending, so a stale operation can never replay after a
//! newer one.

use crate::{error::Result, Error, KvBackend, Mutation, Namespace};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Base key of the persisted queue.
pub const QUEUE_BASE: &str = "mutation_queue";

/// The mutation queue of one namespace.
#[derive(Debug)]
pub struct MutationQueue<'a> {
    backend: &'a dyn KvBackend,
    write_lock: &'a Mutex<()>,
    key: String,
}

impl<'a> MutationQueue<'a> {
    pub(crate) fn new(
        backend: &'a dyn KvBackend,
        write_lock: &'a Mutex<()>,
        namespace: &Namespace,
    ) -> Self {
        Self {
            backend,
            write_lock,
            key: namespace.key(QUEUE_BASE),
        }
    }

    /// The backend key the queue is persisted under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Entries in enqueue order.
    ///
    /// An unreadable queue is treated as empty; individual malformed entries
    /// are dropped.
    pub fn pending(&self) -> Vec<Mutation> {
        self.try_pending().unwrap_or_else(|e| {
            tracing::warn!(key = %self.key, error = %e, "failed to read mutation queue");
            Vec::new()
        })
    }

    /// [`MutationQueue::pending`] that reports backend failures instead of
    /// reading them as empty. Every rewrite of the queue reads through this.
    pub fn try_pending(&self) -> Result<Vec<Mutation>> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(Vec::new());
        };

        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "corrupt mutation queue, treating as empty"
                );
                return Ok(Vec::new());
            }
        };

        Ok(values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Mutation>(value) {
                Ok(mutation) => Some(mutation),
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "dropping malformed queue entry");
                    None
                }
            })
            .collect())
    }

    /// Entries in drain order: grouped by table priority, enqueue order within
    /// a table.
    pub fn snapshot(&self) -> Vec<Mutation> {
        let mut entries = self.pending();
        entries.sort_by_key(|m| m.table().priority());
        entries
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    /// Append `mutation`, superseding any entry for the same `(table, id)`.
    pub fn enqueue(&self, mutation: Mutation) -> Result<()> {
        let _guard = self.lock();
        let mut entries = self.try_pending()?;
        let before = entries.len();
        entries.retain(|existing| !existing.same_target(&mutation));

        if entries.len() < before {
            tracing::debug!(
                table = %mutation.table(),
                id = %mutation.record_id(),
                "superseding queued mutation"
            );
        }

        entries.push(mutation);
        self.save(&entries)
    }

    /// Remove and return the head in drain order.
    pub fn pop_front(&self) -> Result<Option<Mutation>> {
        let _guard = self.lock();
        let mut entries = self.try_pending()?;
        entries.sort_by_key(|m| m.table().priority());
        let Some(head) = entries.into_iter().next() else {
            return Ok(None);
        };
        self.remove_entry(&head)?;
        Ok(Some(head))
    }

    /// Remove `sent` after the remote confirmed it.
    ///
    /// Only the exact entry is removed. If it was superseded while in flight,
    /// the newer entry stays queued and `false` is returned.
    pub fn acknowledge(&self, sent: &Mutation) -> Result<bool> {
        let _guard = self.lock();
        self.remove_entry(sent)
    }

    /// Drop every entry and the persisted key.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        self.backend.remove(&self.key)
    }

    // Serializes read-modify-write cycles against other writers of the store.
    fn lock(&self) -> MutexGuard<'a, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_entry(&self, target: &Mutation) -> Result<bool> {
        let mut entries = self.try_pending()?;
        match entries.iter().position(|m| m == target) {
            Some(index) => {
                entries.remove(index);
                self.save(&entries)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn save(&self, entries: &[Mutation]) -> Result<()> {
        let raw = serde_json::to_string(entries).map_err(|e| Error::encode(&self.key, e))?;
        self.backend.set(&self.key, raw)
    }
}
