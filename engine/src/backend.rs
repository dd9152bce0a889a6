//! Key-value persistence port.
//!
//! The store serializes each collection as one JSON string under one key, so
//! a backend only needs whole-value get/set/remove.

use crate::error::Result;
use dashmap::DashMap;
use std::fmt::Debug;

/// Synchronous string key-value storage.
pub trait KvBackend: Send + Sync + Debug {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory backend, used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Memory backend whose reads can be made to fail.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FlakyBackend {
    pub(crate) fn fail_reads(&self, failing: bool) {
        use std::sync::atomic::Ordering;
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl KvBackend for FlakyBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        use std::sync::atomic::Ordering;
        if self.failing.load(Ordering::SeqCst) {
            return Err(crate::Error::Backend(format!("read of {key} failed")));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}
