//! Identity-scoped storage namespaces.
//!
//! Every persisted key is `base + "_" + namespace`. Switching namespace only
//! redirects later reads and writes; it never copies data and never triggers
//! a pull or merge by itself.

use crate::{error::Result, KvBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Namespace used while nobody is signed in.
pub const ANONYMOUS_NAMESPACE: &str = "local";

/// Un-namespaced key remembering the active identity across restarts.
pub const CURRENT_USER_KEY: &str = "current_user";

/// A storage namespace: the anonymous sentinel or an authenticated user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// The anonymous namespace.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_NAMESPACE.to_string())
    }

    /// Resolve an identity to its namespace. A missing or blank id is anonymous.
    pub fn for_identity(user_id: Option<&str>) -> Self {
        match user_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::anonymous(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_NAMESPACE
    }

    /// The owner id to stamp on remote rows, if authenticated.
    pub fn owner(&self) -> Option<&str> {
        (!self.is_anonymous()).then_some(self.0.as_str())
    }

    /// Persisted key for `base` under this namespace.
    pub fn key(&self, base: &str) -> String {
        format!("{}_{}", base, self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks the active namespace.
#[derive(Debug)]
pub struct NamespaceManager {
    backend: Arc<dyn KvBackend>,
    current: RwLock<Namespace>,
}

impl NamespaceManager {
    /// Restore the last active identity from `backend`, defaulting to anonymous.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        let stored = match backend.get(CURRENT_USER_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read current user, using anonymous namespace");
                None
            }
        };
        let current = Namespace::for_identity(stored.as_deref());

        Self {
            backend,
            current: RwLock::new(current),
        }
    }

    /// The namespace reads and writes currently go to.
    pub fn current_namespace(&self) -> Namespace {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point subsequent reads and writes at `user_id`'s namespace (or the
    /// anonymous one for `None`).
    pub fn set_namespace(&self, user_id: Option<&str>) -> Result<Namespace> {
        let next = Namespace::for_identity(user_id);
        self.backend
            .set(CURRENT_USER_KEY, next.as_str().to_string())?;

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if *current != next {
            tracing::debug!(from = %current, to = %next, "namespace switched");
        }
        *current = next.clone();

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    #[test]
    fn defaults_to_anonymous() {
        let manager = NamespaceManager::new(Arc::new(MemoryBackend::new()));
        assert!(manager.current_namespace().is_anonymous());
        assert_eq!(manager.current_namespace().as_str(), "local");
    }

    #[test]
    fn blank_identity_is_anonymous() {
        assert!(Namespace::for_identity(None).is_anonymous());
        assert!(Namespace::for_identity(Some("")).is_anonymous());
        assert!(Namespace::for_identity(Some("  ")).is_anonymous());
        assert_eq!(Namespace::for_identity(Some("user123")).as_str(), "user123");
    }

    #[test]
    fn key_format() {
        assert_eq!(Namespace::anonymous().key("products"), "products_local");
        assert_eq!(
            Namespace::for_identity(Some("user123")).key("mutation_queue"),
            "mutation_queue_user123"
        );
    }

    #[test]
    fn owner_only_when_authenticated() {
        assert_eq!(Namespace::anonymous().owner(), None);
        assert_eq!(Namespace::for_identity(Some("u1")).owner(), Some("u1"));
    }

    #[test]
    fn set_namespace_round_trip() {
        let manager = NamespaceManager::new(Arc::new(MemoryBackend::new()));
        manager.set_namespace(Some("user123")).unwrap();
        assert_eq!(manager.current_namespace().as_str(), "user123");

        manager.set_namespace(None).unwrap();
        assert!(manager.current_namespace().is_anonymous());
    }

    #[test]
    fn identity_survives_restart() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        NamespaceManager::new(backend.clone())
            .set_namespace(Some("user123"))
            .unwrap();

        let restored = NamespaceManager::new(backend);
        assert_eq!(restored.current_namespace().as_str(), "user123");
    }
}
