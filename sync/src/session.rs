//! Sign-in and sign-out.
//!
//! Switching identity only redirects the store; the session then runs the
//! pull and drain explicitly. Offline data is reported, never included.

use crate::engine::{DrainOutcome, SyncEngine};
use crate::error::{Result, SyncError};
use crate::inclusion::OfflineInclusion;
use crate::pull::{PullReport, RemotePuller};
use std::sync::Arc;
use tally_engine::Namespace;

/// Result of [`Session::sign_in`].
#[derive(Debug)]
pub struct SignInReport {
    pub namespace: Namespace,
    pub pull: PullReport,
    pub drain: DrainOutcome,
    /// Anonymous data exists that the user may choose to include
    pub offline_data_available: bool,
}

/// Identity transitions.
#[derive(Debug)]
pub struct Session {
    engine: Arc<SyncEngine>,
    puller: Arc<RemotePuller>,
    inclusion: Arc<OfflineInclusion>,
}

impl Session {
    pub fn new(
        engine: Arc<SyncEngine>,
        puller: Arc<RemotePuller>,
        inclusion: Arc<OfflineInclusion>,
    ) -> Self {
        Self {
            engine,
            puller,
            inclusion,
        }
    }

    /// Switch to `user_id`'s namespace, pull remote state and drain.
    pub async fn sign_in(&self, user_id: &str) -> Result<SignInReport> {
        if user_id.trim().is_empty() {
            return Err(SyncError::MissingIdentity);
        }
        let namespace = self
            .engine
            .store()
            .namespaces()
            .set_namespace(Some(user_id))?;

        tracing::info!(namespace = %namespace, "signed in");

        let pull = self.puller.pull(&namespace).await;
        let drain = self.engine.drain(&namespace).await;

        Ok(SignInReport {
            offline_data_available: self.inclusion.offline_data_available(),
            namespace,
            pull,
            drain,
        })
    }

    /// Return to the anonymous namespace. Account data stays on disk.
    pub fn sign_out(&self) -> Result<Namespace> {
        let namespace = self.engine.store().namespaces().set_namespace(None)?;
        tracing::info!("signed out");
        Ok(namespace)
    }
}
