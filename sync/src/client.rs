//! Wiring of the whole sync layer.

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::Result;
use crate::file_backend::FileBackend;
use crate::inclusion::OfflineInclusion;
use crate::network::NetworkStatus;
use crate::policy::{AlwaysRetry, ExponentialBackoff, RetryPolicy};
use crate::pull::RemotePuller;
use crate::remote::RemoteBackend;
use crate::repository::Repository;
use crate::rest::RestRemote;
use crate::session::Session;
use crate::triggers::{spawn_triggers, TriggerHandle};
use std::sync::Arc;
use std::time::Duration;
use tally_engine::{ChangeReceiver, LocalStore, SubscriptionId, SystemClock};

/// First backoff step when a backoff ceiling is configured.
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Every component of the sync layer, constructed once and shared.
#[derive(Debug, Clone)]
pub struct SyncClient {
    store: Arc<LocalStore>,
    network: Arc<NetworkStatus>,
    engine: Arc<SyncEngine>,
    puller: Arc<RemotePuller>,
    inclusion: Arc<OfflineInclusion>,
    repository: Repository,
    session: Arc<Session>,
    rest: Option<Arc<RestRemote>>,
    sync_interval: Duration,
}

impl SyncClient {
    /// Build a client persisting to `config.data_dir` and syncing to the
    /// configured REST remote.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let backend = FileBackend::open(&config.data_dir)?;
        let store = Arc::new(LocalStore::new(Arc::new(backend), Arc::new(SystemClock)));
        let rest = Arc::new(RestRemote::new(&config.remote_url, &config.remote_key)?);

        let policy: Arc<dyn RetryPolicy> = match config.retry_backoff_max {
            Some(max) => Arc::new(ExponentialBackoff::new(INITIAL_BACKOFF.min(max), max)),
            None => Arc::new(AlwaysRetry),
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            remote = %config.remote_url,
            "sync client initialised"
        );

        let mut client = Self::new(
            store,
            rest.clone(),
            Arc::new(NetworkStatus::default()),
            policy,
        );
        client.rest = Some(rest);
        client.sync_interval = config.sync_interval;
        Ok(client)
    }

    /// Build a client from explicit parts.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteBackend>,
        network: Arc<NetworkStatus>,
        policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        let engine = Arc::new(
            SyncEngine::new(store.clone(), remote.clone(), network.clone()).with_policy(policy),
        );
        let puller = Arc::new(RemotePuller::new(store.clone(), remote));
        let inclusion = Arc::new(OfflineInclusion::new(store.clone(), engine.clone()));
        let session = Arc::new(Session::new(
            engine.clone(),
            puller.clone(),
            inclusion.clone(),
        ));

        Self {
            repository: Repository::new(engine.clone()),
            store,
            network,
            engine,
            puller,
            inclusion,
            session,
            rest: None,
            sync_interval: crate::config::DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn network(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn puller(&self) -> &Arc<RemotePuller> {
        &self.puller
    }

    pub fn inclusion(&self) -> &Arc<OfflineInclusion> {
        &self.inclusion
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Pass the session access token to the REST remote, if one is in use.
    pub fn set_access_token(&self, token: Option<String>) {
        if let Some(rest) = &self.rest {
            rest.set_access_token(token);
        }
    }

    /// Subscribe to collection change events.
    pub fn subscribe(&self) -> (SubscriptionId, ChangeReceiver) {
        self.store.notifier().subscribe()
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        self.store.notifier().unsubscribe(id)
    }

    /// Start the start/online/interval drain triggers.
    pub fn start_triggers(&self) -> TriggerHandle {
        spawn_triggers(self.engine.clone(), self.sync_interval)
    }

    /// Use a different periodic drain interval for [`SyncClient::start_triggers`].
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_engine::{Client, Namespace};

    fn config(dir: &std::path::Path) -> SyncConfig {
        let mut config = SyncConfig::new("http://127.0.0.1:1", "key");
        config.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn file_backed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let client = SyncClient::from_config(&config(dir.path())).unwrap();
        client
            .store()
            .namespaces()
            .set_namespace(Some("alice"))
            .unwrap();
        client.repository().save(Client::new("c1", "Ann")).unwrap();
        drop(client);

        let reopened = SyncClient::from_config(&config(dir.path())).unwrap();
        let alice = Namespace::for_identity(Some("alice"));
        assert_eq!(reopened.store().namespaces().current_namespace(), alice);
        assert_eq!(reopened.repository().list::<Client>().len(), 1);
        // No runtime: the upload stays queued.
        assert_eq!(reopened.store().scope(&alice).queue().len(), 1);
    }

    #[test]
    fn backoff_ceiling_selects_exponential_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.retry_backoff_max = Some(Duration::from_secs(2));

        let client = SyncClient::from_config(&config).unwrap();

        let debug = format!("{:?}", client.engine());
        assert!(debug.contains("ExponentialBackoff"));
        assert!(debug.contains("initial: 2s"));
    }
}
