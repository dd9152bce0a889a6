//! Shared helpers for sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally_engine::{LocalStore, ManualClock, MemoryBackend, Table, Timestamp};
use tally_sync::{AlwaysRetry, NetworkStatus, RemoteBackend, SyncClient, SyncError};

/// A remote call as the backend saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upsert(Table, String),
    Delete(Table, String),
    Fetch(Table),
}

#[derive(Debug, Default)]
struct State {
    rows: HashMap<Table, Vec<Value>>,
    calls: Vec<Call>,
    push_count: usize,
    fail_pushes_from: Option<usize>,
    failing_fetches: HashSet<Table>,
}

/// In-memory remote recording every call, with failure injection.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    delay: Option<Duration>,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Each push call sleeps for `delay` before completing.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::default(),
            delay: Some(delay),
        })
    }

    /// Fail the `n`-th push call (1-based) and every one after it.
    pub fn fail_pushes_from(&self, n: usize) {
        self.state.lock().unwrap().fail_pushes_from = Some(n);
    }

    pub fn fail_fetch(&self, table: Table) {
        self.state.lock().unwrap().failing_fetches.insert(table);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_pushes_from = None;
        state.failing_fetches.clear();
    }

    pub fn seed(&self, table: Table, row: Value) {
        self.state
            .lock()
            .unwrap()
            .rows
            .entry(table)
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Push calls only, in order.
    pub fn pushes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Fetch(_)))
            .collect()
    }

    fn begin_push(&self, call: Call) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.push_count += 1;
        state.calls.push(call);
        match state.fail_pushes_from {
            Some(n) if state.push_count >= n => Err(SyncError::Unavailable(format!(
                "injected failure on push {}",
                state.push_count
            ))),
            _ => Ok(()),
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn upsert(&self, table: Table, row: Value) -> tally_sync::Result<()> {
        let id = row["id"].as_str().unwrap_or_default().to_string();
        self.pause().await;
        self.begin_push(Call::Upsert(table, id))?;

        let mut state = self.state.lock().unwrap();
        let rows = state.rows.entry(table).or_default();
        match rows
            .iter()
            .position(|r| r["id"] == row["id"] && r["user_id"] == row["user_id"])
        {
            Some(i) => rows[i] = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> tally_sync::Result<()> {
        self.pause().await;
        self.begin_push(Call::Delete(table, id.to_string()))?;

        let mut state = self.state.lock().unwrap();
        if let Some(rows) = state.rows.get_mut(&table) {
            rows.retain(|r| r["id"] != id);
        }
        Ok(())
    }

    async fn fetch_all(&self, table: Table, owner: &str) -> tally_sync::Result<Vec<Value>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Fetch(table));
        if state.failing_fetches.contains(&table) {
            return Err(SyncError::Unavailable(format!("injected {table} fetch failure")));
        }
        Ok(state
            .rows
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r["user_id"] == owner)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Parse `2024-02-01`-style dates.
pub fn day(raw: &str) -> Timestamp {
    tally_engine::record::parse_timestamp(raw).unwrap()
}

/// A client over an in-memory store, online, retrying on every trigger.
pub fn client_with(remote: Arc<MemoryRemote>) -> (SyncClient, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(LocalStore::new(
        Arc::new(MemoryBackend::new()),
        clock.clone(),
    ));
    let client = SyncClient::new(
        store,
        remote,
        Arc::new(NetworkStatus::new(true)),
        Arc::new(AlwaysRetry),
    );
    (client, clock)
}

/// [`client_with`], already signed in as `user_id` without pulling.
pub fn signed_in(remote: Arc<MemoryRemote>, user_id: &str) -> (SyncClient, Arc<ManualClock>) {
    let (client, clock) = client_with(remote);
    client
        .store()
        .namespaces()
        .set_namespace(Some(user_id))
        .unwrap();
    (client, clock)
}

/// Let spawned drains run. Under paused time this also advances the clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
