//! Remote-to-local convergence.
//!
//! A pull fetches every remote row the identity owns, converts the rows to
//! the local schema and merges them into the local collections by
//! last-write-wins. Tables are independent: a failed fetch leaves that table
//! untouched and the others still merge. Malformed rows are skipped.

use crate::error::{Result, SyncError};
use crate::remote::RemoteBackend;
use std::sync::Arc;
use tally_engine::{
    reconcile::decode_records, schema, Client, LocalStore, Namespace, Product, Record, Scope,
    Table, Transaction,
};

/// What a pull did to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub added: usize,
    pub replaced: usize,
}

/// Result of [`RemotePuller::pull`].
#[derive(Debug, Default)]
pub struct PullReport {
    /// Tables that were fetched and merged
    pub merged: Vec<(Table, TableSummary)>,
    /// Tables whose fetch or write failed; left unchanged
    pub failed: Vec<(Table, SyncError)>,
}

impl PullReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self, table: Table) -> Option<&TableSummary> {
        self.merged
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, summary)| summary)
    }
}

/// Fetches remote state and merges it locally.
pub struct RemotePuller {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteBackend>,
}

impl RemotePuller {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteBackend>) -> Self {
        Self { store, remote }
    }

    /// Merge every remote table into `namespace`.
    ///
    /// The anonymous namespace has nothing on the remote; pulling it is a
    /// no-op.
    pub async fn pull(&self, namespace: &Namespace) -> PullReport {
        let mut report = PullReport::default();
        let Some(owner) = namespace.owner() else {
            return report;
        };
        let scope = self.store.scope(namespace);

        for table in Table::ALL {
            let result = match table {
                Table::Products => self.pull_table::<Product>(&scope, owner).await,
                Table::Clients => self.pull_table::<Client>(&scope, owner).await,
                Table::Transactions => self.pull_table::<Transaction>(&scope, owner).await,
            };

            match result {
                Ok(summary) => {
                    tracing::debug!(
                        namespace = %namespace,
                        table = %table,
                        fetched = summary.fetched,
                        added = summary.added,
                        replaced = summary.replaced,
                        "table pulled"
                    );
                    report.merged.push((table, summary));
                }
                Err(error) => {
                    tracing::warn!(
                        namespace = %namespace,
                        table = %table,
                        error = %error,
                        "pull failed, keeping local table"
                    );
                    report.failed.push((table, error));
                }
            }
        }

        report
    }

    async fn pull_table<T: Record>(&self, scope: &Scope<'_>, owner: &str) -> Result<TableSummary> {
        let rows = self.remote.fetch_all(T::TABLE, owner).await?;
        let fetched = rows.len();

        let (incoming, skipped) =
            decode_records::<T>(rows.into_iter().map(schema::from_remote_row).collect());
        let result = scope.merge(incoming)?;

        Ok(TableSummary {
            fetched,
            skipped,
            added: result.added.len(),
            replaced: result.replaced().count(),
        })
    }
}

impl std::fmt::Debug for RemotePuller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePuller").finish_non_exhaustive()
    }
}
