//! Offline-data inclusion.
//!
//! Data created before signing in lives in the anonymous namespace. When the
//! user asks for it, [`OfflineInclusion::include_offline_data`] merges that
//! data into their account by last-write-wins, moves the anonymous queue over
//! and deletes the anonymous copy. It is never run automatically.

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use std::sync::Arc;
use tally_engine::{
    ChangeEvent, Client, LocalStore, Namespace, Product, Record, Scope, Table, Transaction,
};

/// Result of an inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionReport {
    /// Records appended to the account, per table
    pub added: Vec<(Table, usize)>,
    /// Account records replaced by newer anonymous ones, per table
    pub replaced: Vec<(Table, usize)>,
    /// Anonymous queue entries moved to the account's queue
    pub requeued: usize,
}

impl InclusionReport {
    /// Whether there was anything to include.
    pub fn is_empty(&self) -> bool {
        self.requeued == 0
            && self.added.iter().all(|(_, n)| *n == 0)
            && self.replaced.iter().all(|(_, n)| *n == 0)
    }
}

/// Moves anonymous data into an authenticated namespace.
#[derive(Debug)]
pub struct OfflineInclusion {
    store: Arc<LocalStore>,
    engine: Arc<SyncEngine>,
}

impl OfflineInclusion {
    pub fn new(store: Arc<LocalStore>, engine: Arc<SyncEngine>) -> Self {
        Self { store, engine }
    }

    /// Whether a signed-in user has anonymous data they could include.
    pub fn offline_data_available(&self) -> bool {
        let current = self.store.namespaces().current_namespace();
        !current.is_anonymous() && self.store.scope(&Namespace::anonymous()).has_records()
    }

    /// Merge the anonymous namespace into `user_id`'s and delete it.
    ///
    /// Calling this again once the anonymous data is gone does nothing.
    pub fn include_offline_data(&self, user_id: &str) -> Result<InclusionReport> {
        let target = Namespace::for_identity(Some(user_id));
        if target.is_anonymous() {
            return Err(SyncError::MissingIdentity);
        }

        let anonymous = self.store.scope(&Namespace::anonymous());
        let account = self.store.scope(&target);
        let pending = anonymous.queue().try_pending()?;

        let mut report = InclusionReport::default();
        if !anonymous.has_records() && pending.is_empty() {
            tracing::debug!(namespace = %target, "no offline data to include");
            return Ok(report);
        }

        include_table::<Product>(&anonymous, &account, &mut report)?;
        include_table::<Client>(&anonymous, &account, &mut report)?;
        include_table::<Transaction>(&anonymous, &account, &mut report)?;

        let account_queue = account.queue();
        for mutation in pending {
            account_queue.enqueue(mutation)?;
            report.requeued += 1;
        }

        anonymous.clear_collections()?;
        anonymous.queue().clear()?;

        for table in Table::ALL {
            self.store.notifier().notify(ChangeEvent {
                namespace: target.clone(),
                table,
            });
        }

        tracing::info!(
            namespace = %target,
            requeued = report.requeued,
            "offline data included"
        );

        self.engine.schedule_drain(target);
        Ok(report)
    }
}

fn include_table<T: Record>(
    anonymous: &Scope<'_>,
    account: &Scope<'_>,
    report: &mut InclusionReport,
) -> Result<()> {
    // The anonymous side plays the incoming role.
    let result = account.merge(anonymous.try_list::<T>()?)?;
    report.added.push((T::TABLE, result.added.len()));
    report.replaced.push((T::TABLE, result.replaced().count()));
    Ok(())
}
