//! CRUD entry point for application code.
//!
//! Every write lands in the local store first, then queues the matching
//! remote operation and schedules a background drain. A write never waits
//! for, or fails because of, the network.

use crate::engine::SyncEngine;
use crate::error::Result;
use std::sync::Arc;
use tally_engine::{
    DataSnapshot, Entity, LocalStore, Mutation, Namespace, Record, Settings, Table,
};

/// Typed access to the active namespace's collections.
#[derive(Debug, Clone)]
pub struct Repository {
    engine: Arc<SyncEngine>,
}

impl Repository {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    fn store(&self) -> &LocalStore {
        self.engine.store()
    }

    fn namespace(&self) -> Namespace {
        self.store().namespaces().current_namespace()
    }

    pub fn list<T: Record>(&self) -> Vec<T> {
        self.store().current().list()
    }

    pub fn get<T: Record>(&self, id: &str) -> Option<T> {
        self.store().current().get(id)
    }

    /// Store `record` and queue it for upload.
    ///
    /// Records that are not syncable yet (a transaction without a client)
    /// are stored but not queued.
    pub fn save<T: Record>(&self, record: T) -> Result<T> {
        let namespace = self.namespace();
        let stored = self.store().scope(&namespace).put(record)?;

        if stored.is_syncable() {
            self.engine
                .enqueue(&namespace, Mutation::upsert(stored.clone().into_entity()))?;
            self.engine.schedule_drain(namespace);
        } else {
            tracing::debug!(table = %T::TABLE, id = %stored.id(), "record kept local only");
        }

        Ok(stored)
    }

    /// [`Repository::save`] for a record whose type is known only at runtime.
    pub fn save_entity(&self, entity: Entity) -> Result<Entity> {
        Ok(match entity {
            Entity::Product(p) => self.save(p)?.into_entity(),
            Entity::Client(c) => self.save(c)?.into_entity(),
            Entity::Transaction(t) => self.save(t)?.into_entity(),
        })
    }

    /// Remove a record locally and queue the remote delete.
    pub fn delete<T: Record>(&self, id: &str) -> Result<bool> {
        self.delete_from(T::TABLE, id)
    }

    /// [`Repository::delete`] for a table known only at runtime.
    pub fn delete_from(&self, table: Table, id: &str) -> Result<bool> {
        let namespace = self.namespace();
        let existed = self.store().scope(&namespace).remove(table, id)?;

        self.engine.enqueue(&namespace, Mutation::delete(table, id))?;
        self.engine.schedule_drain(namespace);

        Ok(existed)
    }

    pub fn settings(&self) -> Settings {
        self.store().current().settings()
    }

    /// Settings are local only and never queued.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.store().current().save_settings(settings)?;
        Ok(())
    }

    pub fn export_snapshot(&self) -> DataSnapshot {
        self.store().current().export()
    }

    /// Restore a backup into the active namespace and queue every imported
    /// syncable record for upload. Returns the number of records queued.
    pub fn import_snapshot(&self, snapshot: &DataSnapshot) -> Result<usize> {
        let namespace = self.namespace();
        let scope = self.store().scope(&namespace);
        scope.import(snapshot)?;

        let mut tables = Vec::new();
        if snapshot.products.is_some() {
            tables.push(Table::Products);
        }
        if snapshot.clients.is_some() {
            tables.push(Table::Clients);
        }
        if snapshot.transactions.is_some() {
            tables.push(Table::Transactions);
        }

        let queue = scope.queue();
        let mut queued = 0;
        for table in tables {
            for entity in scope.list_entities(table) {
                if entity.is_syncable() {
                    queue.enqueue(Mutation::Upsert(entity))?;
                    queued += 1;
                }
            }
        }

        tracing::info!(namespace = %namespace, queued, "snapshot imported");
        self.engine.schedule_drain(namespace);
        Ok(queued)
    }
}
