//! Local collection store.
//!
//! The [`LocalStore`] owns the on-device copy of every namespace. Each
//! collection is one JSON array stored under `table + "_" + namespace` in the
//! key-value backend, and every call is a single read-modify-write of that
//! array.
//!
//! Reads go through a [`Scope`], a view bound to one namespace. Local writes
//! (`put`, `remove_by_id`) stamp `updatedAt` from the store's clock; raw
//! writes (`merge`, `replace_all`, `import`) keep the timestamps they are
//! given and are reserved for pull, inclusion and restore. Every successful
//! collection write publishes a [`ChangeEvent`].

use crate::{
    error::Result, merge_by_id, reconcile::decode_records, record::parse_timestamp, ChangeEvent,
    ChangeNotifier, Client, Clock, DataSnapshot, Entity, Error, KvBackend, MergeResult,
    MutationQueue, Namespace, NamespaceManager, Product, Record, Settings, Table, Timestamp,
    Transaction,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Base key of the settings object.
pub const SETTINGS_BASE: &str = "settings";

/// Base key of the last-import marker.
pub const LAST_IMPORT_BASE: &str = "last_import_timestamp";

/// Namespaced persistence for entity collections, settings and the queue.
#[derive(Debug)]
pub struct LocalStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    namespaces: NamespaceManager,
    notifier: Arc<ChangeNotifier>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Open a store on `backend`, restoring the last active namespace.
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            namespaces: NamespaceManager::new(backend.clone()),
            backend,
            clock,
            notifier: Arc::new(ChangeNotifier::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    /// The notifier every collection write publishes to.
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    /// View of the active namespace.
    pub fn current(&self) -> Scope<'_> {
        self.scope(&self.namespaces.current_namespace())
    }

    /// View of an arbitrary namespace.
    pub fn scope(&self, namespace: &Namespace) -> Scope<'_> {
        Scope {
            store: self,
            namespace: namespace.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`LocalStore`] bound to one namespace.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    store: &'a LocalStore,
    namespace: Namespace,
}

impl<'a> Scope<'a> {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// All records of `T`'s table, in stored order.
    ///
    /// A collection that cannot be read or parsed is treated as empty;
    /// individual malformed records are skipped.
    pub fn list<T: Record>(&self) -> Vec<T> {
        self.try_list().unwrap_or_else(|e| {
            tracing::warn!(
                namespace = %self.namespace,
                table = %T::TABLE,
                error = %e,
                "failed to read collection"
            );
            Vec::new()
        })
    }

    /// [`Scope::list`] that reports backend failures instead of reading them
    /// as empty. Unparseable content still reads as empty.
    ///
    /// Every read-modify-write goes through this, so a failed read can never
    /// be written back over the stored collection.
    pub fn try_list<T: Record>(&self) -> Result<Vec<T>> {
        let key = self.namespace.key(T::TABLE.as_str());
        let Some(raw) = self.store.backend.get(&key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(rows) => {
                let (records, skipped) = decode_records(rows);
                if skipped > 0 {
                    tracing::warn!(key = %key, skipped, "skipped malformed records");
                }
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "corrupt collection, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// A single record by id.
    pub fn get<T: Record>(&self, id: &str) -> Option<T> {
        self.list::<T>().into_iter().find(|r| r.id() == id)
    }

    /// Upsert `record` by id.
    ///
    /// A blank id is replaced by a fresh UUID. `updatedAt` is always set to
    /// the store clock, whatever the caller supplied. New ids are appended;
    /// existing ones are replaced in place. Returns the stored record.
    pub fn put<T: Record>(&self, mut record: T) -> Result<T> {
        let now = self.store.clock.now();
        if record.id().trim().is_empty() {
            record.set_id(uuid::Uuid::new_v4().to_string());
        }
        record.normalize(now);
        record.set_updated_at(now);

        let _guard = self.store.lock();
        let mut records = self.try_list::<T>()?;
        match records.iter().position(|r| r.id() == record.id()) {
            Some(i) => records[i] = record.clone(),
            None => records.push(record.clone()),
        }
        self.write(&records)?;

        tracing::debug!(
            namespace = %self.namespace,
            table = %T::TABLE,
            id = %record.id(),
            "record stored"
        );

        Ok(record)
    }

    /// [`Scope::put`] for a record whose type is only known at runtime.
    pub fn put_entity(&self, entity: Entity) -> Result<Entity> {
        Ok(match entity {
            Entity::Product(p) => self.put(p)?.into_entity(),
            Entity::Client(c) => self.put(c)?.into_entity(),
            Entity::Transaction(t) => self.put(t)?.into_entity(),
        })
    }

    /// Remove the record with `id`. Returns whether it existed.
    pub fn remove_by_id<T: Record>(&self, id: &str) -> Result<bool> {
        let _guard = self.store.lock();
        let mut records = self.try_list::<T>()?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records)?;

        tracing::debug!(namespace = %self.namespace, table = %T::TABLE, id, "record removed");
        Ok(true)
    }

    /// [`Scope::remove_by_id`] for a table known only at runtime.
    pub fn remove(&self, table: Table, id: &str) -> Result<bool> {
        match table {
            Table::Products => self.remove_by_id::<Product>(id),
            Table::Clients => self.remove_by_id::<Client>(id),
            Table::Transactions => self.remove_by_id::<Transaction>(id),
        }
    }

    /// Overwrite the whole collection, keeping the records as given.
    ///
    /// Only merge and restore write this way; local edits go through
    /// [`Scope::put`].
    pub fn replace_all<T: Record>(&self, records: &[T]) -> Result<()> {
        let _guard = self.store.lock();
        self.write(records)
    }

    /// Merge `incoming` into the collection by last-write-wins and store the
    /// result if anything changed. See [`merge_by_id`].
    pub fn merge<T: Record>(&self, incoming: Vec<T>) -> Result<MergeResult<T>> {
        let _guard = self.store.lock();
        let result = merge_by_id(self.try_list::<T>()?, incoming);
        if result.changed() {
            self.write(&result.records)?;
        }
        Ok(result)
    }

    /// All records of `table` as entities.
    pub fn list_entities(&self, table: Table) -> Vec<Entity> {
        match table {
            Table::Products => into_entities(self.list::<Product>()),
            Table::Clients => into_entities(self.list::<Client>()),
            Table::Transactions => into_entities(self.list::<Transaction>()),
        }
    }

    /// Whether any collection of this namespace holds a record.
    pub fn has_records(&self) -> bool {
        !self.list::<Product>().is_empty()
            || !self.list::<Client>().is_empty()
            || !self.list::<Transaction>().is_empty()
    }

    /// Delete every collection of this namespace. Settings and the queue are
    /// left alone.
    pub fn clear_collections(&self) -> Result<()> {
        let _guard = self.store.lock();
        for table in Table::ALL {
            self.store
                .backend
                .remove(&self.namespace.key(table.as_str()))?;
            self.publish(table);
        }
        Ok(())
    }

    /// The mutation queue of this namespace.
    pub fn queue(&self) -> MutationQueue<'a> {
        MutationQueue::new(
            self.store.backend.as_ref(),
            &self.store.write_lock,
            &self.namespace,
        )
    }

    /// Stored settings, with defaults for anything missing or unreadable.
    pub fn settings(&self) -> Settings {
        let key = self.namespace.key(SETTINGS_BASE);
        let Some(raw) = self.read_raw(&key) else {
            return Settings::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "corrupt settings, using defaults");
            Settings::default()
        })
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let key = self.namespace.key(SETTINGS_BASE);
        let raw = serde_json::to_string(settings).map_err(|e| Error::encode(&key, e))?;
        self.store.backend.set(&key, raw)
    }

    /// Restore default settings.
    pub fn reset_settings(&self) -> Result<Settings> {
        let defaults = Settings::default();
        self.save_settings(&defaults)?;
        Ok(defaults)
    }

    /// When a snapshot was last imported into this namespace.
    pub fn last_import(&self) -> Option<Timestamp> {
        self.read_raw(&self.namespace.key(LAST_IMPORT_BASE))
            .and_then(|raw| parse_timestamp(&raw))
    }

    pub fn mark_imported(&self, at: Timestamp) -> Result<()> {
        self.store
            .backend
            .set(&self.namespace.key(LAST_IMPORT_BASE), at.to_rfc3339())
    }

    /// Everything in this namespace, stamped with the current time.
    pub fn export(&self) -> DataSnapshot {
        DataSnapshot {
            products: Some(self.list()),
            clients: Some(self.list()),
            transactions: Some(self.list()),
            settings: Some(self.settings()),
            exported_at: Some(self.store.clock.now()),
        }
    }

    /// Restore `snapshot` into this namespace.
    ///
    /// Tables present in the snapshot replace the local ones wholesale;
    /// absent tables are untouched. Record timestamps are kept as exported.
    pub fn import(&self, snapshot: &DataSnapshot) -> Result<()> {
        if let Some(products) = &snapshot.products {
            self.replace_all(products)?;
        }
        if let Some(clients) = &snapshot.clients {
            self.replace_all(clients)?;
        }
        if let Some(transactions) = &snapshot.transactions {
            self.replace_all(transactions)?;
        }
        if let Some(settings) = &snapshot.settings {
            self.save_settings(settings)?;
        }
        self.mark_imported(self.store.clock.now())?;

        tracing::debug!(
            namespace = %self.namespace,
            records = snapshot.record_count(),
            "snapshot imported"
        );
        Ok(())
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.backend.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read from backend");
                None
            }
        }
    }

    // Callers hold the store write lock.
    fn write<T: Record>(&self, records: &[T]) -> Result<()> {
        let key = self.namespace.key(T::TABLE.as_str());
        let raw = serde_json::to_string(records).map_err(|e| Error::encode(&key, e))?;
        self.store.backend.set(&key, raw)?;
        self.publish(T::TABLE);
        Ok(())
    }

    fn publish(&self, table: Table) {
        self.store.notifier.notify(ChangeEvent {
            namespace: self.namespace.clone(),
            table,
        });
    }
}

fn into_entities<T: Record>(records: Vec<T>) -> Vec<Entity> {
    records.into_iter().map(Record::into_entity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FlakyBackend;
    use crate::{ManualClock, MemoryBackend, Mutation};
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn store() -> (LocalStore, Arc<ManualClock>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = LocalStore::new(backend.clone(), clock.clone());
        (store, clock, backend)
    }

    #[test]
    fn put_stamps_updated_at() {
        let (store, _, _) = store();
        let mut client = Client::new("c1", "Anna");
        client.updated_at = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());

        let stored = store.current().put(client).unwrap();
        assert_eq!(stored.updated_at, Some(start()));
        assert_eq!(
            store.current().get::<Client>("c1").unwrap().updated_at,
            Some(start())
        );
    }

    #[test]
    fn put_replaces_in_place_and_appends_new() {
        let (store, clock, _) = store();
        let scope = store.current();
        scope.put(Client::new("a", "A")).unwrap();
        scope.put(Client::new("b", "B")).unwrap();

        clock.advance(Duration::seconds(5));
        scope.put(Client::new("a", "A2")).unwrap();

        let clients = scope.list::<Client>();
        let names: Vec<_> = clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A2", "B"]);
        assert_eq!(clients[0].updated_at, Some(start() + Duration::seconds(5)));
    }

    #[test]
    fn put_assigns_missing_id() {
        let (store, _, _) = store();
        let stored = store.current().put(Client::new("", "Anna")).unwrap();
        assert!(!stored.id.is_empty());
        assert_eq!(store.current().list::<Client>()[0].id, stored.id);
    }

    #[test]
    fn put_normalizes() {
        let (store, _, _) = store();
        let mut product = Product::new("p1", "Drops", 5.0);
        product.unit = "  ".into();
        let stored = store.current().put(product).unwrap();
        assert_eq!(stored.unit, "pcs");

        let tx = store.current().put(Transaction::new("t1", "c1")).unwrap();
        assert_eq!(tx.date, Some(start()));
    }

    #[test]
    fn remove_by_id() {
        let (store, _, _) = store();
        let scope = store.current();
        scope.put(Product::new("p1", "A", 1.0)).unwrap();
        scope.put(Product::new("p2", "B", 2.0)).unwrap();

        assert!(scope.remove(Table::Products, "p1").unwrap());
        assert!(!scope.remove(Table::Products, "p1").unwrap());
        assert_eq!(scope.list::<Product>().len(), 1);
    }

    #[test]
    fn failed_read_never_overwrites_collection() {
        let backend = Arc::new(FlakyBackend::default());
        let store = LocalStore::new(backend.clone(), Arc::new(ManualClock::new(start())));
        let scope = store.current();
        scope.put(Client::new("a", "A")).unwrap();
        scope.put(Client::new("b", "B")).unwrap();

        backend.fail_reads(true);
        assert!(matches!(
            scope.put(Client::new("c", "C")),
            Err(Error::Backend(_))
        ));
        assert!(matches!(
            scope.remove(Table::Clients, "a"),
            Err(Error::Backend(_))
        ));
        assert!(matches!(
            scope.merge(vec![Client::new("d", "D")]),
            Err(Error::Backend(_))
        ));
        assert!(scope.list::<Client>().is_empty());

        backend.fail_reads(false);
        let ids: Vec<_> = scope.list::<Client>().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn corrupt_collection_reads_empty() {
        let (store, _, backend) = store();
        backend.set("clients_local", "{oops".into()).unwrap();
        assert!(store.current().list::<Client>().is_empty());
    }

    #[test]
    fn malformed_records_are_skipped() {
        let (store, _, backend) = store();
        backend
            .set(
                "clients_local",
                r#"[{"id":"c1","name":"Anna"},{"name":"no id"}]"#.into(),
            )
            .unwrap();
        let clients = store.current().list::<Client>();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, "c1");
    }

    #[test]
    fn writes_publish_events() {
        let (store, _, _) = store();
        let (_id, mut rx) = store.notifier().subscribe();

        store.current().put(Client::new("c1", "Anna")).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.table, Table::Clients);
        assert!(event.namespace.is_anonymous());

        store.current().remove(Table::Clients, "c1").unwrap();
        assert_eq!(rx.try_recv().unwrap().table, Table::Clients);

        // Removing a missing record writes nothing.
        store.current().remove(Table::Clients, "c1").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn namespaces_are_isolated() {
        let (store, _, _) = store();
        store.current().put(Client::new("anon", "Anon")).unwrap();

        store.namespaces().set_namespace(Some("user123")).unwrap();
        assert!(store.current().list::<Client>().is_empty());
        store.current().put(Client::new("u", "User")).unwrap();

        store.namespaces().set_namespace(None).unwrap();
        let clients = store.current().list::<Client>();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, "anon");
    }

    #[test]
    fn replace_all_keeps_timestamps() {
        let (store, _, _) = store();
        let mut client = Client::new("c1", "Anna");
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        client.updated_at = Some(old);

        store.current().replace_all(&[client]).unwrap();
        assert_eq!(store.current().list::<Client>()[0].updated_at, Some(old));
    }

    #[test]
    fn merge_writes_only_on_change() {
        let (store, _, _) = store();
        let scope = store.current();
        scope.put(Client::new("a", "A")).unwrap();
        let (_id, mut rx) = store.notifier().subscribe();

        let mut stale = Client::new("a", "stale");
        stale.updated_at = Some(start() - Duration::days(1));
        let result = scope.merge(vec![stale]).unwrap();
        assert!(!result.changed());
        assert!(rx.try_recv().is_err());

        let result = scope.merge(vec![Client::new("b", "B")]).unwrap();
        assert_eq!(result.added, vec!["b".to_string()]);
        assert_eq!(rx.try_recv().unwrap().table, Table::Clients);
        assert_eq!(scope.list::<Client>().len(), 2);
    }

    #[test]
    fn clear_collections_keeps_queue() {
        let (store, _, backend) = store();
        let scope = store.current();
        scope.put(Client::new("c1", "Anna")).unwrap();
        scope
            .queue()
            .enqueue(Mutation::delete(Table::Clients, "c1"))
            .unwrap();
        assert!(scope.has_records());

        scope.clear_collections().unwrap();
        assert!(!scope.has_records());
        assert!(!backend.contains("clients_local"));
        assert_eq!(scope.queue().len(), 1);
    }

    #[test]
    fn settings_default_and_persist() {
        let (store, _, _) = store();
        let scope = store.current();
        assert_eq!(scope.settings(), Settings::default());

        let mut settings = Settings::default();
        settings.theme = "dark".into();
        scope.save_settings(&settings).unwrap();
        assert_eq!(scope.settings().theme, "dark");

        assert_eq!(scope.reset_settings().unwrap(), Settings::default());
        assert_eq!(scope.settings().theme, "system");
    }

    #[test]
    fn export_then_import_elsewhere() {
        let (store, clock, _) = store();
        let anon = store.current();
        anon.put(Product::new("p1", "Vaccine", 10.0)).unwrap();
        anon.put(Client::new("c1", "Anna")).unwrap();
        let snapshot = anon.export();
        assert_eq!(snapshot.exported_at, Some(start()));

        clock.advance(Duration::hours(1));
        let other = store.scope(&Namespace::for_identity(Some("u2")));
        other.put(Client::new("old", "Gone")).unwrap();
        other.import(&snapshot).unwrap();

        let clients = other.list::<Client>();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].updated_at, Some(start()));
        assert_eq!(other.last_import(), Some(start() + Duration::hours(1)));
        assert!(other.list::<Transaction>().is_empty());
    }

    #[test]
    fn import_skips_absent_tables() {
        let (store, _, _) = store();
        let scope = store.current();
        scope.put(Product::new("p1", "Vaccine", 10.0)).unwrap();

        let snapshot = DataSnapshot::from_json(r#"{"clients": []}"#).unwrap();
        scope.import(&snapshot).unwrap();
        assert_eq!(scope.list::<Product>().len(), 1);
    }
}
