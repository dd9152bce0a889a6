//! Remote backend port.
//!
//! The remote is an opaque multi-tenant table service. Rows are JSON objects
//! in the remote (snake_case) schema, primary-keyed by `id` and owned through
//! the `user_id` column.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tally_engine::Table;

/// Upsert, delete and query against the remote tables.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Insert or update `row`, keyed by `(id, user_id)`.
    async fn upsert(&self, table: Table, row: Value) -> Result<()>;

    /// Delete the row with `id`. Deleting a missing row succeeds.
    async fn delete(&self, table: Table, id: &str) -> Result<()>;

    /// Every row of `table` owned by `owner`.
    async fn fetch_all(&self, table: Table, owner: &str) -> Result<Vec<Value>>;
}
