//! Pending remote operations.
//!
//! A [`Mutation`] is what the queue persists: either a full entity snapshot to
//! upsert or an id to delete. On disk it is `{kind, table, entity?, id?}`.

use crate::{error::Result, Entity, Error, RecordId, Table};
use serde::{Deserialize, Serialize};

/// The two kinds of remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Upsert,
    Delete,
}

/// A pending remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredMutation", into = "StoredMutation")]
pub enum Mutation {
    /// Send the full entity.
    Upsert(Entity),
    /// Remove a row by id.
    Delete { table: Table, id: RecordId },
}

impl Mutation {
    pub fn upsert(entity: impl Into<Entity>) -> Self {
        Mutation::Upsert(entity.into())
    }

    pub fn delete(table: Table, id: impl Into<RecordId>) -> Self {
        Mutation::Delete {
            table,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Upsert(_) => MutationKind::Upsert,
            Mutation::Delete { .. } => MutationKind::Delete,
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Mutation::Upsert(entity) => entity.table(),
            Mutation::Delete { table, .. } => *table,
        }
    }

    /// Id of the entity this operation targets.
    pub fn record_id(&self) -> &str {
        match self {
            Mutation::Upsert(entity) => entity.id(),
            Mutation::Delete { id, .. } => id,
        }
    }

    /// Whether `other` targets the same `(table, id)`, so one supersedes the other.
    pub fn same_target(&self, other: &Mutation) -> bool {
        self.table() == other.table() && self.record_id() == other.record_id()
    }
}

/// Wire shape of a queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMutation {
    kind: MutationKind,
    table: Table,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
}

impl TryFrom<StoredMutation> for Mutation {
    type Error = Error;

    fn try_from(stored: StoredMutation) -> Result<Self> {
        match stored.kind {
            MutationKind::Upsert => {
                let value = stored.entity.ok_or_else(|| {
                    Error::InvalidMutation(format!("upsert on {} without entity", stored.table))
                })?;
                Ok(Mutation::Upsert(Entity::from_value(stored.table, value)?))
            }
            MutationKind::Delete => match stored.id {
                Some(id) if !id.is_empty() => Ok(Mutation::Delete {
                    table: stored.table,
                    id,
                }),
                _ => Err(Error::InvalidMutation(format!(
                    "delete on {} without id",
                    stored.table
                ))),
            },
        }
    }
}

impl From<Mutation> for StoredMutation {
    fn from(mutation: Mutation) -> Self {
        match mutation {
            Mutation::Upsert(entity) => StoredMutation {
                kind: MutationKind::Upsert,
                table: entity.table(),
                id: Some(entity.id().to_string()),
                // Entities are plain structs; encoding them cannot fail.
                entity: serde_json::to_value(&entity).ok(),
            },
            Mutation::Delete { table, id } => StoredMutation {
                kind: MutationKind::Delete,
                table,
                entity: None,
                id: Some(id),
            },
        }
    }
}
