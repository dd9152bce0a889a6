//! Whole-namespace export and import.
//!
//! A [`DataSnapshot`] is the backup file format: every collection of one
//! namespace plus its settings. Import replaces only the tables present in the
//! snapshot and keeps the record timestamps as exported.

use crate::{error::Result, Client, Error, Product, Settings, Timestamp, Transaction};
use serde::{Deserialize, Serialize};

/// Exported contents of a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<Product>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<Client>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<Timestamp>,
}

impl DataSnapshot {
    /// Number of records across all tables.
    pub fn record_count(&self) -> usize {
        self.products.as_ref().map_or(0, Vec::len)
            + self.clients.as_ref().map_or(0, Vec::len)
            + self.transactions.as_ref().map_or(0, Vec::len)
    }

    /// Pretty-printed JSON, as written to a backup file.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::encode("snapshot", e))
    }

    /// Parse and validate a backup file.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Suggested backup file name for an export taken at `at`.
    pub fn file_name(at: Timestamp) -> String {
        format!("tally-backup-{}.json", at.format("%Y-%m-%d"))
    }
}
