//! Last-write-wins merging of two record collections.
//!
//! This is the core of pull and offline-data inclusion. Given the local
//! collection and an incoming one (remote rows or another namespace), it
//! produces the merged collection plus a summary of what changed.
//!
//! # Rules
//!
//! 1. Local records keep their position.
//! 2. An incoming record whose id is unknown locally is appended.
//! 3. On an id collision the incoming record replaces the local one only if
//!    its `updatedAt` is strictly newer. Equal timestamps keep local.
//! 4. A missing `updatedAt` compares as the earliest possible instant.
//!
//! Merging never deletes: a record absent from the incoming side stays.

use crate::{Record, RecordId, Timestamp};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

/// How an id collision was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local record was at least as new
    KeptLocal,
    /// The incoming record was strictly newer
    TookIncoming,
}

/// A record present on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub id: RecordId,
    pub resolution: Resolution,
}

/// Result of [`merge_by_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult<T> {
    /// The merged collection
    pub records: Vec<T>,
    /// Ids appended from the incoming side
    pub added: Vec<RecordId>,
    /// Every id collision with its resolution
    pub conflicts: Vec<Conflict>,
}

impl<T> MergeResult<T> {
    /// Ids whose local record was replaced by the incoming one.
    pub fn replaced(&self) -> impl Iterator<Item = &str> {
        self.conflicts
            .iter()
            .filter(|c| c.resolution == Resolution::TookIncoming)
            .map(|c| c.id.as_str())
    }

    /// Whether the merged collection differs from the local one.
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || self.replaced().next().is_some()
    }
}

/// Whether `incoming` should replace `local` under last-write-wins.
pub fn is_newer(incoming: Option<Timestamp>, local: Option<Timestamp>) -> bool {
    // `None < Some(_)` gives missing timestamps the earliest ordering.
    incoming > local
}

/// Merge `incoming` into `local` by id.
///
/// Duplicate ids on the incoming side are folded in order, so the newest of
/// them wins.
pub fn merge_by_id<T: Record>(local: Vec<T>, incoming: Vec<T>) -> MergeResult<T> {
    let mut records = local;
    let mut index: HashMap<RecordId, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id().to_string(), i))
        .collect();
    let local_len = records.len();

    let mut added = Vec::new();
    let mut conflicts: Vec<Conflict> = Vec::new();

    for item in incoming {
        match index.get(item.id()) {
            Some(&i) => {
                let take = is_newer(item.updated_at(), records[i].updated_at());
                let resolution = if take {
                    Resolution::TookIncoming
                } else {
                    Resolution::KeptLocal
                };

                if i < local_len {
                    match conflicts.iter_mut().find(|c| c.id == item.id()) {
                        Some(existing) if take => existing.resolution = resolution,
                        Some(_) => {}
                        None => conflicts.push(Conflict {
                            id: item.id().to_string(),
                            resolution,
                        }),
                    }
                }

                if take {
                    records[i] = item;
                }
            }
            None => {
                index.insert(item.id().to_string(), records.len());
                added.push(item.id().to_string());
                records.push(item);
            }
        }
    }

    MergeResult {
        records,
        added,
        conflicts,
    }
}

/// Decode JSON rows into records, skipping rows that do not fit the type.
///
/// Returns the decoded records and the number of rows skipped.
pub fn decode_records<T>(rows: Vec<serde_json::Value>) -> (Vec<T>, usize)
where
    T: Serialize + DeserializeOwned,
{
    let mut skipped = 0;
    let records = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed record");
                skipped += 1;
                None
            }
        })
        .collect();
    (records, skipped)
}
