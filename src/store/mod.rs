//! Data store layer
//!
//! This module provides the versioned store of flags and segments the
//! evaluator reads and the data source writes:
//! - A common [`DataStore`] trait with atomic `init` and version-gated `upsert`
//! - An in-memory implementation ([`InMemoryDataStore`])
//! - A read-through/write-through cache wrapper over an external persistent
//!   core ([`PersistentStoreWrapper`])
//! - Dependency-ordered serialization of full data sets for persistent writes
//!
//! Deleted items are kept as versioned tombstones so an out-of-order update
//! cannot resurrect them.

use crate::model::{Flag, Segment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Store error types
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Item serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The persistent core reported a failure
    #[error("persistent store error: {0}")]
    Persistent(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// The two kinds of items a store holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Feature flags
    Flags,
    /// User segments
    Segments,
}

impl DataKind {
    /// Wire name, as used in stream message paths
    pub fn name(&self) -> &'static str {
        match self {
            DataKind::Flags => "flags",
            DataKind::Segments => "segments",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored item: a live flag, a live segment, or a deletion marker
#[derive(Debug, Clone, PartialEq)]
pub enum StoreItem {
    /// A feature flag
    Flag(Flag),
    /// A user segment
    Segment(Segment),
    /// A versioned marker for a deleted item
    Tombstone,
}

/// A versioned store entry
///
/// The version is carried outside the item so that a tombstone preserves the
/// version of the deletion it records.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDescriptor {
    /// Item version; upserts apply only with a strictly greater version
    pub version: u64,
    /// The item itself, or a tombstone
    pub item: StoreItem,
}

impl ItemDescriptor {
    /// Wrap a flag, taking the version from the flag itself
    pub fn flag(flag: Flag) -> Self {
        ItemDescriptor {
            version: flag.version,
            item: StoreItem::Flag(flag),
        }
    }

    /// Wrap a segment, taking the version from the segment itself
    pub fn segment(segment: Segment) -> Self {
        ItemDescriptor {
            version: segment.version,
            item: StoreItem::Segment(segment),
        }
    }

    /// A tombstone at the given version
    pub fn tombstone(version: u64) -> Self {
        ItemDescriptor {
            version,
            item: StoreItem::Tombstone,
        }
    }

    /// Whether this entry is a tombstone
    pub fn is_deleted(&self) -> bool {
        matches!(self.item, StoreItem::Tombstone)
    }

    /// Serialize for a persistent core
    pub fn to_serialized(&self) -> StoreResult<SerializedItemDescriptor> {
        let bytes = match &self.item {
            StoreItem::Flag(flag) => Some(serde_json::to_vec(flag)?),
            StoreItem::Segment(segment) => Some(serde_json::to_vec(segment)?),
            StoreItem::Tombstone => None,
        };
        Ok(SerializedItemDescriptor {
            version: self.version,
            deleted: bytes.is_none(),
            serialized_item: bytes,
        })
    }

    /// Deserialize from a persistent core
    ///
    /// An entry marked deleted, or one with no item bytes, becomes a
    /// tombstone at the serialized version.
    pub fn from_serialized(
        kind: DataKind,
        serialized: &SerializedItemDescriptor,
    ) -> StoreResult<ItemDescriptor> {
        let bytes = match (&serialized.serialized_item, serialized.deleted) {
            (Some(bytes), false) => bytes,
            _ => return Ok(ItemDescriptor::tombstone(serialized.version)),
        };
        let item = match kind {
            DataKind::Flags => {
                let flag: Flag = serde_json::from_slice(bytes)?;
                if flag.deleted {
                    StoreItem::Tombstone
                } else {
                    StoreItem::Flag(flag)
                }
            }
            DataKind::Segments => {
                let segment: Segment = serde_json::from_slice(bytes)?;
                if segment.deleted {
                    StoreItem::Tombstone
                } else {
                    StoreItem::Segment(segment)
                }
            }
        };
        Ok(ItemDescriptor {
            version: serialized.version,
            item,
        })
    }
}

/// What a persistent core stores for one item
///
/// Tombstones are distinguishable from live items (`deleted` true, no bytes)
/// and carry the version of the deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedItemDescriptor {
    /// Item version
    pub version: u64,
    /// Whether this entry is a tombstone
    pub deleted: bool,
    /// JSON bytes of the item; absent for tombstones
    pub serialized_item: Option<Vec<u8>>,
}

/// Items of one kind, keyed and ordered
pub type KeyedItems = Vec<(String, ItemDescriptor)>;

/// A complete data set, as delivered by a `put` stream message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullDataSet {
    /// All flags
    pub flags: KeyedItems,
    /// All segments
    pub segments: KeyedItems,
}

/// The store abstraction the evaluator reads and the data source writes
///
/// Implementations must expose identical observable semantics: versions per
/// `(kind, key)` are monotonically non-decreasing, tombstones remain visible,
/// and `initialized` is sticky once an `init` succeeds.
pub trait DataStore: Send + Sync {
    /// Atomically replace all state with the given set
    fn init(&self, data: FullDataSet) -> StoreResult<()>;

    /// Current entry for a key, including tombstones
    fn get(&self, kind: DataKind, key: &str) -> StoreResult<Option<ItemDescriptor>>;

    /// Snapshot of all entries of a kind, including tombstones
    fn get_all(&self, kind: DataKind) -> StoreResult<HashMap<String, ItemDescriptor>>;

    /// Apply the descriptor iff its version is strictly greater than the
    /// stored version; returns whether it was applied
    fn upsert(&self, kind: DataKind, key: &str, item: ItemDescriptor) -> StoreResult<bool>;

    /// Whether an `init` has ever succeeded
    fn initialized(&self) -> bool;
}

/// The contract an external persistent store implements
///
/// Cores speak serialized item bytes and may block on I/O; they are consulted
/// by [`PersistentStoreWrapper`] on cache misses and writes only. Version
/// gating on `upsert` is the core's responsibility.
pub trait PersistentStoreCore: Send + Sync {
    /// Replace all state with the given data, ordered so that items are
    /// written dependencies-first
    fn init(&self, data: Vec<(DataKind, Vec<(String, SerializedItemDescriptor)>)>)
        -> StoreResult<()>;

    /// Current serialized entry for a key
    fn get(&self, kind: DataKind, key: &str) -> StoreResult<Option<SerializedItemDescriptor>>;

    /// All serialized entries of a kind
    fn get_all(&self, kind: DataKind) -> StoreResult<Vec<(String, SerializedItemDescriptor)>>;

    /// Version-gated write; returns whether it was applied
    fn upsert(
        &self,
        kind: DataKind,
        key: &str,
        item: SerializedItemDescriptor,
    ) -> StoreResult<bool>;

    /// Whether the backing store holds an initialized data set
    fn initialized(&self) -> bool;
}

pub mod memory;
pub mod persistent;
pub mod sort;

// Re-exports for convenience
pub use memory::InMemoryDataStore;
pub use persistent::{CacheConfig, CacheMode, PersistentStoreWrapper};
pub use sort::sort_full_data_set;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Flag;

    #[test]
    fn test_serialized_tombstone_round_trip() {
        let tombstone = ItemDescriptor::tombstone(9);
        let serialized = tombstone.to_serialized().unwrap();
        assert!(serialized.deleted);
        assert_eq!(serialized.version, 9);
        assert!(serialized.serialized_item.is_none());
        let back = ItemDescriptor::from_serialized(DataKind::Flags, &serialized).unwrap();
        assert_eq!(back, tombstone);
    }

    #[test]
    fn test_serialized_flag_round_trip() {
        let flag = Flag {
            key: "f".to_string(),
            version: 4,
            on: true,
            ..Flag::default()
        };
        let descriptor = ItemDescriptor::flag(flag);
        let serialized = descriptor.to_serialized().unwrap();
        assert!(!serialized.deleted);
        let back = ItemDescriptor::from_serialized(DataKind::Flags, &serialized).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_deleted_payload_becomes_tombstone() {
        let serialized = SerializedItemDescriptor {
            version: 2,
            deleted: false,
            serialized_item: Some(br#"{"key":"f","version":2,"deleted":true}"#.to_vec()),
        };
        let back = ItemDescriptor::from_serialized(DataKind::Flags, &serialized).unwrap();
        assert!(back.is_deleted());
        assert_eq!(back.version, 2);
    }
}
