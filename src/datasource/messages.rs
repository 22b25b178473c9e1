//! Stream message payloads
//!
//! JSON shapes of the `put`, `patch`, and `delete` events and the translation
//! into store descriptors. Items that arrive with their `deleted` marker set
//! become tombstones immediately, so downstream stores never see a live item
//! for a deleted key.

use crate::model::{Flag, Segment};
use crate::store::{DataKind, FullDataSet, ItemDescriptor};
use serde::Deserialize;
use std::collections::HashMap;

/// Payload of a `put` event: the complete data set
#[derive(Debug, Deserialize)]
pub(crate) struct PutMessage {
    pub data: PutData,
}

/// The two item collections within a `put`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PutData {
    pub flags: HashMap<String, Flag>,
    pub segments: HashMap<String, Segment>,
}

impl From<PutData> for FullDataSet {
    fn from(data: PutData) -> FullDataSet {
        FullDataSet {
            flags: data
                .flags
                .into_iter()
                .map(|(key, flag)| {
                    let descriptor = if flag.deleted {
                        ItemDescriptor::tombstone(flag.version)
                    } else {
                        ItemDescriptor::flag(flag)
                    };
                    (key, descriptor)
                })
                .collect(),
            segments: data
                .segments
                .into_iter()
                .map(|(key, segment)| {
                    let descriptor = if segment.deleted {
                        ItemDescriptor::tombstone(segment.version)
                    } else {
                        ItemDescriptor::segment(segment)
                    };
                    (key, descriptor)
                })
                .collect(),
        }
    }
}

/// Payload of a `patch` event: one item addressed by path
#[derive(Debug, Deserialize)]
pub(crate) struct PatchMessage {
    pub path: String,
    pub data: serde_json::Value,
}

/// Payload of a `delete` event: a path and the version of the deletion
#[derive(Debug, Deserialize)]
pub(crate) struct DeleteMessage {
    pub path: String,
    pub version: u64,
}

/// Resolve a message path of the form `/flags/KEY` or `/segments/KEY`
pub(crate) fn parse_path(path: &str) -> Option<(DataKind, &str)> {
    if let Some(key) = path.strip_prefix("/flags/") {
        Some((DataKind::Flags, key))
    } else if let Some(key) = path.strip_prefix("/segments/") {
        Some((DataKind::Segments, key))
    } else {
        None
    }
}

/// Decode a patched item into a store descriptor
pub(crate) fn item_from_patch(
    kind: DataKind,
    data: serde_json::Value,
) -> Result<ItemDescriptor, serde_json::Error> {
    match kind {
        DataKind::Flags => {
            let flag: Flag = serde_json::from_value(data)?;
            Ok(if flag.deleted {
                ItemDescriptor::tombstone(flag.version)
            } else {
                ItemDescriptor::flag(flag)
            })
        }
        DataKind::Segments => {
            let segment: Segment = serde_json::from_value(data)?;
            Ok(if segment.deleted {
                ItemDescriptor::tombstone(segment.version)
            } else {
                ItemDescriptor::segment(segment)
            })
        }
    }
}
