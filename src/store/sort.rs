//! Dependency ordering of full data sets
//!
//! Persistent cores write items one at a time, so a full data set is ordered
//! before writing: segments first (they have no dependencies), then flags such
//! that every flag appears after all flags it lists as prerequisites. A
//! prerequisite cycle would otherwise deadlock initialization, so back-edges
//! are dropped and the traversal continues.

use super::{DataKind, FullDataSet, ItemDescriptor, KeyedItems, StoreItem};
use std::collections::HashMap;
use tracing::warn;

/// Order a full data set for dependency-first persistent writes
///
/// Returns the data partitioned by kind, segments before flags, with flags
/// topologically sorted by their prerequisite chains.
pub fn sort_full_data_set(data: FullDataSet) -> Vec<(DataKind, KeyedItems)> {
    vec![
        (DataKind::Segments, sort_by_key(data.segments)),
        (DataKind::Flags, sort_flags(data.flags)),
    ]
}

// Segments have no dependencies; sorting by key keeps the output stable.
fn sort_by_key(mut items: KeyedItems) -> KeyedItems {
    items.sort_by(|(a, _), (b, _)| a.cmp(b));
    items
}

fn sort_flags(items: KeyedItems) -> KeyedItems {
    let mut remaining: HashMap<String, ItemDescriptor> = items.into_iter().collect();
    let mut keys: Vec<String> = remaining.keys().cloned().collect();
    keys.sort();

    let mut ordered = KeyedItems::with_capacity(remaining.len());
    let mut in_progress = Vec::new();
    for key in keys {
        visit(&key, &mut remaining, &mut in_progress, &mut ordered);
    }
    ordered
}

// Depth-first postorder emit: a flag's prerequisites land before the flag
// itself. A key already on the in-progress stack is a back-edge and is
// skipped.
fn visit(
    key: &str,
    remaining: &mut HashMap<String, ItemDescriptor>,
    in_progress: &mut Vec<String>,
    ordered: &mut KeyedItems,
) {
    if in_progress.iter().any(|k| k == key) {
        warn!(flag = key, "prerequisite cycle detected, dropping back-edge");
        return;
    }
    let Some(descriptor) = remaining.remove(key) else {
        return;
    };
    if let StoreItem::Flag(flag) = &descriptor.item {
        in_progress.push(key.to_string());
        let prerequisite_keys: Vec<String> =
            flag.prerequisites.iter().map(|p| p.key.clone()).collect();
        for prerequisite in prerequisite_keys {
            visit(&prerequisite, remaining, in_progress, ordered);
        }
        in_progress.pop();
    }
    ordered.push((key.to_string(), descriptor));
}
