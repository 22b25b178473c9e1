//! In-memory data store
//!
//! A simple map under a reader-writer lock. Reads take the shared lock and
//! clone; `init` and `upsert` take the exclusive lock, so readers always see
//! a consistent per-key version and never a torn item.

use super::{DataKind, DataStore, FullDataSet, ItemDescriptor, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

type KindMap = HashMap<DataKind, HashMap<String, ItemDescriptor>>;

/// Data store holding all items in process memory
#[derive(Default)]
pub struct InMemoryDataStore {
    data: RwLock<KindMap>,
    initialized: AtomicBool,
}

impl InMemoryDataStore {
    /// Create an empty, uninitialized store
    pub fn new() -> Self {
        InMemoryDataStore::default()
    }
}

impl DataStore for InMemoryDataStore {
    fn init(&self, data: FullDataSet) -> StoreResult<()> {
        let mut map = KindMap::new();
        map.insert(DataKind::Flags, data.flags.into_iter().collect());
        map.insert(DataKind::Segments, data.segments.into_iter().collect());
        *self.data.write() = map;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, kind: DataKind, key: &str) -> StoreResult<Option<ItemDescriptor>> {
        Ok(self
            .data
            .read()
            .get(&kind)
            .and_then(|items| items.get(key))
            .cloned())
    }

    fn get_all(&self, kind: DataKind) -> StoreResult<HashMap<String, ItemDescriptor>> {
        Ok(self.data.read().get(&kind).cloned().unwrap_or_default())
    }

    fn upsert(&self, kind: DataKind, key: &str, item: ItemDescriptor) -> StoreResult<bool> {
        let mut data = self.data.write();
        let items = data.entry(kind).or_default();
        match items.get(key) {
            Some(existing) if existing.version >= item.version => Ok(false),
            _ => {
                items.insert(key.to_string(), item);
                Ok(true)
            }
        }
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}
