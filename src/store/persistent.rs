//! Cache wrapper over a persistent store core
//!
//! [`PersistentStoreWrapper`] sits between the data source / evaluator and an
//! external [`PersistentStoreCore`], giving it the same observable semantics
//! as the in-memory store. Three configurations are supported:
//!
//! - **Uncached** - every operation passes through to the core
//! - **Finite TTL** - read-through cache with expiry; write-through with
//!   cache-on-success
//! - **Infinite TTL** - read-through cache that never expires; write-through
//!   with cache-even-on-failure, so the in-memory view of the data survives
//!   backend outages
//!
//! Per-key loads are single-flight, so at most one core fetch is in flight per
//! key at a time.

use super::sort::sort_full_data_set;
use super::{
    DataKind, DataStore, FullDataSet, ItemDescriptor, KeyedItems, PersistentStoreCore, StoreError,
    StoreResult,
};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Upper bound on how often `initialized` polls the core
const INITIALIZED_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Caching behavior of the wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// No caching; every operation hits the core
    Off,
    /// Entries expire after the given duration
    Ttl(Duration),
    /// Entries never expire; the cache is kept authoritative even across
    /// backend failures
    Infinite,
}

/// Cache wrapper configuration
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Caching mode
    pub mode: CacheMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            mode: CacheMode::Ttl(Duration::from_secs(15)),
        }
    }
}

struct Caches {
    items: Cache<(DataKind, String), Option<ItemDescriptor>>,
    all: Cache<DataKind, HashMap<String, ItemDescriptor>>,
}

impl Caches {
    fn new(ttl: Option<Duration>) -> Self {
        match ttl {
            Some(ttl) => Caches {
                items: Cache::builder().time_to_live(ttl).build(),
                all: Cache::builder().time_to_live(ttl).build(),
            },
            None => Caches {
                items: Cache::builder().build(),
                all: Cache::builder().build(),
            },
        }
    }

    fn refill(&self, sorted: &[(DataKind, KeyedItems)]) {
        self.items.invalidate_all();
        self.all.invalidate_all();
        for (kind, items) in sorted {
            let mut snapshot = HashMap::with_capacity(items.len());
            for (key, item) in items {
                self.items.insert((*kind, key.clone()), Some(item.clone()));
                snapshot.insert(key.clone(), item.clone());
            }
            self.all.insert(*kind, snapshot);
        }
    }

    // Keeps the cached per-kind snapshot coherent without consulting the
    // backend (infinite-TTL mode only).
    fn patch_snapshot(&self, kind: DataKind, key: &str, item: ItemDescriptor) {
        if let Some(mut snapshot) = self.all.get(&kind) {
            snapshot.insert(key.to_string(), item);
            self.all.insert(kind, snapshot);
        }
    }
}

/// A [`DataStore`] backed by an external persistent core, with optional
/// read-through/write-through caching
pub struct PersistentStoreWrapper {
    core: Arc<dyn PersistentStoreCore>,
    mode: CacheMode,
    caches: Option<Caches>,
    inited: AtomicBool,
    last_init_probe: Mutex<Option<Instant>>,
    init_probe_interval: Duration,
}

impl PersistentStoreWrapper {
    /// Wrap the given core with the given caching configuration
    pub fn new(core: Arc<dyn PersistentStoreCore>, config: CacheConfig) -> Self {
        let caches = match config.mode {
            CacheMode::Off => None,
            CacheMode::Ttl(ttl) => Some(Caches::new(Some(ttl))),
            CacheMode::Infinite => Some(Caches::new(None)),
        };
        let init_probe_interval = match config.mode {
            CacheMode::Ttl(ttl) => ttl.min(INITIALIZED_PROBE_INTERVAL),
            _ => INITIALIZED_PROBE_INTERVAL,
        };
        PersistentStoreWrapper {
            core,
            mode: config.mode,
            caches,
            inited: AtomicBool::new(false),
            last_init_probe: Mutex::new(None),
            init_probe_interval,
        }
    }

    fn infinite(&self) -> bool {
        self.mode == CacheMode::Infinite
    }

    fn get_from_core(&self, kind: DataKind, key: &str) -> StoreResult<Option<ItemDescriptor>> {
        self.core
            .get(kind, key)?
            .map(|serialized| ItemDescriptor::from_serialized(kind, &serialized))
            .transpose()
    }

    fn get_all_from_core(&self, kind: DataKind) -> StoreResult<HashMap<String, ItemDescriptor>> {
        let mut items = HashMap::new();
        for (key, serialized) in self.core.get_all(kind)? {
            items.insert(key, ItemDescriptor::from_serialized(kind, &serialized)?);
        }
        Ok(items)
    }
}

fn unwrap_shared(error: Arc<StoreError>) -> StoreError {
    (*error).clone()
}

impl DataStore for PersistentStoreWrapper {
    fn init(&self, data: FullDataSet) -> StoreResult<()> {
        let sorted = sort_full_data_set(data);
        let mut serialized = Vec::with_capacity(sorted.len());
        for (kind, items) in &sorted {
            let mut kind_items = Vec::with_capacity(items.len());
            for (key, item) in items {
                kind_items.push((key.clone(), item.to_serialized()?));
            }
            serialized.push((*kind, kind_items));
        }

        let result = self.core.init(serialized);
        match &result {
            Ok(()) => {
                if let Some(caches) = &self.caches {
                    caches.refill(&sorted);
                }
                self.inited.store(true, Ordering::SeqCst);
            }
            Err(error) => {
                // In infinite-TTL mode the cache still takes the intended
                // data, so evaluation can proceed through a backend outage.
                // The failure is surfaced to the caller either way.
                if self.infinite() {
                    warn!(%error, "persistent store init failed, caching intended data");
                    if let Some(caches) = &self.caches {
                        caches.refill(&sorted);
                    }
                }
            }
        }
        result
    }

    fn get(&self, kind: DataKind, key: &str) -> StoreResult<Option<ItemDescriptor>> {
        match &self.caches {
            None => self.get_from_core(kind, key),
            Some(caches) => caches
                .items
                .try_get_with((kind, key.to_string()), || self.get_from_core(kind, key))
                .map_err(unwrap_shared),
        }
    }

    fn get_all(&self, kind: DataKind) -> StoreResult<HashMap<String, ItemDescriptor>> {
        match &self.caches {
            None => self.get_all_from_core(kind),
            Some(caches) => caches
                .all
                .try_get_with(kind, || self.get_all_from_core(kind))
                .map_err(unwrap_shared),
        }
    }

    fn upsert(&self, kind: DataKind, key: &str, item: ItemDescriptor) -> StoreResult<bool> {
        let serialized = item.to_serialized()?;
        match self.core.upsert(kind, key, serialized) {
            Ok(applied) => {
                if let Some(caches) = &self.caches {
                    if applied {
                        caches
                            .items
                            .insert((kind, key.to_string()), Some(item.clone()));
                        if self.infinite() {
                            caches.patch_snapshot(kind, key, item);
                        } else {
                            caches.all.invalidate(&kind);
                        }
                    } else {
                        // The core holds a newer version; drop any stale view
                        // so the next read fetches it.
                        caches.items.invalidate(&(kind, key.to_string()));
                        if !self.infinite() {
                            caches.all.invalidate(&kind);
                        }
                    }
                }
                Ok(applied)
            }
            Err(error) => {
                if self.infinite() {
                    if let Some(caches) = &self.caches {
                        let cached_version = caches
                            .items
                            .get(&(kind, key.to_string()))
                            .flatten()
                            .map(|cached| cached.version);
                        if cached_version.map_or(true, |v| item.version > v) {
                            warn!(%error, key, "persistent store upsert failed, caching intended value");
                            caches
                                .items
                                .insert((kind, key.to_string()), Some(item.clone()));
                            caches.patch_snapshot(kind, key, item);
                        }
                    }
                }
                Err(error)
            }
        }
    }

    fn initialized(&self) -> bool {
        if self.inited.load(Ordering::SeqCst) {
            return true;
        }
        {
            let mut last_probe = self.last_init_probe.lock();
            match *last_probe {
                Some(at) if at.elapsed() < self.init_probe_interval => return false,
                _ => *last_probe = Some(Instant::now()),
            }
        }
        if self.core.initialized() {
            // Sticky: never flips back to false
            self.inited.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}
