//! The shared bounded asset cache.
//!
//! Lookups are single-flight: concurrent misses for the same `(type, key)`
//! share one fetch. When the map grows past `max_size`, the `prune_count`
//! least recently used entries are evicted in one pass.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::server::AssetServer;
use crate::types::{AssetError, AssetType, AssetValue};

type Key = (AssetType, String);

struct Entry {
    value: AssetValue,
    last_used: u64,
}

/// The state shared between a fetching thread and its waiters.
struct Flight {
    result: Mutex<Option<Result<AssetValue, AssetError>>>,
    done: Condvar,
}

struct Inner {
    entries: HashMap<Key, Entry>,
    in_flight: HashMap<Key, Arc<Flight>>,
    clock: u64,
}

/// A process-wide cache of materialized assets.
pub struct AssetCache {
    max_size: usize,
    prune_count: usize,
    inner: Mutex<Inner>,
}

impl AssetCache {
    pub fn new(max_size: usize, prune_count: usize) -> Self {
        AssetCache {
            max_size,
            prune_count,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                clock: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("asset cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets an asset, fetching it through the server on a miss. Concurrent
    /// misses for the same key share one fetch; fetch failures are shared
    /// with the waiters but not cached.
    pub fn get(
        &self,
        server: &dyn AssetServer,
        asset_type: AssetType,
        key: &str,
    ) -> Result<AssetValue, AssetError> {
        let key: Key = (asset_type, key.to_string());

        let flight = {
            let mut inner = self.inner.lock().expect("asset cache poisoned");
            if let Some(entry) = inner.entries.get(&key) {
                let value = entry.value.clone();
                inner.clock += 1;
                let clock = inner.clock;
                inner.entries.get_mut(&key).expect("entry present").last_used = clock;
                return Ok(value);
            }
            match inner.in_flight.get(&key) {
                Some(flight) => FlightRole::Waiter(flight.clone()),
                None => {
                    let flight = Arc::new(Flight {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    inner.in_flight.insert(key.clone(), flight.clone());
                    FlightRole::Fetcher(flight)
                }
            }
        };

        match flight {
            FlightRole::Waiter(flight) => {
                let mut result = flight.result.lock().expect("flight poisoned");
                while result.is_none() {
                    result = flight.done.wait(result).expect("flight poisoned");
                }
                result.clone().expect("checked above")
            }
            FlightRole::Fetcher(flight) => {
                let fetched = server.fetch(key.0, &key.1);

                let mut inner = self.inner.lock().expect("asset cache poisoned");
                if let Ok(value) = &fetched {
                    inner.clock += 1;
                    let clock = inner.clock;
                    inner.entries.insert(
                        key.clone(),
                        Entry { value: value.clone(), last_used: clock },
                    );
                    self.prune(&mut inner);
                }
                inner.in_flight.remove(&key);
                drop(inner);

                *flight.result.lock().expect("flight poisoned") = Some(fetched.clone());
                flight.done.notify_all();
                fetched
            }
        }
    }

    /// Evicts the least recently used entries in one pass.
    fn prune(&self, inner: &mut Inner) {
        if inner.entries.len() <= self.max_size {
            return;
        }
        let mut by_age: Vec<(Key, u64)> = inner
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_used))
            .collect();
        by_age.sort_by_key(|(_, used)| *used);
        let evicted = by_age.len().min(self.prune_count);
        for (key, _) in by_age.into_iter().take(self.prune_count) {
            inner.entries.remove(&key);
        }
        tracing::debug!(evicted, remaining = inner.entries.len(), "pruned asset cache");
    }
}

enum FlightRole {
    Fetcher(Arc<Flight>),
    Waiter(Arc<Flight>),
}
