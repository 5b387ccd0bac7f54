//! Short-lived per-contract cache of capacity snapshots.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::{Address, CapacitySnapshot};

/// Capacity snapshots with an independent expiry per contract.
#[derive(Debug)]
pub struct CapacityCache {
    ttl: Duration,
    entries: Mutex<HashMap<Address, (Instant, CapacitySnapshot)>>,
}

impl CapacityCache {
    /// Creates a cache whose entries live for `ttl`. A zero TTL disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached snapshot for `contract`, if still fresh.
    #[must_use]
    pub fn get(&self, contract: &Address) -> Option<CapacitySnapshot> {
        let mut entries = self.entries.lock();
        match entries.get(contract) {
            Some((stored_at, snapshot)) if stored_at.elapsed() < self.ttl => Some(snapshot.clone()),
            Some(_) => {
                entries.remove(contract);
                None
            }
            None => None,
        }
    }

    /// Stores `snapshot` under its contract.
    pub fn insert(&self, snapshot: CapacitySnapshot) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries
            .lock()
            .insert(snapshot.contract, (Instant::now(), snapshot));
    }

    /// Drops the entries of `contracts`.
    pub fn invalidate(&self, contracts: &[Address]) {
        let mut entries = self.entries.lock();
        for contract in contracts {
            entries.remove(contract);
        }
    }
}
