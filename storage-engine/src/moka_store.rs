use crate::UnitCell;
use cached_state::ports::ExpiringStore;
use moka::Expiry;
use moka::sync::Cache;
use serde_json::Value;
use shared::{ExpiryUnit, Result, Ttl};
use std::fmt::Debug;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    lifetime: Option<Duration>,
}

/// Every write carries its own lifetime; updates restart the window.
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.lifetime
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.lifetime
    }
}

/// Moka-based in-memory store with per-entry TTL support
pub struct MokaStore {
    cache: Cache<String, Entry>,
    unit: UnitCell,
}

impl MokaStore {
    /// Create a new unbounded Moka store
    pub fn new_unbounded(unit: ExpiryUnit) -> Self {
        Self::new("cached-state".to_string(), None, unit)
    }

    /// Create a Moka store from name and optional capacity
    pub fn new(name: String, max_entries: Option<u64>, unit: ExpiryUnit) -> Self {
        let mut builder = Cache::builder().name(&name).expire_after(PerEntryExpiry);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
            unit: UnitCell::new(unit),
        }
    }
}

impl ExpiringStore for MokaStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        // Either doesn't exist or TTL expired
        Ok(self.cache.get(key).map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()> {
        let lifetime = ttl.and_then(|ttl| ttl.lifetime(self.unit.get()));
        self.cache.insert(key.to_string(), Entry { value, lifetime });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).is_some())
    }

    fn flush(&self) -> Result<()> {
        self.cache.invalidate_all();
        Ok(())
    }

    fn configure_expiry_unit(&self, unit: ExpiryUnit) {
        self.unit.set(unit);
    }

    fn expiry_unit(&self) -> ExpiryUnit {
        self.unit.get()
    }
}

impl Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("entry_count", &self.cache.entry_count())
            .field("unit", &self.unit.get())
            .finish()
    }
}
