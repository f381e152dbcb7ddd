use crate::UnitCell;
use cached_state::ports::ExpiringStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{Error, ExpiryUnit, Result, Ttl};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Sled-based persistent store. Entries survive restarts; expired entries
/// are dropped the first time they are read.
pub struct SledStore {
    db: sled::Db,
    unit: UnitCell,
}

impl SledStore {
    /// Open (or create) a store at `path`
    /// Creates the parent directory if it doesn't exist
    pub fn open(path: impl AsRef<Path>, unit: ExpiryUnit) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        // every write is flushed explicitly, no background flusher
        let db = sled::Config::new()
            .path(path.as_ref())
            .flush_every_ms(None)
            .open()
            .map_err(|e| Error::Storage(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self {
            db,
            unit: UnitCell::new(unit),
        })
    }

    fn flush_db(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    /// Deletes `key` only if it still holds `seen`; a newer write is left alone.
    fn drop_expired(&self, key: &str, seen: &sled::IVec) -> Result<bool> {
        let swapped = self
            .db
            .compare_and_swap(key.as_bytes(), Some(seen), None::<&[u8]>)
            .map_err(|e| Error::Storage(format!("Failed to delete entry: {}", e)))?
            .is_ok();

        if swapped {
            self.flush_db()?;
        }
        Ok(swapped)
    }
}

impl ExpiringStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let bytes = self
            .db
            .get(key.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to get entry: {}", e)))?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let entry: StoredEntry = serde_json::from_slice(&bytes)?;
        if entry.is_expired(Utc::now()) {
            debug!("Dropping expired entry '{}'", key);
            self.drop_expired(key, &bytes)?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()> {
        let now = Utc::now();
        // lifetimes beyond chrono's range never expire
        let expires_at = ttl
            .and_then(|ttl| ttl.lifetime(self.unit.get()))
            .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        let bytes = serde_json::to_vec(&StoredEntry { value, expires_at })?;
        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::Storage(format!("Failed to save entry: {}", e)))?;

        self.flush_db()
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let removed = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to delete entry: {}", e)))?
            .is_some();

        self.flush_db()?;
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        self.db
            .clear()
            .map_err(|e| Error::Storage(format!("Failed to clear database: {}", e)))?;
        self.flush_db()
    }

    fn configure_expiry_unit(&self, unit: ExpiryUnit) {
        self.unit.set(unit);
    }

    fn expiry_unit(&self) -> ExpiryUnit {
        self.unit.get()
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("entries", &self.db.len())
            .field("unit", &self.unit.get())
            .finish()
    }
}
