#![deny(clippy::all)]

use serde_json::Value;
use shared::config::StoreConfig;
use shared::{ExpiryUnit, Result, Ttl};
use std::sync::Arc;

// Ports are the pluggable extension points for the backing key/value store

/// Port for creating a store from configuration
pub trait StoreFactory: Send + Sync + 'static {
    fn create_from_config(&self, config: &StoreConfig) -> Result<Arc<dyn ExpiringStore>>;
}

/// Port for a process-wide key/value store whose entries expire.
///
/// `get` returns `None` for both absent and expired keys.
pub trait ExpiringStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` and restart its expiration window. `None` never expires.
    fn set(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()>;

    /// Returns whether an entry was removed. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<bool>;

    fn flush(&self) -> Result<()>;

    /// Changes what one ttl unit means for subsequent `set` calls.
    fn configure_expiry_unit(&self, unit: ExpiryUnit);

    fn expiry_unit(&self) -> ExpiryUnit;
}
