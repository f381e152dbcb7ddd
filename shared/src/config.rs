use crate::ExpiryUnit;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sled,
}

impl Backend {
    pub fn as_str(&self) -> &str {
        match self {
            Backend::Memory => "memory",
            Backend::Sled => "sled",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub name: String,
    pub backend: Backend,
    pub data_dir: String,
    pub expiry_unit: ExpiryUnit,
    pub max_entries: Option<u64>,
}

impl StoreConfig {
    const DEFAULT_NAME: &str = "cached-state";
    const DEFAULT_DATA_DIR: &str = "./data";

    pub fn from_env() -> Self {
        let backend = match std::env::var("CACHED_STATE_BACKEND") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "memory" => Backend::Memory,
                "sled" => Backend::Sled,
                other => {
                    warn!("Unknown CACHED_STATE_BACKEND '{}', falling back to sled", other);
                    Backend::Sled
                }
            },
            Err(_) => Backend::Sled,
        };

        let expiry_unit = match std::env::var("CACHED_STATE_EXPIRY_MS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ExpiryUnit::from_millis(ms),
                _ => {
                    warn!("Invalid CACHED_STATE_EXPIRY_MS '{}', using one minute per ttl unit", raw);
                    ExpiryUnit::default()
                }
            },
            Err(_) => ExpiryUnit::default(),
        };

        let max_entries = std::env::var("CACHED_STATE_MAX_ENTRIES")
            .ok()
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("Invalid CACHED_STATE_MAX_ENTRIES '{}', store is unbounded", raw);
                    None
                }
            });

        Self {
            name: std::env::var("CACHED_STATE_NAME")
                .unwrap_or_else(|_| Self::DEFAULT_NAME.to_string()),
            backend,
            data_dir: std::env::var("CACHED_STATE_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            expiry_unit,
            max_entries,
        }
    }

    /// In-memory configuration, mostly for tests.
    pub fn memory(expiry_unit: ExpiryUnit) -> Self {
        Self {
            backend: Backend::Memory,
            expiry_unit,
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            backend: Backend::Sled,
            data_dir: Self::DEFAULT_DATA_DIR.to_string(),
            expiry_unit: ExpiryUnit::default(),
            max_entries: None,
        }
    }
}
