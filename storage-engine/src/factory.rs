use crate::{MokaStore, SledStore};
use cached_state::ports::{ExpiringStore, StoreFactory};
use shared::Result;
use shared::config::{Backend, StoreConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Builds the store selected by [`StoreConfig::backend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineFactory;

impl StoreFactory for EngineFactory {
    fn create_from_config(&self, config: &StoreConfig) -> Result<Arc<dyn ExpiringStore>> {
        match config.backend {
            Backend::Memory => {
                info!(
                    "Creating in-memory store '{}' (max entries: {:?})",
                    config.name, config.max_entries
                );
                Ok(Arc::new(MokaStore::new(
                    config.name.clone(),
                    config.max_entries,
                    config.expiry_unit,
                )))
            }
            Backend::Sled => {
                let path = Path::new(&config.data_dir).join(format!("{}.sled", config.name));
                info!("Opening persistent store at {}", path.display());
                Ok(Arc::new(SledStore::open(path, config.expiry_unit)?))
            }
        }
    }
}
