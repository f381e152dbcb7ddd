use shared::ExpiryUnit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub mod factory;
pub mod moka_store;
pub mod sled_store;

pub use factory::EngineFactory;
pub use moka_store::MokaStore;
pub use sled_store::SledStore;

/// Expiry unit shared by all writers of one store, swappable at runtime.
#[derive(Debug)]
pub(crate) struct UnitCell(AtomicU64);

impl UnitCell {
    pub(crate) fn new(unit: ExpiryUnit) -> Self {
        Self(AtomicU64::new(Self::nanos(unit)))
    }

    fn nanos(unit: ExpiryUnit) -> u64 {
        u64::try_from(unit.as_duration().as_nanos()).unwrap_or(u64::MAX)
    }

    pub(crate) fn get(&self) -> ExpiryUnit {
        ExpiryUnit::new(Duration::from_nanos(self.0.load(Ordering::Relaxed)))
    }

    pub(crate) fn set(&self, unit: ExpiryUnit) {
        self.0.store(Self::nanos(unit), Ordering::Relaxed);
    }
}
