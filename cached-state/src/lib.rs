pub mod cached;
pub mod cell;
pub mod ports;
pub mod validation;

pub use cached::{
    Adapted, Cached, CachedReducer, CachedState, Dispatch, Presence, Primitive, PrimitiveKind,
    RemoveFromCache, SetState, TtlOverride,
};
pub use cell::{Initial, ReducerCell, Update, ValueCell};
pub use ports::{ExpiringStore, StoreFactory};
pub use validation::CacheKey;
