//! Cache-backed state.
//!
//! [`Cached`] seeds a value cell or reducer cell from an [`ExpiringStore`]
//! entry and mirrors every committed state back into that entry. Clearing the
//! entry through [`RemoveFromCache`] never touches the in-memory state.

use crate::cell::{Initial, ReducerCell, Update, ValueCell};
use crate::ports::ExpiringStore;
use crate::validation::{self, CacheKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{Error, Result, Ttl};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a ttl passed to `set_with_ttl` / `dispatch_with_ttl` relates to later writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtlOverride {
    /// Applies to that single write only.
    #[default]
    OneShot,
    /// Replaces the instance ttl for every later write.
    Sticky,
}

/// Which cached values count as present when seeding state at mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Presence {
    /// Anything but `null` wins over the caller's initial state, including `0`, `""` and `false`.
    #[default]
    Defined,
    /// `null`, `false`, `0` and `""` fall back to the caller's initial state.
    Truthy,
}

impl Presence {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Presence::Defined => !value.is_null(),
            Presence::Truthy => match value {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                Value::String(s) => !s.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }
}

/// The state primitives that can be cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    ValueCell,
    ReducerCell,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &str {
        match self {
            PrimitiveKind::ValueCell => "value",
            PrimitiveKind::ReducerCell => "reducer",
        }
    }
}

impl FromStr for PrimitiveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "value" | "state" | "value-cell" => Ok(PrimitiveKind::ValueCell),
            "reducer" | "reducer-cell" => Ok(PrimitiveKind::ReducerCell),
            _ => Err(Error::UnsupportedPrimitive(s.to_string())),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-commit writer shared by every handle of one mounted instance.
struct CacheWriter {
    store: Arc<dyn ExpiringStore>,
    key: CacheKey,
    ttl: Cell<Option<Ttl>>,
    pending: Cell<Option<Ttl>>,
    ttl_override: TtlOverride,
}

impl CacheWriter {
    fn read<T: DeserializeOwned>(&self, presence: Presence) -> Option<T> {
        let cached = match self.store.get(self.key.as_str()) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("Cache miss for '{}'", self.key);
                return None;
            }
            Err(err) => {
                warn!("Failed to read cache entry '{}': {}", self.key, err);
                return None;
            }
        };

        if !presence.accepts(&cached) {
            debug!("Cached value for '{}' ignored under {:?} policy", self.key, presence);
            return None;
        }

        match serde_json::from_value(cached) {
            Ok(state) => {
                debug!("Seeding state for '{}' from cache", self.key);
                Some(state)
            }
            Err(err) => {
                warn!("Discarding undecodable cache entry '{}': {}", self.key, err);
                None
            }
        }
    }

    fn arm(&self, ttl: Ttl) {
        match self.ttl_override {
            TtlOverride::OneShot => self.pending.set(Some(ttl)),
            TtlOverride::Sticky => self.ttl.set(Some(ttl)),
        }
    }

    fn commit<T: Serialize>(&self, state: &T) {
        let ttl = self.pending.take().or(self.ttl.get());
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to serialize state for '{}': {}", self.key, err);
                return;
            }
        };

        // written even when unchanged; the entry may have expired or been replaced
        match self.store.set(self.key.as_str(), value, ttl) {
            Ok(()) => debug!("Wrote '{}' to cache (ttl: {:?})", self.key, ttl.map(Ttl::units)),
            Err(err) => warn!("Failed to write cache entry '{}': {}", self.key, err),
        }
    }

    fn remove(&self) {
        match self.store.remove(self.key.as_str()) {
            Ok(existed) => debug!("Removed '{}' from cache (existed: {})", self.key, existed),
            Err(err) => warn!("Failed to remove cache entry '{}': {}", self.key, err),
        }
    }
}

/// Setter half of a cached value cell.
pub struct SetState<T> {
    cell: ValueCell<T>,
    writer: Option<Rc<CacheWriter>>,
}

impl<T: Clone + 'static> SetState<T> {
    pub fn set(&self, update: impl Into<Update<T>>) {
        self.cell.set(update);
    }

    pub fn update(&self, updater: impl FnOnce(&T) -> T) {
        self.cell.update(updater);
    }

    /// Like [`SetState::set`], writing this change with `ttl` instead of the instance ttl.
    pub fn set_with_ttl(&self, update: impl Into<Update<T>>, ttl: Ttl) {
        if let Some(writer) = &self.writer {
            writer.arm(ttl);
        }
        self.cell.set(update);
    }

    pub fn update_with_ttl(&self, updater: impl FnOnce(&T) -> T, ttl: Ttl) {
        if let Some(writer) = &self.writer {
            writer.arm(ttl);
        }
        self.cell.update(updater);
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            writer: self.writer.clone(),
        }
    }
}

/// Dispatch half of a cached reducer cell.
pub struct Dispatch<S, A> {
    cell: ReducerCell<S, A>,
    writer: Option<Rc<CacheWriter>>,
}

impl<S: Clone + 'static, A: 'static> Dispatch<S, A> {
    pub fn dispatch(&self, action: A) {
        self.cell.dispatch(action);
    }

    pub fn dispatch_with_ttl(&self, action: A, ttl: Ttl) {
        if let Some(writer) = &self.writer {
            writer.arm(ttl);
        }
        self.cell.dispatch(action);
    }
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            writer: self.writer.clone(),
        }
    }
}

/// Clears the cache entry. A no-op for uncached instances; safe to call repeatedly.
#[derive(Clone)]
pub struct RemoveFromCache {
    writer: Option<Rc<CacheWriter>>,
}

impl RemoveFromCache {
    pub fn remove(&self) {
        if let Some(writer) = &self.writer {
            writer.remove();
        }
    }
}

impl fmt::Debug for RemoveFromCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveFromCache")
            .field("key", &self.writer.as_ref().map(|w| w.key.as_str()))
            .finish()
    }
}

/// A mounted value cell backed by the cache: `(state, set, remove)`.
pub struct CachedState<T> {
    state: ValueCell<T>,
    set: SetState<T>,
    remove: RemoveFromCache,
}

impl<T: Clone + 'static> CachedState<T> {
    fn mount(cell: ValueCell<T>, writer: Option<Rc<CacheWriter>>) -> Self {
        Self {
            state: cell.clone(),
            set: SetState {
                cell,
                writer: writer.clone(),
            },
            remove: RemoveFromCache { writer },
        }
    }

    pub fn get(&self) -> T {
        self.state.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.state.with(f)
    }

    pub fn set(&self, update: impl Into<Update<T>>) {
        self.set.set(update);
    }

    pub fn update(&self, updater: impl FnOnce(&T) -> T) {
        self.set.update(updater);
    }

    pub fn set_with_ttl(&self, update: impl Into<Update<T>>, ttl: Ttl) {
        self.set.set_with_ttl(update, ttl);
    }

    pub fn update_with_ttl(&self, updater: impl FnOnce(&T) -> T, ttl: Ttl) {
        self.set.update_with_ttl(updater, ttl);
    }

    pub fn remove(&self) {
        self.remove.remove();
    }

    pub fn is_cached(&self) -> bool {
        self.remove.writer.is_some()
    }

    pub fn into_parts(self) -> (ValueCell<T>, SetState<T>, RemoveFromCache) {
        (self.state, self.set, self.remove)
    }
}

impl<T: fmt::Debug> fmt::Debug for CachedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedState")
            .field("state", &self.state)
            .field("remove", &self.remove)
            .finish()
    }
}

/// A mounted reducer cell backed by the cache: `(state, dispatch, remove)`.
pub struct CachedReducer<S, A> {
    state: ReducerCell<S, A>,
    dispatch: Dispatch<S, A>,
    remove: RemoveFromCache,
}

impl<S: Clone + 'static, A: 'static> CachedReducer<S, A> {
    fn mount(cell: ReducerCell<S, A>, writer: Option<Rc<CacheWriter>>) -> Self {
        Self {
            state: cell.clone(),
            dispatch: Dispatch {
                cell,
                writer: writer.clone(),
            },
            remove: RemoveFromCache { writer },
        }
    }

    pub fn get(&self) -> S {
        self.state.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.state.with(f)
    }

    pub fn dispatch(&self, action: A) {
        self.dispatch.dispatch(action);
    }

    pub fn dispatch_with_ttl(&self, action: A, ttl: Ttl) {
        self.dispatch.dispatch_with_ttl(action, ttl);
    }

    pub fn remove(&self) {
        self.remove.remove();
    }

    pub fn is_cached(&self) -> bool {
        self.remove.writer.is_some()
    }

    pub fn into_parts(self) -> (ReducerCell<S, A>, Dispatch<S, A>, RemoveFromCache) {
        (self.state, self.dispatch, self.remove)
    }
}

impl<S: fmt::Debug, A> fmt::Debug for CachedReducer<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedReducer")
            .field("state", &self.state)
            .field("remove", &self.remove)
            .finish()
    }
}

/// A primitive chosen at runtime, see [`Cached::adapt`].
pub enum Primitive<S, A> {
    ValueCell(Initial<S>),
    ReducerCell {
        reducer: Rc<dyn Fn(&S, A) -> S>,
        initial: Initial<S>,
    },
}

impl<S: 'static, A: 'static> Primitive<S, A> {
    pub fn reducer(reducer: impl Fn(&S, A) -> S + 'static, initial: Initial<S>) -> Self {
        Self::ReducerCell {
            reducer: Rc::new(reducer),
            initial,
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::ValueCell(_) => PrimitiveKind::ValueCell,
            Primitive::ReducerCell { .. } => PrimitiveKind::ReducerCell,
        }
    }
}

pub enum Adapted<S, A> {
    ValueCell(CachedState<S>),
    ReducerCell(CachedReducer<S, A>),
}

impl<S: Clone + 'static, A: 'static> Adapted<S, A> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Adapted::ValueCell(_) => PrimitiveKind::ValueCell,
            Adapted::ReducerCell(_) => PrimitiveKind::ReducerCell,
        }
    }

    pub fn get(&self) -> S {
        match self {
            Adapted::ValueCell(state) => state.get(),
            Adapted::ReducerCell(reducer) => reducer.get(),
        }
    }

    pub fn remove(&self) {
        match self {
            Adapted::ValueCell(state) => state.remove(),
            Adapted::ReducerCell(reducer) => reducer.remove(),
        }
    }
}

/// Cache binding for one key. Mount state primitives through it with
/// [`Cached::use_state`], [`Cached::use_reducer`] or [`Cached::adapt`].
///
/// Built without a key, every primitive it mounts is a plain, uncached one.
#[derive(Clone)]
pub struct Cached {
    store: Arc<dyn ExpiringStore>,
    key: Option<CacheKey>,
    ttl: Option<Ttl>,
    ttl_override: TtlOverride,
    presence: Presence,
}

impl Cached {
    /// Fails with `InvalidKey` / `InvalidTtl` before anything touches the store.
    /// A `None` key opts out of caching; the ttl is still checked.
    pub fn new(store: Arc<dyn ExpiringStore>, key: Option<&str>, ttl: Option<f64>) -> Result<Self> {
        let (key, ttl) = match key {
            Some(key) => {
                let (key, ttl) = validation::validate(key, ttl)?;
                (Some(key), ttl)
            }
            None => (None, ttl.map(Ttl::new).transpose()?),
        };
        Ok(Self::from_parts(store, key, ttl))
    }

    /// Same as [`Cached::new`] for untyped input, where a `null` key opts out of caching.
    pub fn from_value(store: Arc<dyn ExpiringStore>, key: &Value, ttl: &Value) -> Result<Self> {
        let parts = validation::validate_value(key, ttl)?;
        Ok(match parts {
            Some((key, ttl)) => Self::from_parts(store, Some(key), ttl),
            None => Self::from_parts(store, None, None),
        })
    }

    fn from_parts(store: Arc<dyn ExpiringStore>, key: Option<CacheKey>, ttl: Option<Ttl>) -> Self {
        Self {
            store,
            key,
            ttl,
            ttl_override: TtlOverride::default(),
            presence: Presence::default(),
        }
    }

    pub fn with_ttl_override(mut self, ttl_override: TtlOverride) -> Self {
        self.ttl_override = ttl_override;
        self
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    pub fn ttl(&self) -> Option<Ttl> {
        self.ttl
    }

    fn writer(&self) -> Option<Rc<CacheWriter>> {
        self.key.as_ref().map(|key| {
            Rc::new(CacheWriter {
                store: Arc::clone(&self.store),
                key: key.clone(),
                ttl: Cell::new(self.ttl),
                pending: Cell::new(None),
                ttl_override: self.ttl_override,
            })
        })
    }

    /// Resolves the initial state: a present cache entry wins and `initial` is
    /// dropped unresolved, so lazy initializers never run on a hit.
    fn seed<T: DeserializeOwned>(&self, writer: &CacheWriter, initial: Initial<T>) -> Initial<T> {
        match writer.read(self.presence) {
            Some(cached) => Initial::Value(cached),
            None => initial,
        }
    }

    /// Mounts a value cell.
    pub fn use_state<T>(&self, initial: Initial<T>) -> CachedState<T>
    where
        T: Serialize + DeserializeOwned + Clone + 'static,
    {
        let Some(writer) = self.writer() else {
            return CachedState::mount(ValueCell::from_initial(initial), None);
        };

        let cell = ValueCell::from_initial(self.seed(&writer, initial));
        let observer = Rc::clone(&writer);
        cell.on_commit(move |state| observer.commit(state));
        cell.with(|state| writer.commit(state));
        CachedState::mount(cell, Some(writer))
    }

    /// Mounts a reducer cell. Use [`Initial::transform`] for an init transform;
    /// it is skipped when the cache supplies the state.
    pub fn use_reducer<S, A>(
        &self,
        reducer: impl Fn(&S, A) -> S + 'static,
        initial: Initial<S>,
    ) -> CachedReducer<S, A>
    where
        S: Serialize + DeserializeOwned + Clone + 'static,
        A: 'static,
    {
        self.mount_reducer(Rc::new(reducer), initial)
    }

    fn mount_reducer<S, A>(
        &self,
        reducer: Rc<dyn Fn(&S, A) -> S>,
        initial: Initial<S>,
    ) -> CachedReducer<S, A>
    where
        S: Serialize + DeserializeOwned + Clone + 'static,
        A: 'static,
    {
        let Some(writer) = self.writer() else {
            return CachedReducer::mount(ReducerCell::from_rc(reducer, initial), None);
        };

        let cell = ReducerCell::from_rc(reducer, self.seed(&writer, initial));
        let observer = Rc::clone(&writer);
        cell.on_commit(move |state| observer.commit(state));
        cell.with(|state| writer.commit(state));
        CachedReducer::mount(cell, Some(writer))
    }

    /// Mounts whichever primitive `primitive` describes.
    pub fn adapt<S, A>(&self, primitive: Primitive<S, A>) -> Adapted<S, A>
    where
        S: Serialize + DeserializeOwned + Clone + 'static,
        A: 'static,
    {
        match primitive {
            Primitive::ValueCell(initial) => Adapted::ValueCell(self.use_state(initial)),
            Primitive::ReducerCell { reducer, initial } => {
                Adapted::ReducerCell(self.mount_reducer(reducer, initial))
            }
        }
    }
}

impl fmt::Debug for Cached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("ttl_override", &self.ttl_override)
            .field("presence", &self.presence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use shared::ExpiryUnit;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
        unit: Mutex<ExpiryUnit>,
        calls: AtomicUsize,
        sets: AtomicUsize,
    }

    impl MapStore {
        fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn with_unit(unit: ExpiryUnit) -> Arc<Self> {
            let store = Self::default();
            *store.unit.lock().unwrap() = unit;
            Arc::new(store)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn sets(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }
    }

    impl ExpiringStore for MapStore {
        fn get(&self, key: &str) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                    entries.remove(key);
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value.clone())),
                None => Ok(None),
            }
        }

        fn set(&self, key: &str, value: Value, ttl: Option<Ttl>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sets.fetch_add(1, Ordering::SeqCst);
            let deadline = ttl
                .and_then(|ttl| ttl.lifetime(self.expiry_unit()))
                .map(|lifetime| Instant::now() + lifetime);
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, deadline));
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }

        fn flush(&self) -> Result<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }

        fn configure_expiry_unit(&self, unit: ExpiryUnit) {
            *self.unit.lock().unwrap() = unit;
        }

        fn expiry_unit(&self) -> ExpiryUnit {
            *self.unit.lock().unwrap()
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    enum Action {
        Increment,
        Decrement,
        Reset(i64),
    }

    fn reducer(state: &Counter, action: Action) -> Counter {
        match action {
            Action::Increment => Counter { count: state.count + 1 },
            Action::Decrement => Counter { count: state.count - 1 },
            Action::Reset(count) => Counter { count },
        }
    }

    fn init(count: i64) -> Counter {
        Counter { count }
    }

    fn cached(store: &Arc<MapStore>, key: &str, ttl: Option<f64>) -> Cached {
        Cached::new(store.clone(), Some(key), ttl).unwrap()
    }

    #[test]
    fn test_invalid_arguments_fail_before_store_is_touched() {
        let store = MapStore::shared();
        assert!(matches!(
            Cached::new(store.clone(), Some(""), None),
            Err(Error::InvalidKey)
        ));
        assert!(matches!(
            Cached::new(store.clone(), Some("K"), Some(-1.0)),
            Err(Error::InvalidTtl(_))
        ));
        assert!(matches!(
            Cached::from_value(store.clone(), &json!(123), &Value::Null),
            Err(Error::InvalidKey)
        ));
        assert!(matches!(
            Cached::from_value(store.clone(), &json!("K"), &json!(true)),
            Err(Error::InvalidTtl(_))
        ));
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn test_unsupported_primitive_kind() {
        assert_eq!("value".parse::<PrimitiveKind>().unwrap(), PrimitiveKind::ValueCell);
        assert_eq!("Reducer".parse::<PrimitiveKind>().unwrap(), PrimitiveKind::ReducerCell);
        for bad in ["", "effect", "memo"] {
            assert!(matches!(
                bad.parse::<PrimitiveKind>(),
                Err(Error::UnsupportedPrimitive(_))
            ));
        }
    }

    #[test]
    fn test_value_cell_seeds_and_writes_through() {
        let store = MapStore::shared();
        let state = cached(&store, "K", None).use_state(Initial::Value(5));
        assert_eq!(state.get(), 5);
        assert_eq!(store.get("K").unwrap(), Some(json!(5)));

        state.update(|prev| prev + 1);
        assert_eq!(state.get(), 6);
        assert_eq!(store.get("K").unwrap(), Some(json!(6)));

        state.set(Update::with(|prev: &i32| prev * 10));
        assert_eq!(state.get(), 60);
        assert_eq!(store.get("K").unwrap(), Some(json!(60)));
    }

    #[test]
    fn test_lazy_initializer_used_on_miss() {
        let store = MapStore::shared();
        let state = cached(&store, "K", Some(50.0)).use_state(Initial::lazy(|| 0.25));
        assert_eq!(state.get(), 0.25);
        assert_eq!(store.get("K").unwrap(), Some(json!(0.25)));
    }

    #[test]
    fn test_cache_wins_over_initializers() {
        let store = MapStore::shared();
        store.set("K", json!(3), None).unwrap();

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let state = cached(&store, "K", None).use_state(Initial::lazy(move || {
            flag.set(true);
            4
        }));
        assert_eq!(state.get(), 3);
        assert!(!ran.get());

        let plain = cached(&store, "K", None).use_state(Initial::Value(4));
        assert_eq!(plain.get(), 3);
    }

    #[test]
    fn test_reducer_cache_wins_and_skips_init_transform() {
        let store = MapStore::shared();
        store.set("K", json!({"count": 9}), None).unwrap();

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let counter = cached(&store, "K", None).use_reducer(
            reducer,
            Initial::transform(0, move |count| {
                flag.set(true);
                init(count)
            }),
        );
        assert_eq!(counter.get(), init(9));
        assert!(!ran.get());
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 9})));
    }

    #[test]
    fn test_reducer_dispatch_writes_through() {
        let store = MapStore::shared();
        let counter = cached(&store, "K", None).use_reducer(reducer, Initial::transform(2, init));
        assert_eq!(counter.get(), init(2));

        counter.dispatch(Action::Decrement);
        assert_eq!(counter.get(), init(1));
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 1})));

        counter.dispatch(Action::Reset(7));
        counter.dispatch(Action::Increment);
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 8})));
    }

    #[test]
    fn test_remove_clears_cache_only_and_is_idempotent() {
        let store = MapStore::shared();
        let state = cached(&store, "K", None).use_state(Initial::Value(1));
        state.set(2);

        state.remove();
        assert_eq!(state.get(), 2);
        assert_eq!(store.get("K").unwrap(), None);

        state.remove();
        assert_eq!(state.get(), 2);
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[test]
    fn test_set_after_remove_writes_again() {
        let store = MapStore::shared();
        let state = cached(&store, "K", None).use_state(Initial::Value(1));
        state.remove();
        state.set(1);
        assert_eq!(store.get("K").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_every_commit_is_written() {
        let store = MapStore::shared();
        let state = cached(&store, "K", None).use_state(Initial::Value(1));
        assert_eq!(store.sets(), 1);
        state.set(1);
        state.update(|prev| *prev);
        assert_eq!(store.sets(), 3);
    }

    #[test]
    fn test_same_value_restores_entry_overwritten_by_other_instance() {
        let store = MapStore::shared();
        let first = cached(&store, "K", None).use_state(Initial::Value(2));
        let second = cached(&store, "K", None).use_state(Initial::Value(0));
        second.set(3);
        assert_eq!(store.get("K").unwrap(), Some(json!(3)));

        first.set(2);
        assert_eq!(first.get(), 2);
        assert_eq!(store.get("K").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_same_value_rewrites_expired_entry() {
        let store = MapStore::with_unit(ExpiryUnit::MILLISECOND);
        let state = cached(&store, "K", Some(20.0)).use_state(Initial::Value(0));
        state.set(42);
        sleep(Duration::from_millis(50));
        assert_eq!(store.get("K").unwrap(), None);

        state.set(42);
        assert_eq!(store.get("K").unwrap(), Some(json!(42)));
    }

    #[test]
    fn test_no_key_bypasses_cache() {
        let store = MapStore::shared();
        let cache = Cached::new(store.clone(), None, None).unwrap();
        assert!(cache.key().is_none());

        let state = cache.use_state(Initial::Value(0.5));
        assert!(!state.is_cached());
        assert_eq!(state.get(), 0.5);
        state.set(1.5);
        state.set_with_ttl(2.5, Ttl::new(1.0).unwrap());
        state.remove();
        assert_eq!(state.get(), 2.5);

        let counter = Cached::from_value(store.clone(), &Value::Null, &Value::Null)
            .unwrap()
            .use_reducer(reducer, Initial::Value(init(0)));
        counter.dispatch(Action::Increment);
        counter.remove();
        assert_eq!(counter.get(), init(1));

        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn test_into_parts() {
        let store = MapStore::shared();
        let (state, set, remove) = cached(&store, "K", None)
            .use_state(Initial::Value("a".to_string()))
            .into_parts();
        set.set("b".to_string());
        assert_eq!(state.get(), "b");
        assert_eq!(store.get("K").unwrap(), Some(json!("b")));
        remove.remove();
        assert_eq!(state.get(), "b");
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[test]
    fn test_expired_entry_reads_as_absent_state_intact() {
        let store = MapStore::with_unit(ExpiryUnit::MILLISECOND);
        let state = cached(&store, "K", Some(30.0)).use_state(Initial::Value(0));
        state.set(42);
        assert_eq!(store.get("K").unwrap(), Some(json!(42)));

        sleep(Duration::from_millis(60));
        assert_eq!(state.get(), 42);
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[test]
    fn test_one_shot_ttl_override() {
        let store = MapStore::with_unit(ExpiryUnit::MILLISECOND);
        let state = cached(&store, "K", None).use_state(Initial::Value(0));
        state.set_with_ttl(1, Ttl::new(30.0).unwrap());
        state.set(2);

        sleep(Duration::from_millis(60));
        // the second write carried no ttl
        assert_eq!(store.get("K").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_one_shot_ttl_override_expires() {
        let store = MapStore::with_unit(ExpiryUnit::MILLISECOND);
        let state = cached(&store, "K", None).use_state(Initial::Value(0));
        state.update_with_ttl(|prev| prev + 1, Ttl::new(30.0).unwrap());
        assert_eq!(store.get("K").unwrap(), Some(json!(1)));

        sleep(Duration::from_millis(60));
        assert_eq!(state.get(), 1);
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[test]
    fn test_sticky_ttl_override() {
        let store = MapStore::with_unit(ExpiryUnit::MILLISECOND);
        let counter = cached(&store, "K", None)
            .with_ttl_override(TtlOverride::Sticky)
            .use_reducer(reducer, Initial::Value(init(0)));
        counter.dispatch_with_ttl(Action::Increment, Ttl::new(30.0).unwrap());
        counter.dispatch(Action::Increment);
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 2})));

        sleep(Duration::from_millis(60));
        assert_eq!(counter.get(), init(2));
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[test]
    fn test_falsy_cached_values_under_each_policy() {
        let store = MapStore::shared();
        store.set("zero", json!(0), None).unwrap();
        store.set("empty", json!(""), None).unwrap();
        store.set("no", json!(false), None).unwrap();

        let defined = cached(&store, "zero", None);
        assert_eq!(defined.use_state(Initial::Value(5)).get(), 0);

        let truthy = |key: &str| cached(&store, key, None).with_presence(Presence::Truthy);
        assert_eq!(truthy("zero").use_state(Initial::Value(5)).get(), 5);
        assert_eq!(
            truthy("empty").use_state(Initial::Value("x".to_string())).get(),
            "x"
        );
        assert!(truthy("no").use_state(Initial::Value(true)).get());
        // the fallback state is written back
        assert_eq!(store.get("zero").unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_undecodable_entry_falls_back() {
        let store = MapStore::shared();
        store.set("K", json!("not a counter"), None).unwrap();
        let counter = cached(&store, "K", None).use_reducer(reducer, Initial::Value(init(1)));
        assert_eq!(counter.get(), init(1));
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 1})));
    }

    #[test]
    fn test_instances_sharing_a_key_see_each_others_writes() {
        let store = MapStore::shared();
        let first = cached(&store, "K", None).use_state(Initial::Value(1));
        first.set(2);
        let second = cached(&store, "K", None).use_state(Initial::Value(100));
        assert_eq!(second.get(), 2);
        second.set(3);
        assert_eq!(first.get(), 2);
        assert_eq!(store.get("K").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_dropping_instance_keeps_entry() {
        let store = MapStore::shared();
        {
            let state = cached(&store, "K", None).use_state(Initial::Value(1));
            state.set(9);
        }
        assert_eq!(store.get("K").unwrap(), Some(json!(9)));
    }

    #[test]
    fn test_adapt_by_kind() {
        let store = MapStore::shared();
        let cache = cached(&store, "K", None);

        let value: Adapted<Counter, Action> = cache.adapt(Primitive::ValueCell(Initial::Value(init(4))));
        assert_eq!(value.kind(), PrimitiveKind::ValueCell);
        assert_eq!(value.get(), init(4));
        value.remove();
        assert_eq!(store.get("K").unwrap(), None);

        let adapted = cache.adapt(Primitive::reducer(reducer, Initial::Value(init(0))));
        assert_eq!(adapted.kind(), PrimitiveKind::ReducerCell);
        match &adapted {
            Adapted::ReducerCell(counter) => counter.dispatch(Action::Increment),
            Adapted::ValueCell(_) => panic!("expected a reducer cell"),
        }
        assert_eq!(adapted.get(), init(1));
        assert_eq!(store.get("K").unwrap(), Some(json!({"count": 1})));
    }
}
