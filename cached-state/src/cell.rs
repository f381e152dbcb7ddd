//! Component-local state primitives.
//!
//! Both cells are cheap `Rc` handles: clones share the same state. Observers
//! registered with `on_commit` run after every committed change, in
//! registration order, before the mutating call returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Initial state of a cell: a ready value or a lazy initializer.
pub enum Initial<T> {
    Value(T),
    Lazy(Box<dyn FnOnce() -> T>),
}

impl<T> Initial<T> {
    pub fn lazy(init: impl FnOnce() -> T + 'static) -> Self {
        Self::Lazy(Box::new(init))
    }

    /// Reducer-style initialization: `init(arg)` runs only if the state is actually needed.
    pub fn transform<I: 'static>(arg: I, init: impl FnOnce(I) -> T + 'static) -> Self {
        Self::Lazy(Box::new(move || init(arg)))
    }

    pub fn resolve(self) -> T {
        match self {
            Initial::Value(value) => value,
            Initial::Lazy(init) => init(),
        }
    }
}

impl<T> From<T> for Initial<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Initial<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initial::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Initial::Lazy(_) => f.write_str("Lazy(<fn>)"),
        }
    }
}

/// New state for a value cell: a replacement or an updater over the previous state.
pub enum Update<T> {
    Value(T),
    With(Box<dyn FnOnce(&T) -> T>),
}

impl<T> Update<T> {
    pub fn with(updater: impl FnOnce(&T) -> T + 'static) -> Self {
        Self::With(Box::new(updater))
    }

    pub fn apply(self, prev: &T) -> T {
        match self {
            Update::Value(value) => value,
            Update::With(updater) => updater(prev),
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

type Observer<T> = Rc<dyn Fn(&T)>;

struct Slot<T> {
    state: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
}

impl<T> Slot<T> {
    fn new(state: T) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(state),
            observers: RefCell::new(Vec::new()),
        })
    }

    fn subscribe(&self, observer: Observer<T>) {
        self.observers.borrow_mut().push(observer);
    }
}

impl<T: Clone> Slot<T> {
    fn commit(&self, next: T) {
        *self.state.borrow_mut() = next.clone();
        // neither the state nor the observer list is borrowed while observers run
        let observers: Vec<Observer<T>> = self.observers.borrow().iter().cloned().collect();
        for observer in observers {
            observer(&next);
        }
    }
}

/// A single mutable value with a setter.
pub struct ValueCell<T> {
    slot: Rc<Slot<T>>,
}

impl<T: 'static> ValueCell<T> {
    pub fn new(value: T) -> Self {
        Self::from_initial(Initial::Value(value))
    }

    pub fn lazy(init: impl FnOnce() -> T + 'static) -> Self {
        Self::from_initial(Initial::lazy(init))
    }

    pub fn from_initial(initial: Initial<T>) -> Self {
        Self {
            slot: Slot::new(initial.resolve()),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.slot.state.borrow())
    }

    pub fn on_commit(&self, observer: impl Fn(&T) + 'static) {
        self.slot.subscribe(Rc::new(observer));
    }
}

impl<T: Clone + 'static> ValueCell<T> {
    pub fn get(&self) -> T {
        self.slot.state.borrow().clone()
    }

    pub fn set(&self, update: impl Into<Update<T>>) {
        let next = {
            let prev = self.slot.state.borrow();
            update.into().apply(&prev)
        };
        self.slot.commit(next);
    }

    pub fn update(&self, updater: impl FnOnce(&T) -> T) {
        let next = updater(&self.slot.state.borrow());
        self.slot.commit(next);
    }
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("state", &self.slot.state.borrow())
            .finish()
    }
}

/// State that only changes through a pure `(state, action) -> state` transition.
pub struct ReducerCell<S, A> {
    slot: Rc<Slot<S>>,
    reducer: Rc<dyn Fn(&S, A) -> S>,
}

impl<S: 'static, A: 'static> ReducerCell<S, A> {
    pub fn new(reducer: impl Fn(&S, A) -> S + 'static, state: S) -> Self {
        Self::from_rc(Rc::new(reducer), Initial::Value(state))
    }

    /// The initial state is `init(arg)`.
    pub fn with_init<I: 'static>(
        reducer: impl Fn(&S, A) -> S + 'static,
        arg: I,
        init: impl FnOnce(I) -> S + 'static,
    ) -> Self {
        Self::from_rc(Rc::new(reducer), Initial::transform(arg, init))
    }

    pub(crate) fn from_rc(reducer: Rc<dyn Fn(&S, A) -> S>, initial: Initial<S>) -> Self {
        Self {
            slot: Slot::new(initial.resolve()),
            reducer,
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.slot.state.borrow())
    }

    pub fn on_commit(&self, observer: impl Fn(&S) + 'static) {
        self.slot.subscribe(Rc::new(observer));
    }
}

impl<S: Clone + 'static, A: 'static> ReducerCell<S, A> {
    pub fn get(&self) -> S {
        self.slot.state.borrow().clone()
    }

    pub fn dispatch(&self, action: A) {
        let next = (self.reducer)(&self.slot.state.borrow(), action);
        self.slot.commit(next);
    }
}

impl<S, A> Clone for ReducerCell<S, A> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            reducer: Rc::clone(&self.reducer),
        }
    }
}

impl<S: fmt::Debug, A> fmt::Debug for ReducerCell<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerCell")
            .field("state", &self.slot.state.borrow())
            .finish()
    }
}
