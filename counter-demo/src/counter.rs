use crate::{CounterConfig, CounterError};
use cached_state::{Cached, ExpiringStore, Initial, PrimitiveKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

pub enum Action {
    Increment,
    Decrement,
    Reset(i64),
}

pub fn reducer(state: &Counter, action: Action) -> Counter {
    match action {
        Action::Increment => Counter { count: state.count + 1 },
        Action::Decrement => Counter { count: state.count - 1 },
        Action::Reset(count) => Counter { count },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Increment,
    Decrement,
    Randomize,
    Reset(i64),
    Remove,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Increment => f.write_str("+"),
            Op::Decrement => f.write_str("-"),
            Op::Randomize => f.write_str("random"),
            Op::Reset(count) => write!(f, "reset {}", count),
            Op::Remove => f.write_str("remove"),
        }
    }
}

/// Parses `+ - random reset <n> remove` into operations.
pub fn parse_ops<I>(args: I) -> Result<Vec<Op>, CounterError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut args = args.into_iter();
    let mut ops = Vec::new();
    while let Some(arg) = args.next() {
        let op = match arg.as_ref() {
            "+" | "inc" => Op::Increment,
            "-" | "dec" => Op::Decrement,
            "random" => Op::Randomize,
            "remove" => Op::Remove,
            "reset" => {
                let raw = args.next().map(|a| a.as_ref().to_string());
                match raw.as_deref().map(str::parse::<i64>) {
                    Some(Ok(count)) => Op::Reset(count),
                    _ => return Err(CounterError::InvalidReset(raw)),
                }
            }
            other => return Err(CounterError::UnknownOp(other.to_string())),
        };
        ops.push(op);
    }
    Ok(ops)
}

/// State after mounting (`op == None`) or after one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub op: Option<Op>,
    pub count: i64,
    pub cached: Option<i64>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.op.map_or_else(|| "mount".to_string(), |op| op.to_string());
        match self.cached {
            Some(cached) => write!(f, "{:>8}  count: {}  cached: {}", label, self.count, cached),
            None => write!(f, "{:>8}  count: {}  cached: none", label, self.count),
        }
    }
}

fn random_count() -> i64 {
    rand::random_range(0..10)
}

fn cached_count(store: &dyn ExpiringStore, key: &str, kind: PrimitiveKind) -> Option<i64> {
    let value = store.get(key).ok().flatten()?;
    match kind {
        PrimitiveKind::ValueCell => value.as_i64(),
        PrimitiveKind::ReducerCell => value.get("count").and_then(Value::as_i64),
    }
}

/// Mounts a counter of `kind` and applies `ops` to it.
pub fn run(
    store: Arc<dyn ExpiringStore>,
    config: &CounterConfig,
    kind: PrimitiveKind,
    ops: &[Op],
) -> Result<Vec<Step>, CounterError> {
    let cache = Cached::new(Arc::clone(&store), Some(&config.key), config.ttl)?;
    info!("Mounting {} counter under '{}' (ttl: {:?})", kind, config.key, config.ttl);

    let snapshot = |op: Option<Op>, count: i64| Step {
        op,
        count,
        cached: cached_count(store.as_ref(), &config.key, kind),
    };

    let mut steps = Vec::with_capacity(ops.len() + 1);
    match kind {
        PrimitiveKind::ValueCell => {
            // count comes from the cache when a live entry exists
            let state = cache.use_state(Initial::lazy(random_count));
            steps.push(snapshot(None, state.get()));
            for &op in ops {
                match op {
                    Op::Increment => state.update(|prev| prev + 1),
                    Op::Decrement => state.update(|prev| prev - 1),
                    Op::Randomize => state.set(random_count()),
                    Op::Reset(count) => state.set(count),
                    Op::Remove => state.remove(),
                }
                steps.push(snapshot(Some(op), state.get()));
            }
        }
        PrimitiveKind::ReducerCell => {
            let initial_count = random_count();
            let counter = cache.use_reducer(
                reducer,
                Initial::transform(initial_count, |count| Counter { count }),
            );
            steps.push(snapshot(None, counter.get().count));
            for &op in ops {
                match op {
                    Op::Increment => counter.dispatch(Action::Increment),
                    Op::Decrement => counter.dispatch(Action::Decrement),
                    Op::Randomize => counter.dispatch(Action::Reset(random_count())),
                    Op::Reset(count) => counter.dispatch(Action::Reset(count)),
                    Op::Remove => counter.remove(),
                }
                steps.push(snapshot(Some(op), counter.get().count));
            }
        }
    }
    Ok(steps)
}
