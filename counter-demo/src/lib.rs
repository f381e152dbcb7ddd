pub mod config;
pub mod counter;

pub use config::CounterConfig;
pub use counter::{Op, Step, parse_ops, run};

#[derive(thiserror::Error, Debug)]
pub enum CounterError {
    #[error(transparent)]
    Cache(#[from] shared::Error),
    #[error("unknown operation '{0}', expected one of + - random reset remove")]
    UnknownOp(String),
    #[error("reset expects an integer, got {0:?}")]
    InvalidReset(Option<String>),
}
