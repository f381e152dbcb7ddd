// shared/src/lib.rs

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("key must be a non-empty string")]
    InvalidKey,
    #[error("ttl can only be absent or a non-negative number, got {0}")]
    InvalidTtl(String),
    #[error("only value | reducer can be cached, got '{0}'")]
    UnsupportedPrimitive(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Time-to-live of a single cache write, counted in [`ExpiryUnit`]s.
///
/// A ttl of zero never expires, same as an absent ttl.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Ttl(f64);

impl Ttl {
    pub fn new(units: f64) -> Result<Self> {
        if units.is_finite() && units >= 0.0 {
            Ok(Self(units))
        } else {
            Err(Error::InvalidTtl(units.to_string()))
        }
    }

    pub fn units(self) -> f64 {
        self.0
    }

    /// Wall-clock lifetime of an entry written with this ttl, `None` when it never expires.
    pub fn lifetime(self, unit: ExpiryUnit) -> Option<Duration> {
        if self.0 == 0.0 {
            return None;
        }
        let nanos = unit.as_duration().as_nanos() as f64 * self.0;
        // overflowing lifetimes are treated as unbounded
        if nanos >= u64::MAX as f64 {
            return None;
        }
        Some(Duration::from_nanos(nanos.round() as u64))
    }
}

/// What one [`Ttl`] unit means for a store. Defaults to one minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryUnit(Duration);

impl ExpiryUnit {
    pub const MINUTE: ExpiryUnit = ExpiryUnit(Duration::from_secs(60));
    pub const MILLISECOND: ExpiryUnit = ExpiryUnit(Duration::from_millis(1));

    pub const fn new(unit: Duration) -> Self {
        Self(unit)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for ExpiryUnit {
    fn default() -> Self {
        Self::MINUTE
    }
}

pub mod config;
