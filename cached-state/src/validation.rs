use serde_json::Value;
use shared::{Error, Result, Ttl};
use std::fmt;

/// A non-empty cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = Error;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = Error;

    fn try_from(key: String) -> Result<Self> {
        Self::new(key)
    }
}

/// Keys coming from untyped input must be JSON strings.
impl TryFrom<&Value> for CacheKey {
    type Error = Error;

    fn try_from(key: &Value) -> Result<Self> {
        match key {
            Value::String(s) => Self::new(s.as_str()),
            _ => Err(Error::InvalidKey),
        }
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks a key and an optional ttl. Has no side effects.
pub fn validate(key: &str, ttl: Option<f64>) -> Result<(CacheKey, Option<Ttl>)> {
    let key = CacheKey::new(key)?;
    let ttl = ttl.map(Ttl::new).transpose()?;
    Ok((key, ttl))
}

/// `null` means no ttl; anything else must be a non-negative number.
pub fn ttl_from_value(ttl: &Value) -> Result<Option<Ttl>> {
    match ttl {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_f64() {
            Some(units) => Ttl::new(units).map(Some),
            None => Err(Error::InvalidTtl(n.to_string())),
        },
        other => Err(Error::InvalidTtl(other.to_string())),
    }
}

/// Untyped variant of [`validate`]. A `null` key is not an error: it yields
/// `Ok(None)` and callers skip caching altogether. The ttl is checked either way.
pub fn validate_value(key: &Value, ttl: &Value) -> Result<Option<(CacheKey, Option<Ttl>)>> {
    if key.is_null() {
        ttl_from_value(ttl)?;
        return Ok(None);
    }
    let key = CacheKey::try_from(key)?;
    let ttl = ttl_from_value(ttl)?;
    Ok(Some((key, ttl)))
}
