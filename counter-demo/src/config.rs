use cached_state::PrimitiveKind;
use shared::{Error, Result};

pub struct CounterConfig {
    pub key: String,
    pub ttl: Option<f64>,
}

impl CounterConfig {
    const DEFAULT_TTL: f64 = 60.0;

    pub fn from_env(kind: PrimitiveKind) -> Result<Self> {
        let key = std::env::var("CACHED_COUNTER_KEY").unwrap_or_else(|_| Self::default_key(kind));
        let ttl = match std::env::var("CACHED_COUNTER_TTL") {
            Ok(raw) if raw.trim().eq_ignore_ascii_case("none") => None,
            Ok(raw) => Some(raw.trim().parse::<f64>().map_err(|_| Error::InvalidTtl(raw))?),
            Err(_) => Some(Self::DEFAULT_TTL),
        };
        Ok(Self { key, ttl })
    }

    pub fn default_key(kind: PrimitiveKind) -> String {
        format!("CACHED_COUNTER_{}", kind.as_str().to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys_differ_per_kind() {
        assert_eq!(
            CounterConfig::default_key(PrimitiveKind::ValueCell),
            "CACHED_COUNTER_VALUE"
        );
        assert_eq!(
            CounterConfig::default_key(PrimitiveKind::ReducerCell),
            "CACHED_COUNTER_REDUCER"
        );
    }
}
