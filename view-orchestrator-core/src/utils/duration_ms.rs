//! Duration serialization/deserialization helpers.
//!
//! Provides custom Serde serialization/deserialization support:
//! - Serialization: `Duration` -> integer milliseconds
//! - Deserialization: integer milliseconds or a float of milliseconds -> `Duration`

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serializes `Duration` as whole milliseconds.
pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Deserializes `Duration` from milliseconds.
///
/// Negative or non-finite values are rejected.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        U64(u64),
        F64(f64),
    }

    match Millis::deserialize(deserializer)? {
        Millis::U64(ms) => Ok(Duration::from_millis(ms)),
        Millis::F64(ms) if ms.is_finite() && ms >= 0.0 => Ok(Duration::from_secs_f64(ms / 1000.0)),
        Millis::F64(ms) => Err(Error::custom(format!("Invalid millisecond value: {ms}"))),
    }
}
