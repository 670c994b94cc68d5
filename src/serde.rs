//! (De)serialization utils.

use num_bigint::BigUint;
use serde::{
    de::{Error as DeError, Unexpected, Visitor},
    Deserializer, Serializer,
};

use std::fmt;

/// Helper to (de)serialize big unsigned integers as decimal strings. Integers have hundreds
/// of bits, so they cannot be represented as JSON numbers without loss of precision.
///
/// Deserialization also accepts native unsigned integers (convenient for small values
/// in tests and configs), but never floating-point numbers.
#[derive(Debug)]
pub(crate) enum DecimalHelper {}

impl DecimalHelper {
    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

struct DecimalVisitor;

impl Visitor<'_> for DecimalVisitor {
    type Value = BigUint;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("non-negative integer encoded as a decimal string")
    }

    fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
        let is_decimal = !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit());
        if !is_decimal {
            return Err(E::invalid_value(Unexpected::Str(value), &self));
        }
        BigUint::parse_bytes(value.as_bytes(), 10)
            .ok_or_else(|| E::invalid_value(Unexpected::Str(value), &self))
    }

    fn visit_u64<E: DeError>(self, value: u64) -> Result<Self::Value, E> {
        Ok(BigUint::from(value))
    }
}
