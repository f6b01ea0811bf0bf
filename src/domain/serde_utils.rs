//! Serde helpers for Discord snowflake identifiers.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// Snowflakes travel as decimal strings but some payloads carry bare integers.
pub mod snowflake {
    use super::{Deserializer, Serializer, Visitor, de, fmt};

    /// Serializes a u64 as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the serializer fails.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserializes a u64 from a string or number.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither a numeric string nor an unsigned integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StringOrIntVisitor;

        impl Visitor<'_> for StringOrIntVisitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing a snowflake ID")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value).map_err(de::Error::custom)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<u64>().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(StringOrIntVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(with = "super::snowflake")]
        id: u64,
    }

    #[test]
    fn test_snowflake_from_string_and_number() {
        let from_str: Holder = serde_json::from_str(r#"{"id":"80351110224678912"}"#).unwrap();
        let from_num: Holder = serde_json::from_str(r#"{"id":42}"#).unwrap();

        assert_eq!(from_str.id, 80_351_110_224_678_912);
        assert_eq!(from_num.id, 42);
    }

    #[test]
    fn test_snowflake_rejects_garbage() {
        assert!(serde_json::from_str::<Holder>(r#"{"id":"abc"}"#).is_err());
        assert!(serde_json::from_str::<Holder>(r#"{"id":-5}"#).is_err());
    }
}
