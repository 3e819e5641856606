//! Small wire-format decoding helpers shared by both payload parsers.

use ierc_types::{Decimal, ErrCode, ProtocolError};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A `u64` that is only accepted as a quoted decimal string on the wire
/// (`"id": "3"`). Bare JSON numbers are a format error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotedU64(pub u64);

impl<'de> Deserialize<'de> for QuotedU64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>
    {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = QuotedU64;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a decimal string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error
            {
                v.parse::<u64>()
                    .map(QuotedU64)
                    .map_err(|_| E::custom("invalid number string"))
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

pub(crate) fn invalid_params(message: impl Into<String>) -> ProtocolError {
    ProtocolError::new(ErrCode::InvalidProtocolParams, message)
}

/// Whether a work constraint has the required shape: `0x` followed by one to
/// 64 lowercase hex digits.
pub(crate) fn valid_work_c(work_c: &str) -> bool {
    let Some(digits) = work_c.strip_prefix("0x") else { return false };
    !digits.is_empty()
        && digits.len() <= 64
        && digits.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Decodes a decimal that may arrive as either a JSON string or a JSON
/// number. The number's source text is preserved, so nothing is squeezed
/// through a float.
pub(crate) fn decimal_from_value(value: &Value, field: &str) -> Result<Decimal, ProtocolError> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(invalid_params(format!("invalid {field}")))
    };

    text.parse()
        .map_err(|_| invalid_params(format!("invalid {field}")))
}

/// Serde adapter for struct fields that use [`decimal_from_value`] rules.
pub(crate) fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>
{
    let value = Value::deserialize(deserializer)?;
    decimal_from_value(&value, "decimal").map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use ierc_types::dec;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        id: QuotedU64
    }

    #[test]
    fn quoted_u64_accepts_strings_only() {
        let w: Wrapper = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
        assert_eq!(w.id, QuotedU64(42));

        // bare numbers are a format violation
        assert!(serde_json::from_str::<Wrapper>(r#"{"id": 42}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"id": "x"}"#).is_err());

        // missing field falls back to zero
        let w: Wrapper = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(w.id, QuotedU64(0));
    }

    #[test]
    fn decimal_values_keep_full_precision() {
        let v: Value = serde_json::from_str("0.000000000000000001").unwrap();
        assert_eq!(decimal_from_value(&v, "amt").unwrap(), dec("0.000000000000000001"));

        let v = Value::String(" 100.5 ".to_string());
        assert_eq!(decimal_from_value(&v, "amt").unwrap(), dec("100.5"));

        assert!(decimal_from_value(&Value::Bool(true), "amt").is_err());
        assert!(decimal_from_value(&Value::Null, "amt").is_err());
    }
}
