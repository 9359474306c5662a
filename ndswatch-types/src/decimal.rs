//! Exact decimal text for numeric status fields.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A numeric field kept as the exact text it had on the wire.
///
/// ndsctl emits counters either as JSON numbers or as strings depending on
/// the version. Both forms are captured verbatim, and conversion to an
/// integer is deferred until a consumer needs it. A value of any other JSON
/// type is kept as its textual form so the surrounding document still decodes;
/// it simply fails integer conversion later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DecimalText(String);

impl DecimalText {
    /// Wrap raw decimal text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The raw text as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the field was absent or empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the text as an unsigned integer.
    ///
    /// Returns `None` for empty, signed, fractional or out-of-range values.
    pub fn to_u64(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }
}

impl fmt::Display for DecimalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DecimalText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<u64> for DecimalText {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = match Value::deserialize(deserializer)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        Ok(Self(text))
    }
}

impl Serialize for DecimalText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_keeps_exact_text() {
        let d: DecimalText = serde_json::from_str("123456789012345678901234567890").unwrap();
        assert_eq!(d.as_str(), "123456789012345678901234567890");
        assert_eq!(d.to_u64(), None);
    }

    #[test]
    fn test_string_form() {
        let d: DecimalText = serde_json::from_str("\"4096\"").unwrap();
        assert_eq!(d.to_u64(), Some(4096));
    }

    #[test]
    fn test_non_numeric_types_decode_but_fail_conversion() {
        let d: DecimalText = serde_json::from_str("true").unwrap();
        assert_eq!(d.as_str(), "true");
        assert_eq!(d.to_u64(), None);

        let d: DecimalText = serde_json::from_str("null").unwrap();
        assert!(d.is_empty());
        assert_eq!(d.to_u64(), None);
    }

    #[test]
    fn test_rejects_signed_and_fractional() {
        assert_eq!(DecimalText::new("-5").to_u64(), None);
        assert_eq!(DecimalText::new("1.5").to_u64(), None);
        assert_eq!(DecimalText::new(" 42 ").to_u64(), Some(42));
    }
}
