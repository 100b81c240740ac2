//! Value encoding for the remote store.
//!
//! The remote store only sees bytes. `Json` is the binary-safe structured
//! encoding and round-trips any `serde_json::Value`; `Text` stores plain
//! strings and stringifies everything else, which is what you want when a
//! human pokes at the store with a CLI.

use serde_json::Value;
use tiercache_core::{CacheError, Result, SerializationFormat};

pub fn encode(value: &Value, format: SerializationFormat) -> Result<Vec<u8>> {
    match format {
        SerializationFormat::Json => Ok(serde_json::to_vec(value)?),
        SerializationFormat::Text => match value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Ok(other.to_string().into_bytes()),
        },
    }
}

pub fn decode(bytes: &[u8], format: SerializationFormat) -> Result<Value> {
    match format {
        SerializationFormat::Json => Ok(serde_json::from_slice(bytes)?),
        SerializationFormat::Text => String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|e| CacheError::serialization(format!("stored value is not UTF-8: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip() {
        let value = json!({"id": 7, "name": "ada", "tags": ["a", "b"]});
        let bytes = encode(&value, SerializationFormat::Json).unwrap();
        assert_eq!(decode(&bytes, SerializationFormat::Json).unwrap(), value);
    }

    #[test]
    fn test_text_keeps_strings_plain() {
        let bytes = encode(&json!("hello"), SerializationFormat::Text).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(
            decode(&bytes, SerializationFormat::Text).unwrap(),
            json!("hello")
        );
    }

    #[test]
    fn test_text_stringifies_structures() {
        let bytes = encode(&json!({"a": 1}), SerializationFormat::Text).unwrap();
        assert_eq!(
            decode(&bytes, SerializationFormat::Text).unwrap(),
            json!(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let err = decode(b"{ nope", SerializationFormat::Json).unwrap_err();
        assert_eq!(
            err.category(),
            tiercache_core::ErrorCategory::Serialization
        );
    }

    #[test]
    fn test_invalid_utf8_text_is_an_error() {
        assert!(decode(&[0xff, 0xfe], SerializationFormat::Text).is_err());
    }
}
