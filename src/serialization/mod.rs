//! JSON text encoding for values crossing the wire.
//!
//! The memcached protocol is textual, so every value is stored as UTF-8 JSON
//! and parsed back into a [`serde_json::Value`] on read.
//!
//! ```rust
//! use cache_refresh::serialization::{decode_value, encode_value};
//! use serde_json::json;
//!
//! # fn main() -> cache_refresh::Result<()> {
//! let bytes = encode_value(&json!({"id": 1, "name": "Alice"}))?;
//! assert_eq!(bytes, br#"{"id":1,"name":"Alice"}"#.to_vec());
//!
//! let value = decode_value(&bytes)?;
//! assert_eq!(value["name"], "Alice");
//! # Ok(())
//! # }
//! ```
//!
//! Batch operations use the lenient variants: a value that can't be encoded
//! or decoded is logged and passed through as raw text instead of failing the
//! whole batch.

use crate::error::{Error, Result};
use serde_json::Value;

/// Encode a value as JSON text.
///
/// # Errors
/// `Error::SerializationError` if serde_json rejects the value.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Decode JSON text read from the cache.
///
/// # Errors
/// `Error::DeserializationError` if the bytes are not valid JSON.
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Encode for a batch write: on failure log and fall back to the value's
/// plain text rendering.
pub fn encode_or_raw(key: &str, value: &Value) -> Vec<u8> {
    match encode_value(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(
                "mset(): Error converting value to string for key={}, err: {}",
                key, e
            );
            value.to_string().into_bytes()
        }
    }
}

/// Decode for a read: on failure log and keep the stored text as a JSON
/// string, so the caller still gets what the server holds.
pub fn decode_or_raw(key: &str, bytes: &[u8]) -> Value {
    match decode_value(bytes) {
        Ok(value) => value,
        Err(e) => {
            error!("Error parsing JSON for key={}, err: {}", key, e);
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_string_value_is_quoted() {
        let bytes = encode_value(&json!("value")).expect("Failed to encode");
        assert_eq!(bytes, b"\"value\"".to_vec());
    }

    #[test]
    fn test_decode_structured_value() {
        let value = decode_value(br#"{"a":[1,2,3]}"#).expect("Failed to decode");
        assert_eq!(value, json!({"a": [1, 2, 3]}));
    }

    #[test]
    fn test_decode_invalid_json_errors() {
        let result = decode_value(b"value");
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }

    #[test]
    fn test_decode_or_raw_keeps_unparsable_text() {
        assert_eq!(decode_or_raw("k", b"plain text"), json!("plain text"));
        assert_eq!(decode_or_raw("k", b"42"), json!(42));
    }

    #[test]
    fn test_encode_or_raw() {
        assert_eq!(encode_or_raw("k", &json!(1)), b"1".to_vec());
        assert_eq!(encode_or_raw("k", &json!(null)), b"null".to_vec());
    }
}
