//! Canonical byte encoding for hashed fields.
//!
//! The encoding is compact JSON with every object's keys written in
//! lexicographic (byte) order, recursively through nested objects and arrays.
//! Array order is significant and preserved. Two field maps with the same keys
//! and values therefore always encode to the same bytes, whatever order they
//! were built in, which is what makes the content hash a function of content
//! alone.
//!
//! Keys are sorted explicitly rather than relying on the iteration order of
//! `serde_json::Map`, which changes when the `preserve_order` feature is
//! enabled anywhere in the dependency graph.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

/// Errors from canonical encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    /// The value could not be converted to a JSON value.
    #[error("value is not representable: {0}")]
    Unrepresentable(String),

    /// The bytes are not valid canonical content.
    #[error("invalid canonical bytes: {0}")]
    Invalid(String),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a JSON value canonically.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    // Writing into a Vec cannot fail.
    let _ = write_canonical(&mut out, value);
    out
}

/// Encode any serializable value canonically.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Unrepresentable(e.to_string()))?;
    Ok(encode(&value))
}

/// Decode canonical bytes back into a JSON value.
pub fn decode(bytes: &[u8]) -> Result<Value, CanonicalError> {
    serde_json::from_slice(bytes).map_err(|e| CanonicalError::Invalid(e.to_string()))
}

fn write_canonical<W: Write>(out: &mut W, value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.write_all(b"{")?;
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                write_scalar(out, &Value::String(key.clone()))?;
                out.write_all(b":")?;
                write_canonical(out, &map[key])?;
            }
            out.write_all(b"}")?;
        }
        Value::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                write_canonical(out, item)?;
            }
            out.write_all(b"]")?;
        }
        scalar => write_scalar(out, scalar)?,
    }
    Ok(())
}

fn write_scalar<W: Write>(out: &mut W, value: &Value) -> Result<(), CanonicalError> {
    serde_json::to_writer(out, value).map_err(|e| CanonicalError::Unrepresentable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    #[test]
    fn keys_are_sorted() {
        let value = json!({"b": 1, "a": 2, "c": {"z": true, "y": null}});
        assert_eq!(
            String::from_utf8(encode(&value)).unwrap(),
            r#"{"a":2,"b":1,"c":{"y":null,"z":true}}"#
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!({"rules": [{"type": "start", "value": 1}, {"value": 2, "type": "end"}]});
        assert_eq!(
            String::from_utf8(encode(&value)).unwrap(),
            r#"{"rules":[{"type":"start","value":1},{"type":"end","value":2}]}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({"summary": "line\n\"quoted\""});
        let bytes = encode(&value);
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(encode(&json!({"summary": "X"})), encode(&json!({"summary": "Y"})));
    }

    #[test]
    fn encode_value_accepts_structs() {
        #[derive(Serialize)]
        struct Content {
            summary: &'static str,
            calendar: &'static str,
        }
        let bytes = encode_value(&Content {
            summary: "X",
            calendar: "gregorian",
        })
        .unwrap();
        assert_eq!(bytes, br#"{"calendar":"gregorian","summary":"X"}"#.to_vec());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"{not json"), Err(CanonicalError::Invalid(_))));
    }

    fn build_map(pairs: &[(String, i64)], nested: bool) -> Value {
        let mut map = Map::new();
        for (k, v) in pairs {
            let value = if nested { json!({"v": v, "k": k}) } else { json!(v) };
            map.insert(k.clone(), value);
        }
        Value::Object(map)
    }

    proptest! {
        #[test]
        fn encoding_ignores_insertion_order(
            pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16),
            nested in any::<bool>(),
        ) {
            let forward: Vec<(String, i64)> = pairs.clone().into_iter().collect();
            let mut reversed = forward.clone();
            reversed.reverse();
            prop_assert_eq!(
                encode(&build_map(&forward, nested)),
                encode(&build_map(&reversed, nested))
            );
        }
    }
}
