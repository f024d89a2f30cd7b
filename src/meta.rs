//! Codec for the opaque `meta` value: serialized to a string column on write,
//! decoded back to structured JSON on read.

use serde_json::Value;

/// Serialize a resource's `meta` value for storage. Absent or null meta is
/// stored as SQL NULL rather than the string "null".
pub fn encode(meta: Option<&Value>) -> Value {
    match meta {
        None | Some(Value::Null) => Value::Null,
        Some(v) => Value::String(v.to_string()),
    }
}

/// Decode a stored `meta` column back into its structured form. A cell that
/// is not valid JSON is returned as the raw string (legacy rows).
pub fn decode(cell: &Value) -> Value {
    match cell {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| cell.clone()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_decode_round_trip() {
        let meta = json!({"created": "2016-01-01", "views": 10});
        let stored = encode(Some(&meta));
        assert!(matches!(stored, Value::String(_)));
        assert_eq!(decode(&stored), meta);
    }

    #[test]
    fn absent_meta_stores_null() {
        assert_eq!(encode(None), Value::Null);
        assert_eq!(encode(Some(&Value::Null)), Value::Null);
    }

    #[test]
    fn non_json_cell_passes_through() {
        assert_eq!(decode(&json!("not json {")), json!("not json {"));
        assert_eq!(decode(&Value::Null), Value::Null);
    }
}
