//! Rebuilds the flat wire resource from a joined, column-prefixed read row.

use crate::meta;
use crate::schema::{Cardinality, CompiledSchema};
use serde_json::{Map, Value};

/// Convert one joined row into the nested resource shape. Relation values
/// arrive under `<resource>-<attribute>` keys; they are moved to the bare
/// attribute name with the internal `uid` and synthetic FK fields removed
/// and `meta` decoded. Null locals and absent to-one values are omitted; an
/// empty to-many stays an empty array.
pub fn normalize(schema: &CompiledSchema, row: Value) -> Value {
    let cells = match row {
        Value::Object(cells) => cells,
        other => return other,
    };
    let prefix = format!("{}-", schema.resource);
    let mut out = Map::new();

    for (key, value) in cells {
        if let Some(attr) = key.strip_prefix(&prefix) {
            let Some(rel) = schema.relation(attr) else { continue };
            match (value, rel.cardinality) {
                (Value::Array(rows), _) => {
                    let cleaned: Vec<Value> = rows
                        .into_iter()
                        .map(|v| clean_relation_value(&rel.fk_column, v))
                        .collect();
                    out.insert(attr.to_string(), Value::Array(cleaned));
                }
                (Value::Null, Cardinality::Many) => {
                    out.insert(attr.to_string(), Value::Array(Vec::new()));
                }
                (Value::Null, Cardinality::One) => {}
                (v, _) => {
                    out.insert(attr.to_string(), clean_relation_value(&rel.fk_column, v));
                }
            }
            continue;
        }
        if key == "uid" {
            continue;
        }
        if key == "meta" {
            let decoded = meta::decode(&value);
            if !decoded.is_null() {
                out.insert(key, decoded);
            }
            continue;
        }
        if !value.is_null() {
            out.insert(key, value);
        }
    }

    Value::Object(out)
}

fn clean_relation_value(fk_column: &str, value: Value) -> Value {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return other,
    };
    obj.remove("uid");
    obj.remove(fk_column);
    match obj.get("meta").map(meta::decode) {
        None | Some(Value::Null) => {
            obj.remove("meta");
        }
        Some(decoded) => {
            obj.insert("meta".to_string(), decoded);
        }
    }
    Value::Object(obj)
}
