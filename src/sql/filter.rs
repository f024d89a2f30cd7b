//! Compiles the ad-hoc filter grammar into WHERE predicates.
//!
//! Grammar, per attribute: a literal means equality; a string starting with
//! `>` / `<` compares on the remainder; `~` is a contains match; `:` is the
//! starts-with operator, which also compiles to a contains pattern wrapping
//! the remainder; an array ORs its recursively compiled elements; a nested
//! object is silently ignored at this level.

use crate::schema::{CompiledSchema, PrimitiveType};
use crate::sql::builder::{quoted, QueryBuf};
use serde_json::{Map, Value};

/// Compile a filter query into predicates on the base table. Attribute names
/// that are neither a local column nor one of the fixed columns are skipped.
pub fn compile(
    schema: &CompiledSchema,
    filter_query: &Map<String, Value>,
    qualifier: &str,
    q: &mut QueryBuf,
) -> Vec<String> {
    let mut parts = Vec::new();
    for (attr, spec) in filter_query {
        let Some(primitive) = column_type(schema, attr) else { continue };
        let col = format!("{}.{}", qualifier, quoted(attr));
        if let Some(predicate) = compile_spec(&col, primitive, spec, q) {
            parts.push(predicate);
        }
    }
    parts
}

fn column_type(schema: &CompiledSchema, attr: &str) -> Option<PrimitiveType> {
    if attr == "id" || attr == "type" {
        return Some(PrimitiveType::String);
    }
    schema.local(attr).map(|c| c.primitive)
}

fn compile_spec(
    col: &str,
    primitive: PrimitiveType,
    spec: &Value,
    q: &mut QueryBuf,
) -> Option<String> {
    match spec {
        Value::String(s) => Some(compile_operator(col, primitive, s, q)),
        Value::Number(_) | Value::Bool(_) => {
            let n = q.push_param(spec.clone());
            Some(format!("{} = ${}", col, n))
        }
        Value::Null => Some(format!("{} IS NULL", col)),
        Value::Array(elements) => {
            let sub: Vec<String> = elements
                .iter()
                .filter_map(|e| compile_spec(col, primitive, e, q))
                .collect();
            if sub.is_empty() {
                None
            } else {
                Some(format!("({})", sub.join(" OR ")))
            }
        }
        // Nested objects are a no-op at this level; reserved for a possible
        // nested-filter form whose semantics are unspecified.
        Value::Object(_) => None,
    }
}

fn compile_operator(col: &str, primitive: PrimitiveType, s: &str, q: &mut QueryBuf) -> String {
    if let Some(rest) = s.strip_prefix('>') {
        let n = q.push_param(comparison_value(primitive, rest));
        format!("{} > ${}", col, n)
    } else if let Some(rest) = s.strip_prefix('<') {
        let n = q.push_param(comparison_value(primitive, rest));
        format!("{} < ${}", col, n)
    } else if let Some(rest) = s.strip_prefix('~') {
        let n = q.push_param(Value::String(format!("%{}%", rest)));
        format!("{}::text LIKE ${}", col, n)
    } else if let Some(rest) = s.strip_prefix(':') {
        let n = q.push_param(Value::String(format!("%{}%", rest)));
        format!("{}::text LIKE ${}", col, n)
    } else {
        let n = q.push_param(literal_value(primitive, s));
        format!("{} = ${}", col, n)
    }
}

/// Number-typed attributes compare numerically; everything else compares on
/// the string as given.
fn comparison_value(primitive: PrimitiveType, raw: &str) -> Value {
    if primitive == PrimitiveType::Number {
        if let Ok(n) = raw.trim().parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Ok(f) = raw.trim().parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}

fn literal_value(primitive: PrimitiveType, raw: &str) -> Value {
    comparison_value(primitive, raw)
}
