//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from the compiled
//! schema. Identifiers only ever come from the schema; values are bound.

use crate::meta;
use crate::schema::{Cardinality, CompiledSchema, RelationDef};
use crate::sql::filter;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Quote identifier for PostgreSQL (safe: only from the compiled schema).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub(crate) fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

const BASE_ALIAS: &str = "base";

fn relation_row_columns(rel: &RelationDef) -> String {
    ["uid", "id", "type", "meta"]
        .iter()
        .map(|c| quoted(c))
        .chain(std::iter::once(quoted(&rel.fk_column)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scalar subquery materializing one relation under its prefixed key:
/// row_to_json for to-one, json_agg (creation order) for to-many. When a
/// related-id constraint is present the subquery only yields matching rows.
fn relation_subquery(rel: &RelationDef, constraint_param: Option<usize>, q_table: &str) -> String {
    let cols = relation_row_columns(rel);
    let mut where_clause = format!(
        "{} = {}.{}",
        quoted(&rel.fk_column),
        BASE_ALIAS,
        quoted("id")
    );
    if let Some(n) = constraint_param {
        where_clause.push_str(&format!(" AND {} = ${}", quoted("id"), n));
    }
    match rel.cardinality {
        Cardinality::One => format!(
            "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} WHERE {}) sub)",
            cols, q_table, where_clause
        ),
        Cardinality::Many => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {} WHERE {} ORDER BY {}) sub)",
            cols,
            q_table,
            where_clause,
            quoted("uid")
        ),
    }
}

/// SELECT of base records with every relation eagerly joined under its
/// `<resource>-<attribute>` key. Optional pieces: `id` (find), `filter`
/// (search predicates), `relationships` (related-id constraints, which both
/// narrow the joined rows and require the base record to have a match).
pub fn select_resources(
    schema: &CompiledSchema,
    id: Option<&str>,
    filter_query: Option<&Map<String, Value>>,
    relationships: Option<&HashMap<String, String>>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&schema.base.table_name);

    let mut select_parts = vec![format!("{}.*", BASE_ALIAS)];
    let mut exists_parts = Vec::new();
    for rel in &schema.relations {
        let q_table = quoted(&rel.table_name);
        let constraint = relationships.and_then(|r| r.get(&rel.attribute));
        let constraint_param = constraint.map(|related_id| {
            let n = q.push_param(Value::String(related_id.clone()));
            exists_parts.push(format!(
                "EXISTS (SELECT 1 FROM {} WHERE {} = {}.{} AND {} = ${})",
                q_table,
                quoted(&rel.fk_column),
                BASE_ALIAS,
                quoted("id"),
                quoted("id"),
                n
            ));
            n
        });
        select_parts.push(format!(
            "{} AS {}",
            relation_subquery(rel, constraint_param, &q_table),
            quoted(&format!("{}-{}", schema.resource, rel.attribute))
        ));
    }

    let mut where_parts = Vec::new();
    if let Some(id) = id {
        let n = q.push_param(Value::String(id.to_string()));
        where_parts.push(format!("{}.{} = ${}", BASE_ALIAS, quoted("id"), n));
    }
    if let Some(f) = filter_query {
        where_parts.extend(filter::compile(schema, f, BASE_ALIAS, &mut q));
    }
    where_parts.extend(exists_parts);

    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}.{}",
        select_parts.join(", "),
        table,
        BASE_ALIAS,
        where_clause,
        BASE_ALIAS,
        quoted("id")
    );
    q
}

/// INSERT of the base row. Fixed columns id/type/meta, then whichever local
/// attributes the resource actually carries; absent locals stay NULL.
pub fn insert_base(schema: &CompiledSchema, resource: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();

    let id = resource.get("id").cloned().unwrap_or(Value::Null);
    let type_ = resource
        .get("type")
        .cloned()
        .unwrap_or_else(|| Value::String(schema.resource.clone()));
    for (name, value) in [
        ("id", id),
        ("type", type_),
        ("meta", meta::encode(resource.get("meta"))),
    ] {
        let n = q.push_param(value);
        cols.push(quoted(name));
        placeholders.push(format!("${}", n));
    }
    for c in &schema.base.locals {
        let Some(value) = resource.get(&c.name) else { continue };
        let n = q.push_param(value.clone());
        cols.push(quoted(&c.name));
        placeholders.push(format!("${}", n));
    }

    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(&schema.base.table_name),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE of the base row's own columns. Returns None when there is nothing
/// to set (empty update is a benign no-op, not an error).
pub fn update_base(
    schema: &CompiledSchema,
    id: &str,
    changes: &[(String, Value)],
) -> Option<QueryBuf> {
    if changes.is_empty() {
        return None;
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (name, value) in changes {
        let bound = if name == "meta" {
            meta::encode(Some(value))
        } else {
            value.clone()
        };
        let n = q.push_param(bound);
        sets.push(format!("{} = ${}", quoted(name), n));
    }
    let id_param = q.push_param(Value::String(id.to_string()));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        quoted(&schema.base.table_name),
        sets.join(", "),
        quoted("id"),
        id_param
    );
    Some(q)
}

/// DELETE of the base row; the FK cascade removes its relation rows.
pub fn delete_base(schema: &CompiledSchema, id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(id.to_string()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}",
        quoted(&schema.base.table_name),
        quoted("id"),
        n
    );
    q
}

/// INSERT of one relation row attached to the given base record. `uid` is
/// assigned by the database and never exposed.
pub fn insert_relation(rel: &RelationDef, base_id: &str, value: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id = q.push_param(value.get("id").cloned().unwrap_or(Value::Null));
    let type_ = q.push_param(value.get("type").cloned().unwrap_or(Value::Null));
    let meta_ = q.push_param(meta::encode(value.get("meta")));
    let fk = q.push_param(Value::String(base_id.to_string()));
    q.sql = format!(
        "INSERT INTO {} ({}, {}, {}, {}) VALUES (${}, ${}, ${}, ${})",
        quoted(&rel.table_name),
        quoted("id"),
        quoted("type"),
        quoted("meta"),
        quoted(&rel.fk_column),
        id,
        type_,
        meta_,
        fk
    );
    q
}

/// DELETE of every relation row owned by the given base record.
pub fn clear_relation(rel: &RelationDef, base_id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(base_id.to_string()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}",
        quoted(&rel.table_name),
        quoted(&rel.fk_column),
        n
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile, AttributeKind, PrimitiveType, ResourceSchema};
    use serde_json::json;

    fn compiled() -> CompiledSchema {
        compile(
            &ResourceSchema::new("articles")
                .attribute("title", AttributeKind::Local(PrimitiveType::String))
                .attribute("views", AttributeKind::Local(PrimitiveType::Number))
                .attribute("author", AttributeKind::ToOne)
                .attribute("tags", AttributeKind::ToMany),
        )
    }

    #[test]
    fn select_joins_every_relation_under_prefixed_key() {
        let q = select_resources(&compiled(), None, None, None);
        assert!(q.sql.contains("AS \"articles-author\""));
        assert!(q.sql.contains("AS \"articles-tags\""));
        assert!(q.sql.contains("row_to_json"));
        assert!(q.sql.contains("json_agg"));
        assert!(q.sql.contains("ORDER BY \"uid\""));
        assert!(q.params.is_empty());
    }

    #[test]
    fn select_by_id_binds_single_param() {
        let q = select_resources(&compiled(), Some("abc-1"), None, None);
        assert!(q.sql.contains("base.\"id\" = $1"));
        assert_eq!(q.params, vec![json!("abc-1")]);
    }

    #[test]
    fn relationship_constraint_narrows_join_and_base_selection() {
        let mut rels = HashMap::new();
        rels.insert("author".to_string(), "person-9".to_string());
        let q = select_resources(&compiled(), None, None, Some(&rels));
        assert!(q.sql.contains("AND \"id\" = $1"));
        assert!(q.sql.contains("EXISTS (SELECT 1 FROM \"articles-author\""));
        assert_eq!(q.params, vec![json!("person-9")]);
    }

    #[test]
    fn insert_base_skips_absent_locals_and_encodes_meta() {
        let resource = json!({
            "id": "abc-1",
            "type": "articles",
            "meta": {"v": 1},
            "title": "hello",
            "author": {"id": "p1", "type": "people"}
        });
        let q = insert_base(&compiled(), resource.as_object().unwrap());
        assert!(q.sql.starts_with("INSERT INTO \"articles\""));
        assert!(q.sql.contains("\"title\""));
        assert!(!q.sql.contains("\"views\""));
        assert!(!q.sql.contains("\"author\""));
        assert_eq!(q.params.len(), 4);
        assert_eq!(q.params[2], json!("{\"v\":1}"));
    }

    #[test]
    fn update_base_with_no_changes_is_none() {
        assert!(update_base(&compiled(), "abc-1", &[]).is_none());
        let q = update_base(&compiled(), "abc-1", &[("title".into(), json!("new"))]).unwrap();
        assert!(q.sql.contains("SET \"title\" = $1"));
        assert!(q.sql.contains("WHERE \"id\" = $2"));
        assert_eq!(q.params, vec![json!("new"), json!("abc-1")]);
    }

    #[test]
    fn relation_rows_carry_fk_back_to_base() {
        let schema = compiled();
        let rel = schema.relation("tags").unwrap();
        let value = json!({"id": "t1", "type": "tags"});
        let q = insert_relation(rel, "abc-1", value.as_object().unwrap());
        assert!(q.sql.contains("\"articles-tags\""));
        assert!(q.sql.contains("\"articleId\""));
        assert_eq!(q.params, vec![json!("t1"), json!("tags"), Value::Null, json!("abc-1")]);

        let q = clear_relation(rel, "abc-1");
        assert_eq!(q.sql, "DELETE FROM \"articles-tags\" WHERE \"articleId\" = $1");
    }
}
