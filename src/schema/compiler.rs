//! Compiles a resource schema into base + relation table definitions and the
//! DDL that materializes them.

use crate::schema::types::{AttributeKind, PrimitiveType, ResourceSchema};
use crate::sql::quoted;

/// Max length of a caller-supplied resource identifier.
pub const ID_MAX_LEN: u32 = 38;

/// Cardinality of a relation table back to its base table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// One plain column of the base table.
#[derive(Clone, Debug)]
pub struct LocalColumn {
    pub name: String,
    pub primitive: PrimitiveType,
}

#[derive(Clone, Debug)]
pub struct BaseTableDef {
    pub table_name: String,
    pub locals: Vec<LocalColumn>,
}

/// One satellite table holding the values of a single relational attribute.
/// Rows are owned by the base record they point back to.
#[derive(Clone, Debug)]
pub struct RelationDef {
    /// Attribute name on the wire resource, e.g. "author".
    pub attribute: String,
    /// Physical table name: `<resource>-<attribute>`.
    pub table_name: String,
    /// Synthetic FK column joining back to the base table's id.
    pub fk_column: String,
    pub cardinality: Cardinality,
}

#[derive(Clone, Debug)]
pub struct CompiledSchema {
    pub resource: String,
    pub base: BaseTableDef,
    pub relations: Vec<RelationDef>,
}

/// Strip a trailing "s" to derive the FK column stem ("articles" -> "article").
fn singularize(resource: &str) -> &str {
    resource.strip_suffix('s').unwrap_or(resource)
}

/// FK column name on a relation table: `<singularized resource>Id`.
pub fn fk_column_name(resource: &str) -> String {
    format!("{}Id", singularize(resource))
}

/// Partition attributes into local columns and relation tables. Runs once at
/// store initialisation; a malformed schema is a programming error upstream,
/// so nothing here is fallible.
pub fn compile(schema: &ResourceSchema) -> CompiledSchema {
    let mut locals = Vec::new();
    let mut relations = Vec::new();
    let fk = fk_column_name(&schema.resource);

    for attr in &schema.attributes {
        match attr.kind {
            AttributeKind::Local(primitive) => locals.push(LocalColumn {
                name: attr.name.clone(),
                primitive,
            }),
            AttributeKind::ToOne | AttributeKind::ToMany => relations.push(RelationDef {
                attribute: attr.name.clone(),
                table_name: format!("{}-{}", schema.resource, attr.name),
                fk_column: fk.clone(),
                cardinality: if attr.kind == AttributeKind::ToOne {
                    Cardinality::One
                } else {
                    Cardinality::Many
                },
            }),
        }
    }

    CompiledSchema {
        resource: schema.resource.clone(),
        base: BaseTableDef {
            table_name: schema.resource.clone(),
            locals,
        },
        relations,
    }
}

impl CompiledSchema {
    pub fn relation(&self, attribute: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.attribute == attribute)
    }

    pub fn is_relation_attribute(&self, attribute: &str) -> bool {
        self.relation(attribute).is_some()
    }

    pub fn local(&self, name: &str) -> Option<&LocalColumn> {
        self.base.locals.iter().find(|c| c.name == name)
    }

    /// DDL for the base table, the relation tables (with cascading FK back to
    /// the base), and an index on each relation table's `id` column.
    /// Statement order matters: the base table must exist before the FKs.
    pub fn ddl(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(1 + self.relations.len() * 2);

        let mut cols = vec![
            format!("{} VARCHAR({}) PRIMARY KEY", quoted("id"), ID_MAX_LEN),
            format!("{} VARCHAR(255)", quoted("type")),
            format!("{} TEXT", quoted("meta")),
        ];
        for c in &self.base.locals {
            cols.push(format!("{} {} NULL", quoted(&c.name), storage_type(c.primitive)));
        }
        out.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quoted(&self.base.table_name),
            cols.join(",\n  ")
        ));

        for rel in &self.relations {
            let table = quoted(&rel.table_name);
            out.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} BIGSERIAL PRIMARY KEY,\n  {} VARCHAR({}),\n  {} VARCHAR(255),\n  {} TEXT,\n  {} VARCHAR({}) REFERENCES {} ({}) ON DELETE CASCADE\n)",
                table,
                quoted("uid"),
                quoted("id"),
                ID_MAX_LEN,
                quoted("type"),
                quoted("meta"),
                quoted(&rel.fk_column),
                ID_MAX_LEN,
                quoted(&self.base.table_name),
                quoted("id")
            ));
            // Supports relation-scoped filtering (join constrained on related id).
            out.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quoted(&format!("{}-id-idx", rel.table_name)),
                table,
                quoted("id")
            ));
        }

        out
    }
}

fn storage_type(primitive: PrimitiveType) -> &'static str {
    match primitive {
        PrimitiveType::String => "TEXT",
        PrimitiveType::Number => "INTEGER",
        PrimitiveType::Date => "TEXT",
    }
}
