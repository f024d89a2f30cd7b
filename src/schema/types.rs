//! Resource schema declarations: typed attributes and relation cardinalities.

use serde::{Deserialize, Serialize};

/// Primitive type of a local (non-relation) attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Date,
}

/// What one attribute is: a plain column, or a to-one / to-many relation
/// stored in its own satellite table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Local(PrimitiveType),
    ToOne,
    ToMany,
}

impl AttributeKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, AttributeKind::ToOne | AttributeKind::ToMany)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeKind,
}

/// Declared shape of one resource type. Immutable after the store is
/// initialised; attribute order is preserved into the column order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Resource type name, e.g. "articles". Also the base table name.
    pub resource: String,
    pub attributes: Vec<AttributeDef>,
}

impl ResourceSchema {
    pub fn new(resource: impl Into<String>) -> Self {
        ResourceSchema {
            resource: resource.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            kind,
        });
        self
    }
}
