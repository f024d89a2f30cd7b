//! Relation store: one handle per relational attribute, resolved once at
//! initialisation. All mutations go through the owning transaction; relation
//! rows have no CRUD surface of their own.

use crate::driver::Transaction;
use crate::error::StoreError;
use crate::schema::{Cardinality, CompiledSchema, RelationDef};
use crate::sql;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// First-class add/set/clear operations for a single relational attribute.
#[derive(Clone, Debug)]
pub struct RelationHandle {
    def: RelationDef,
}

impl RelationHandle {
    pub fn attribute(&self) -> &str {
        &self.def.attribute
    }

    pub fn cardinality(&self) -> Cardinality {
        self.def.cardinality
    }

    /// Attach one more relation row to the base record. Never destroys
    /// existing rows; to-many only.
    pub async fn add(
        &self,
        tx: &dyn Transaction,
        base_id: &str,
        value: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let q = sql::insert_relation(&self.def, base_id, value);
        tx.execute(&q.sql, &q.params).await?;
        Ok(())
    }

    /// Replace the to-one value: destroy whatever row exists, then insert the
    /// new one. `None` leaves zero rows.
    pub async fn set(
        &self,
        tx: &dyn Transaction,
        base_id: &str,
        value: Option<&Map<String, Value>>,
    ) -> Result<(), StoreError> {
        self.clear(tx, base_id).await?;
        if let Some(v) = value {
            self.add(tx, base_id, v).await?;
        }
        Ok(())
    }

    /// Destroy every relation row owned by the base record.
    pub async fn clear(&self, tx: &dyn Transaction, base_id: &str) -> Result<(), StoreError> {
        let q = sql::clear_relation(&self.def, base_id);
        tx.execute(&q.sql, &q.params).await?;
        Ok(())
    }
}

/// Resolve one handle per relational attribute from the compiled schema.
pub fn resolve(schema: &CompiledSchema) -> HashMap<String, RelationHandle> {
    schema
        .relations
        .iter()
        .map(|def| {
            (
                def.attribute.clone(),
                RelationHandle { def: def.clone() },
            )
        })
        .collect()
}
