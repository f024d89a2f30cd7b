//! SqlStore: the CRUD orchestrator and only entry point. Composes the schema
//! compiler, relation store, filter compiler, normalizer, and error
//! translation; multi-table writes run inside one transaction with relation
//! writes fanned out concurrently and joined before commit.

use crate::driver::{Driver, Isolation, Transaction};
use crate::error::{StoreError, StructuredError};
use crate::normalize::normalize;
use crate::relations::{self, RelationHandle};
use crate::schema::{compile, Cardinality, CompiledSchema, ResourceSchema};
use crate::sql;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct SqlStore {
    driver: Arc<dyn Driver>,
    schema: CompiledSchema,
    relations: HashMap<String, RelationHandle>,
    ready: AtomicBool,
}

impl SqlStore {
    /// Compile the resource schema once; `initialise` must run before any
    /// operation so the tables exist.
    pub fn new(driver: Arc<dyn Driver>, schema: &ResourceSchema) -> Self {
        let compiled = compile(schema);
        let relations = relations::resolve(&compiled);
        SqlStore {
            driver,
            schema: compiled,
            relations,
            ready: AtomicBool::new(false),
        }
    }

    /// Apply the derived DDL: base table, relation tables, relation-id
    /// indexes.
    pub async fn initialise(&self) -> Result<(), StructuredError> {
        for statement in self.schema.ddl() {
            self.driver
                .execute(&statement, &[])
                .await
                .map_err(StructuredError::from)?;
        }
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(resource = %self.schema.resource, "store initialised");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// All base records matching the filter query, each with its relations
    /// joined and normalized. Read-only, no transaction.
    pub async fn search(
        &self,
        filter: Option<&Map<String, Value>>,
        relationships: Option<&HashMap<String, String>>,
    ) -> Result<Vec<Value>, StructuredError> {
        let q = sql::select_resources(&self.schema, None, filter, relationships);
        let rows = self.driver.query(&q.sql, &q.params).await?;
        Ok(rows.into_iter().map(|r| normalize(&self.schema, r)).collect())
    }

    /// One resource by id with all relations joined.
    pub async fn find(&self, id: &str) -> Result<Value, StructuredError> {
        let q = sql::select_resources(&self.schema, Some(id), None, None);
        let mut rows = self.driver.query(&q.sql, &q.params).await?;
        match rows.pop() {
            Some(row) => Ok(normalize(&self.schema, row)),
            None => Err(StoreError::not_found(&self.schema.resource, id).into()),
        }
    }

    /// Insert the base row and every supplied relation value as one unit;
    /// returns the caller's resource unchanged on commit.
    pub async fn create(&self, resource: &Value) -> Result<Value, StructuredError> {
        let obj = require_object(resource)?;
        let id = require_id(obj)?;

        let tx = self.driver.begin(Isolation::Default).await?;
        match self.create_in_tx(tx.as_ref(), id, obj).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(resource.clone())
            }
            Err(e) => {
                tracing::warn!(resource = %self.schema.resource, id, error = %e, "create failed, rolling back");
                let _ = tx.rollback().await;
                Err(e.into())
            }
        }
    }

    async fn create_in_tx(
        &self,
        tx: &dyn Transaction,
        id: &str,
        obj: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let q = sql::insert_base(&self.schema, obj);
        tx.execute(&q.sql, &q.params).await?;

        // Fan out one task per supplied relation attribute; join before commit.
        let mut tasks = Vec::new();
        for (attr, handle) in &self.relations {
            let Some(value) = obj.get(attr) else { continue };
            tasks.push(self.write_relation_value(tx, handle, id, value));
        }
        try_join_all(tasks).await?;
        Ok(())
    }

    async fn write_relation_value(
        &self,
        tx: &dyn Transaction,
        handle: &RelationHandle,
        base_id: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        match (handle.cardinality(), value) {
            (_, Value::Null) => Ok(()),
            (Cardinality::Many, Value::Array(items)) => {
                for item in items {
                    handle.add(tx, base_id, require_object(item)?).await?;
                }
                Ok(())
            }
            (Cardinality::One, Value::Object(v)) => handle.set(tx, base_id, Some(v)).await,
            _ => Err(StoreError::Storage(format!(
                "invalid value shape for relation attribute '{}'",
                handle.attribute()
            ))),
        }
    }

    /// Merge a partial resource over the stored one. Relation attributes
    /// present as explicit keys are replaced wholesale (cleared, then
    /// re-added); local attribute changes update the base row in the same
    /// transaction. An update carrying no local changes skips the base row
    /// entirely, and a base update with nothing to set is a benign no-op.
    pub async fn update(&self, id: &str, partial: &Value) -> Result<(), StructuredError> {
        let partial = require_object(partial)?;

        // Read-uncommitted keeps the in-transaction load from contending
        // with concurrent readers of the row being updated.
        let tx = self.driver.begin(Isolation::ReadUncommitted).await?;
        match self.update_in_tx(tx.as_ref(), id, partial).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if !matches!(e, StoreError::NotFound { .. }) {
                    tracing::warn!(resource = %self.schema.resource, id, error = %e, "update failed, rolling back");
                }
                // Nothing was written on the NotFound path; rollback just
                // releases the connection.
                let _ = tx.rollback().await;
                Err(e.into())
            }
        }
    }

    async fn update_in_tx(
        &self,
        tx: &dyn Transaction,
        id: &str,
        partial: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let q = sql::select_resources(&self.schema, Some(id), None, None);
        let rows = tx.query(&q.sql, &q.params).await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(&self.schema.resource, id));
        }

        let mut local_changes: Vec<(String, Value)> = Vec::new();
        let mut relation_tasks = Vec::new();
        for (key, value) in partial {
            if let Some(handle) = self.relations.get(key) {
                relation_tasks.push(self.replace_relation_value(tx, handle, id, value));
            } else if key == "id" {
                // The identifier is immutable.
            } else if key == "type" || key == "meta" || self.schema.local(key).is_some() {
                local_changes.push((key.clone(), value.clone()));
            }
        }

        let base_update = async {
            if let Some(q) = sql::update_base(&self.schema, id, &local_changes) {
                tx.execute(&q.sql, &q.params).await?;
            }
            Ok::<(), StoreError>(())
        };
        futures::try_join!(try_join_all(relation_tasks), base_update)?;
        Ok(())
    }

    async fn replace_relation_value(
        &self,
        tx: &dyn Transaction,
        handle: &RelationHandle,
        base_id: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        match value {
            Value::Null => handle.clear(tx, base_id).await,
            Value::Array(items) => {
                handle.clear(tx, base_id).await?;
                for item in items {
                    handle.add(tx, base_id, require_object(item)?).await?;
                }
                Ok(())
            }
            Value::Object(v) => handle.set(tx, base_id, Some(v)).await,
            _ => Err(StoreError::Storage(format!(
                "invalid value shape for relation attribute '{}'",
                handle.attribute()
            ))),
        }
    }

    /// Destroy the base record; the cascade takes its relation rows with it.
    /// Check and DELETE run in one transaction so a record that vanishes
    /// between them still surfaces as NotFound.
    pub async fn delete(&self, id: &str) -> Result<(), StructuredError> {
        let tx = self.driver.begin(Isolation::Default).await?;
        match self.delete_in_tx(tx.as_ref(), id).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if !matches!(e, StoreError::NotFound { .. }) {
                    tracing::warn!(resource = %self.schema.resource, id, error = %e, "delete failed, rolling back");
                }
                let _ = tx.rollback().await;
                Err(e.into())
            }
        }
    }

    async fn delete_in_tx(&self, tx: &dyn Transaction, id: &str) -> Result<(), StoreError> {
        let q = sql::select_resources(&self.schema, Some(id), None, None);
        let rows = tx.query(&q.sql, &q.params).await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(&self.schema.resource, id));
        }
        let q = sql::delete_base(&self.schema, id);
        let affected = tx.execute(&q.sql, &q.params).await?;
        if affected == 0 {
            return Err(StoreError::not_found(&self.schema.resource, id));
        }
        Ok(())
    }
}

fn require_object(value: &Value) -> Result<&Map<String, Value>, StoreError> {
    value
        .as_object()
        .ok_or_else(|| StoreError::Storage("resource value must be a JSON object".into()))
}

fn require_id(obj: &Map<String, Value>) -> Result<&str, StoreError> {
    obj.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Storage("resource must carry a caller-supplied string id".into()))
}
