//! The storage boundary: an opaque transactional SQL executor. The
//! orchestrator only ever talks to these traits; the bundled implementation
//! runs on PostgreSQL via sqlx.

mod postgres;

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

pub use postgres::PgDriver;

/// Transaction isolation requested at begin. ReadUncommitted is used by
/// update to trade dirty reads of the row being updated for less lock
/// contention with concurrent readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Isolation {
    Default,
    ReadUncommitted,
}

/// An open transaction. Exclusively owned by the operation that began it;
/// statements issued concurrently on the same handle may interleave in any
/// order but never escape the transaction.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Connection-pool-level executor. Rows come back as JSON objects keyed by
/// column name.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError>;
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn Transaction>, StoreError>;
}
