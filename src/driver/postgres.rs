//! PostgreSQL driver on sqlx: JSON values in, JSON rows out.

use crate::driver::{Driver, Isolation, Transaction};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgRow, PgTypeInfo, Postgres};
use sqlx::{Database, PgPool};
use tokio::sync::Mutex;

pub struct PgDriver {
    pool: PgPool,
}

impl PgDriver {
    pub fn new(pool: PgPool) -> Self {
        PgDriver { pool }
    }

    /// Connect from an opaque database URL (the only configuration this
    /// layer takes).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        Ok(PgDriver { pool })
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn Transaction>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if isolation == Isolation::ReadUncommitted {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED")
                .execute(&mut *tx)
                .await?;
        }
        Ok(Box::new(PgTransaction {
            inner: Mutex::new(tx),
        }))
    }
}

/// One sqlx transaction behind an async mutex: relation fan-out starts its
/// statements concurrently, but a single connection can only run one at a
/// time, so they serialize here.
pub struct PgTransaction {
    inner: Mutex<sqlx::Transaction<'static, Postgres>>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        tracing::debug!(sql = %sql, params = ?params, "execute (tx)");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let mut tx = self.inner.lock().await;
        let result = query.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %sql, params = ?params, "query (tx)");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let mut tx = self.inner.lock().await;
        let rows = query.fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.into_inner().rollback().await?;
        Ok(())
    }
}

/// A JSON value in a shape sqlx can bind to a PostgreSQL placeholder.
#[derive(Clone, Debug)]
enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
}

impl PgBindValue {
    fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decode one cell by trying concrete types in order; JSON columns (the
/// joined relation subqueries) land on the serde_json fallback.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
