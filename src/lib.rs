//! Relational resource-persistence adapter: derives a multi-table storage
//! layout from a typed resource schema, keeps base and relation rows
//! consistent through transactional CRUD, and translates between the flat
//! wire resource shape and the normalized storage shape.

pub mod driver;
pub mod error;
pub mod meta;
pub mod normalize;
pub mod relations;
pub mod schema;
pub mod sql;
pub mod store;

pub use driver::{Driver, Isolation, PgDriver, Transaction};
pub use error::{StoreError, StructuredError};
pub use schema::{AttributeKind, CompiledSchema, PrimitiveType, ResourceSchema};
pub use store::SqlStore;
