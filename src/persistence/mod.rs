//! Persistence engine and its specializations
//!
//! - [`SqlitePersistence`]: filter-based reads, plain inserts, schema bootstrap
//! - [`IdentifiableSqlitePersistence`]: id-addressed CRUD, upsert, partial update
//! - [`IdentifiableJsonSqlitePersistence`]: whole records in a JSON `data` column

mod convert;
mod identifiable;
mod json;
mod schema;
pub mod sql;
mod sqlite;
pub mod value;

/// Column name to value map, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use convert::{DATA_COLUMN, JsonColumnConverter, RecordConverter, SerdeConverter};
pub use identifiable::IdentifiableSqlitePersistence;
pub use json::IdentifiableJsonSqlitePersistence;
pub use schema::SchemaBuilder;
pub use sqlite::{ConnectionMode, SchemaHook, SqlitePersistence};
