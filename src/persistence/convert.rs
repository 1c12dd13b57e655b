//! Record <-> row conversion strategies

use std::marker::PhantomData;

use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Row;
use super::sql::quote_identifier;
use super::value;
use crate::data::ID_COLUMN;
use crate::{Error, Result};

/// Conversion strategy plugged into a persistence.
///
/// `to_row` feeds INSERT/UPDATE statements, `from_row` reads SELECT results.
/// Partial updates first ask `partial_update` for a whole statement and fall
/// back to a column SET built from `partial_to_row`.
pub trait RecordConverter<T>: Send + Sync {
    fn to_row(&self, item: &T) -> Result<Row>;

    fn from_row(&self, row: Row) -> Result<T>;

    fn partial_to_row(&self, patch: &Row) -> Result<Row> {
        Ok(patch.clone())
    }

    /// UPDATE statement and parameters applying `patch` to the record `id`
    fn partial_update(&self, _table: &str, _id: &str, _patch: &Row) -> Result<Option<(String, Vec<SqlValue>)>> {
        Ok(None)
    }
}

/// Maps serde fields one-to-one onto columns.
///
/// Works for any `Serialize + DeserializeOwned` record, `serde_json::Map`
/// included, which gives key-value persistences for free.
pub struct SerdeConverter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeConverter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordConverter<T> for SerdeConverter<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_row(&self, item: &T) -> Result<Row> {
        match serde_json::to_value(item)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Conversion(format!(
                "record must serialize to an object, got {}",
                kind_of(&other)
            ))),
        }
    }

    fn from_row(&self, row: Row) -> Result<T> {
        Ok(value::from_row(row)?)
    }
}

/// Stores the whole record as JSON text in a `data` column next to `id`
pub struct JsonColumnConverter<T> {
    _marker: PhantomData<fn() -> T>,
}

pub const DATA_COLUMN: &str = "data";

impl<T> JsonColumnConverter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonColumnConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordConverter<T> for JsonColumnConverter<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_row(&self, item: &T) -> Result<Row> {
        let value = serde_json::to_value(item)?;
        let id = value.get(ID_COLUMN).cloned().unwrap_or(Value::Null);

        let mut row = Row::new();
        row.insert(ID_COLUMN.to_string(), id);
        row.insert(DATA_COLUMN.to_string(), Value::String(value.to_string()));
        Ok(row)
    }

    fn from_row(&self, mut row: Row) -> Result<T> {
        match row.remove(DATA_COLUMN) {
            Some(Value::String(text)) => Ok(serde_json::from_str(&text)?),
            Some(Value::Null) | None => Ok(value::from_row(row)?),
            // Already decoded, e.g. selected through json()
            Some(other) => Ok(serde_json::from_value(other)?),
        }
    }

    /// Merges the patch into the stored document with `JSON_PATCH`
    fn partial_update(&self, table: &str, id: &str, patch: &Row) -> Result<Option<(String, Vec<SqlValue>)>> {
        let statement = format!(
            "UPDATE {} SET {}=JSON_PATCH({}, ?1) WHERE {}=?2",
            quote_identifier(table),
            quote_identifier(DATA_COLUMN),
            quote_identifier(DATA_COLUMN),
            quote_identifier(ID_COLUMN)
        );
        let values = vec![
            SqlValue::Text(serde_json::to_string(patch)?),
            SqlValue::Text(id.to_string()),
        ];
        Ok(Some((statement, values)))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
