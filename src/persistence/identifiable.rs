//! Id-addressed CRUD on top of the generic engine

use std::ops::{Deref, DerefMut};

use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::convert::RecordConverter;
use super::schema::SchemaBuilder;
use super::sql::{
    generate_columns, generate_parameters, generate_set_parameters, generate_values,
    quote_identifier,
};
use super::sqlite::SqlitePersistence;
use super::Row;
use crate::Result;
use crate::data::{ID_COLUMN, Identifiable, ensure_id};

/// Persistence for records carrying a string id in the `id` column.
///
/// Derefs to [`SqlitePersistence`] for lifecycle and filter-based reads.
pub struct IdentifiableSqlitePersistence<T> {
    inner: SqlitePersistence<T>,
}

impl<T> IdentifiableSqlitePersistence<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            inner: SqlitePersistence::new(table_name),
        }
    }
}

impl<T> IdentifiableSqlitePersistence<T>
where
    T: Identifiable + Clone,
{
    pub fn with_converter(
        table_name: impl Into<String>,
        converter: impl RecordConverter<T> + 'static,
    ) -> Self {
        Self {
            inner: SqlitePersistence::with_converter(table_name, converter),
        }
    }

    pub fn with_schema(self, hook: impl Fn(&mut SchemaBuilder) + Send + Sync + 'static) -> Self {
        Self {
            inner: self.inner.with_schema(hook),
        }
    }

    fn id_column() -> String {
        quote_identifier(ID_COLUMN)
    }

    fn select_by_id(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {}=?1",
            quote_identifier(self.table_name()),
            Self::id_column()
        )
    }

    /// Records with the given ids, in table order. Unknown ids are skipped.
    pub fn get_list_by_ids<S: AsRef<str>>(&self, trace_id: &str, ids: &[S]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT * FROM {} WHERE {} IN({})",
            quote_identifier(self.table_name()),
            Self::id_column(),
            generate_parameters(ids.len())
        );
        let params = id_values(ids);

        let items = self.query_items(trace_id, &query, &params)?;
        tracing::trace!(trace_id, count = items.len(), table = %self.table_name(), "Retrieved items by ids");
        Ok(items)
    }

    pub fn get_one_by_id(&self, trace_id: &str, id: &str) -> Result<Option<T>> {
        let item = self.query_one(trace_id, &self.select_by_id(), &[SqlValue::Text(id.to_string())])?;

        if item.is_some() {
            tracing::trace!(trace_id, id, table = %self.table_name(), "Retrieved item by id");
        } else {
            tracing::trace!(trace_id, id, table = %self.table_name(), "Nothing found by id");
        }
        Ok(item)
    }

    /// Insert, generating an id when the record has none
    pub fn create(&self, trace_id: &str, item: &T) -> Result<T> {
        let mut item = item.clone();
        ensure_id(&mut item);
        self.inner.create(trace_id, &item)
    }

    /// Insert or update by id, then read the stored record back
    pub fn set(&self, trace_id: &str, item: &T) -> Result<Option<T>> {
        let mut item = item.clone();
        let id = ensure_id(&mut item);
        let row = self.converter().to_row(&item)?;

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let (set_clause, set_columns) = generate_set_parameters(&row, columns.len() + 1);

        let mut query = format!(
            "INSERT INTO {} ({}) VALUES({})",
            quote_identifier(self.table_name()),
            generate_columns(&row),
            generate_parameters(columns.len())
        );
        if set_clause.is_empty() {
            query.push_str(&format!(" ON CONFLICT({}) DO NOTHING", Self::id_column()));
        } else {
            query.push_str(&format!(
                " ON CONFLICT({}) DO UPDATE SET {}",
                Self::id_column(),
                set_clause
            ));
        }

        let mut values = generate_values(&columns, &row);
        values.extend(generate_values(&set_columns, &row));

        self.execute(trace_id, &query, &values)?;
        tracing::trace!(trace_id, id = %id, table = %self.table_name(), "Set item");
        self.get_one_by_id(trace_id, &id)
    }

    /// Replace the stored columns of an existing record. Records without an id yield None.
    pub fn update(&self, trace_id: &str, item: &T) -> Result<Option<T>> {
        let Some(id) = item.id().map(str::to_string) else {
            return Ok(None);
        };
        let row = self.converter().to_row(item)?;
        self.update_columns(trace_id, &id, &row)?;
        tracing::trace!(trace_id, id = %id, table = %self.table_name(), "Updated item");
        self.get_one_by_id(trace_id, &id)
    }

    /// Update only the supplied fields of a record.
    ///
    /// The converter may supply its own statement, e.g. a JSON merge.
    /// Otherwise the patched fields are set column by column.
    pub fn update_partially(&self, trace_id: &str, id: &str, patch: &Row) -> Result<Option<T>> {
        match self.converter().partial_update(self.table_name(), id, patch)? {
            Some((statement, values)) => {
                self.execute(trace_id, &statement, &values)?;
            }
            None => {
                let row = self.converter().partial_to_row(patch)?;
                self.update_columns(trace_id, id, &row)?;
            }
        }
        tracing::trace!(trace_id, id, table = %self.table_name(), "Updated item partially");
        self.get_one_by_id(trace_id, id)
    }

    fn update_columns(&self, trace_id: &str, id: &str, row: &Row) -> Result<()> {
        let (set_clause, set_columns) = generate_set_parameters(row, 1);
        if set_clause.is_empty() {
            return Ok(());
        }

        let query = format!(
            "UPDATE {} SET {} WHERE {}=?{}",
            quote_identifier(self.table_name()),
            set_clause,
            Self::id_column(),
            set_columns.len() + 1
        );
        let mut values = generate_values(&set_columns, row);
        values.push(SqlValue::Text(id.to_string()));

        self.execute(trace_id, &query, &values)?;
        Ok(())
    }

    /// Delete by id, returning the record as it was
    pub fn delete_by_id(&self, trace_id: &str, id: &str) -> Result<Option<T>> {
        let Some(item) = self.get_one_by_id(trace_id, id)? else {
            return Ok(None);
        };

        let query = format!(
            "DELETE FROM {} WHERE {}=?1",
            quote_identifier(self.table_name()),
            Self::id_column()
        );
        self.execute(trace_id, &query, &[SqlValue::Text(id.to_string())])?;
        tracing::trace!(trace_id, id, table = %self.table_name(), "Deleted item");
        Ok(Some(item))
    }

    /// Delete several records at once. Returns how many were removed.
    pub fn delete_by_ids<S: AsRef<str>>(&self, trace_id: &str, ids: &[S]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "DELETE FROM {} WHERE {} IN({})",
            quote_identifier(self.table_name()),
            Self::id_column(),
            generate_parameters(ids.len())
        );
        let deleted = self.execute(trace_id, &query, &id_values(ids))?;
        tracing::trace!(trace_id, deleted, table = %self.table_name(), "Deleted items by ids");
        Ok(deleted)
    }
}

fn id_values<S: AsRef<str>>(ids: &[S]) -> Vec<SqlValue> {
    ids.iter()
        .map(|id| SqlValue::Text(id.as_ref().to_string()))
        .collect()
}

impl<T> Deref for IdentifiableSqlitePersistence<T> {
    type Target = SqlitePersistence<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for IdentifiableSqlitePersistence<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> std::fmt::Debug for IdentifiableSqlitePersistence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IdentifiableSqlitePersistence")
            .field(&self.inner)
            .finish()
    }
}
