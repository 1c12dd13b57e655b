//! Generic SQLite persistence engine

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::convert::{RecordConverter, SerdeConverter};
use super::schema::SchemaBuilder;
use super::sql::{
    generate_columns, generate_parameters, generate_values, non_blank, push_where, quote_identifier,
};
use super::value::row_to_map;
use crate::config::{DEFAULT_MAX_PAGE_SIZE, PersistenceConfig};
use crate::connect::{SqliteClient, SqliteConnection};
use crate::data::{DataPage, ID_COLUMN, PagingParams};
use crate::refs::References;
use crate::{Error, ErrorCode, Result};

/// Builds the schema statements for a persistence, run on every open
pub type SchemaHook = Box<dyn Fn(&mut SchemaBuilder) + Send + Sync>;

/// Who opens and closes the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Created by the persistence from its own config
    Owned,
    /// Injected through [`References`], lifecycle managed elsewhere
    Borrowed,
}

/// Process-wide generator for random sampling, seeded once
fn random_source() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

/// Maps records of type `T` onto one SQLite table.
///
/// Filters, sorts and projections are raw SQL fragments rendered by the
/// caller. Record shape is handled by the plugged [`RecordConverter`].
pub struct SqlitePersistence<T> {
    table_name: String,
    max_page_size: i64,
    config: Option<PersistenceConfig>,
    references: References,
    connection: Option<Arc<SqliteConnection>>,
    mode: ConnectionMode,
    client: Option<SqliteClient>,
    database_name: String,
    schema: SchemaBuilder,
    define_schema: Option<SchemaHook>,
    converter: Box<dyn RecordConverter<T>>,
}

impl<T> SqlitePersistence<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Persistence mapping serde fields onto columns
    pub fn new(table_name: impl Into<String>) -> Self {
        Self::with_converter(table_name, SerdeConverter::new())
    }
}

impl<T> SqlitePersistence<T> {
    pub fn with_converter(
        table_name: impl Into<String>,
        converter: impl RecordConverter<T> + 'static,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            schema: SchemaBuilder::new(table_name.clone()),
            table_name,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            config: None,
            references: References::default(),
            connection: None,
            mode: ConnectionMode::Owned,
            client: None,
            database_name: String::new(),
            define_schema: None,
            converter: Box::new(converter),
        }
    }

    /// Install the schema hook. It starts from an empty statement list on each open.
    pub fn with_schema(mut self, hook: impl Fn(&mut SchemaBuilder) + Send + Sync + 'static) -> Self {
        self.define_schema = Some(Box::new(hook));
        self
    }

    pub fn configure(&mut self, config: &PersistenceConfig) {
        if let Some(table) = config.table_name() {
            self.table_name = table.to_string();
            self.schema.set_table_name(table);
        }
        self.max_page_size = config.options.max_page_size.unwrap_or(self.max_page_size);
        self.config = Some(config.clone());
    }

    /// Use a referenced connection when there is one, otherwise build a local one
    pub fn set_references(&mut self, references: &References) {
        self.references = references.clone();
        match references.connection() {
            Some(connection) => {
                self.connection = Some(Arc::clone(connection));
                self.mode = ConnectionMode::Borrowed;
            }
            None => {
                self.connection = self.create_connection();
                self.mode = ConnectionMode::Owned;
            }
        }
    }

    pub fn unset_references(&mut self) {
        self.references = References::default();
        self.connection = None;
    }

    fn create_connection(&self) -> Option<Arc<SqliteConnection>> {
        let config = self.config.as_ref()?;
        let mut connection = SqliteConnection::new();
        connection.configure(config);
        connection.set_references(&self.references);
        Some(Arc::new(connection))
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn max_page_size(&self) -> i64 {
        self.max_page_size
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn converter(&self) -> &dyn RecordConverter<T> {
        self.converter.as_ref()
    }

    pub fn open(&mut self, trace_id: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        if self.connection.is_none() {
            self.connection = self.create_connection();
            self.mode = ConnectionMode::Owned;
        }
        let Some(connection) = self.connection.clone() else {
            return Err(Error::invalid_state(
                trace_id,
                ErrorCode::NoConnection,
                "SQLite connection is missing",
            ));
        };

        if self.mode == ConnectionMode::Owned {
            connection.open(trace_id)?;
        }

        let Some(client) = connection.get_connection() else {
            return Err(Error::connection(
                trace_id,
                ErrorCode::ConnectFailed,
                "SQLite connection is not opened",
            ));
        };
        self.database_name = connection.get_database_name();

        if let Some(hook) = &self.define_schema {
            self.schema.clear();
            hook(&mut self.schema);
        }

        self.client = Some(client);
        if let Err(err) = self.create_schema(trace_id) {
            self.client = None;
            return Err(Error::connection(
                trace_id,
                ErrorCode::ConnectFailed,
                "Connection to sqlite failed",
            )
            .with_cause(err));
        }

        tracing::debug!(
            trace_id,
            database = %self.database_name,
            table = %quote_identifier(&self.table_name),
            "Connected to SQLite database"
        );
        Ok(())
    }

    pub fn close(&mut self, trace_id: &str) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let result = match (&self.connection, self.mode) {
            (Some(connection), ConnectionMode::Owned) => connection.close(trace_id),
            _ => Ok(()),
        };
        self.client = None;
        result
    }

    /// Delete every row of the table
    pub fn clear(&self, trace_id: &str) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(Error::invalid_state(
                trace_id,
                ErrorCode::NoTable,
                "Table name is not defined",
            ));
        }
        let query = format!("DELETE FROM {}", quote_identifier(&self.table_name));
        self.execute(trace_id, &query, &[])?;
        Ok(())
    }

    /// Run the schema statements if the table does not exist yet
    pub fn create_schema(&self, trace_id: &str) -> Result<()> {
        if self.schema.is_empty() {
            return Ok(());
        }

        let client = self.client(trace_id)?;
        let probe = format!("SELECT * FROM {} LIMIT 1", quote_identifier(&self.table_name));
        let missing = client.with(|conn| match conn.prepare(&probe) {
            Ok(_) => Ok(false),
            Err(err) => Ok(err.to_string().contains("no such table")),
        })?;
        if !missing {
            return Ok(());
        }

        tracing::debug!(trace_id, table = %self.table_name, "Table does not exist, creating database objects");
        client.with(|conn| {
            for statement in self.schema.statements() {
                conn.execute_batch(&statement).inspect_err(|err| {
                    tracing::error!(trace_id, error = %err, statement = %statement, "Failed to create database object");
                })?;
            }
            Ok(())
        })
    }

    pub fn ensure_schema(&mut self, statement: impl Into<String>) {
        self.schema.ensure_schema(statement);
    }

    pub fn ensure_index(&mut self, name: &str, keys: &[(&str, bool)], unique: bool) {
        self.schema.ensure_index(name, keys, unique);
    }

    pub fn clear_schema(&mut self) {
        self.schema.clear();
    }

    pub fn schema_mut(&mut self) -> &mut SchemaBuilder {
        &mut self.schema
    }

    /// Client of the open database
    pub fn client(&self, trace_id: &str) -> Result<&SqliteClient> {
        self.client.as_ref().ok_or_else(|| {
            Error::invalid_state(trace_id, ErrorCode::NotOpened, "Persistence is not opened")
        })
    }

    /// Run a query and convert every returned row
    pub fn query_items(&self, trace_id: &str, query: &str, params: &[SqlValue]) -> Result<Vec<T>> {
        let rows = self.client(trace_id)?.with(|conn| {
            let mut stmt = conn.prepare(query)?;
            let rows = stmt
                .query_map(params_from_iter(params), row_to_map)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|row| self.converter.from_row(row))
            .collect()
    }

    /// First row of a query, if any
    pub fn query_one(&self, trace_id: &str, query: &str, params: &[SqlValue]) -> Result<Option<T>> {
        let row = self.client(trace_id)?.with(|conn| {
            let mut stmt = conn.prepare(query)?;
            Ok(stmt.query_row(params_from_iter(params), row_to_map).optional()?)
        })?;

        row.map(|row| self.converter.from_row(row)).transpose()
    }

    /// Single integer result, e.g. `SELECT COUNT(*)`
    pub fn query_count(&self, trace_id: &str, query: &str, params: &[SqlValue]) -> Result<i64> {
        self.client(trace_id)?.with(|conn| {
            let count = conn
                .query_row(query, params_from_iter(params), |row| row.get::<_, Option<i64>>(0))
                .optional()?;
            Ok(count.flatten().unwrap_or(0))
        })
    }

    /// Run a statement, returning the number of affected rows
    pub fn execute(&self, trace_id: &str, statement: &str, params: &[SqlValue]) -> Result<usize> {
        self.client(trace_id)?
            .with(|conn| Ok(conn.execute(statement, params_from_iter(params))?))
    }

    /// Page of records matching a filter.
    ///
    /// `take` defaults to the max page size; a missing `skip` leaves out OFFSET.
    pub fn get_page_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        paging: Option<PagingParams>,
        sort: Option<&str>,
        select: Option<&str>,
    ) -> Result<DataPage<T>> {
        let paging = paging.unwrap_or_default();
        let skip = paging.get_skip(-1);
        let take = paging.get_take(self.max_page_size);

        let mut query = format!(
            "SELECT {} FROM {}",
            non_blank(select).unwrap_or("*"),
            quote_identifier(&self.table_name)
        );
        push_where(&mut query, filter);
        if let Some(sort) = non_blank(sort) {
            query.push_str(" ORDER BY ");
            query.push_str(sort);
        }
        query.push_str(&format!(" LIMIT {}", take));
        if skip >= 0 {
            query.push_str(&format!(" OFFSET {}", skip));
        }

        let items = self.query_items(trace_id, &query, &[])?;
        tracing::trace!(trace_id, count = items.len(), table = %self.table_name, "Retrieved page");

        if !paging.total {
            return Ok(DataPage::new(None, items));
        }

        // Kept as deployed: the count's WHERE clause comes from the projection
        // fragment, and only when a filter was given.
        let mut count_query = format!("SELECT COUNT(*) AS count FROM {}", quote_identifier(&self.table_name));
        if non_blank(filter).is_some() {
            push_where(&mut count_query, select);
        }
        let total = self.query_count(trace_id, &count_query, &[])?;
        Ok(DataPage::new(Some(total), items))
    }

    pub fn get_count_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<i64> {
        let mut query = format!("SELECT COUNT(*) AS count FROM {}", quote_identifier(&self.table_name));
        push_where(&mut query, filter);

        let count = self.query_count(trace_id, &query, &[])?;
        tracing::trace!(trace_id, count, table = %self.table_name, "Counted items");
        Ok(count)
    }

    /// Every record matching a filter, unpaged
    pub fn get_list_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        select: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut query = format!(
            "SELECT {} FROM {}",
            non_blank(select).unwrap_or("*"),
            quote_identifier(&self.table_name)
        );
        push_where(&mut query, filter);
        if let Some(sort) = non_blank(sort) {
            query.push_str(" ORDER BY ");
            query.push_str(sort);
        }

        let items = self.query_items(trace_id, &query, &[])?;
        tracing::trace!(trace_id, count = items.len(), table = %self.table_name, "Retrieved list");
        Ok(items)
    }

    /// One uniformly chosen record matching a filter
    pub fn get_one_random(&self, trace_id: &str, filter: Option<&str>) -> Result<Option<T>> {
        let count = self.get_count_by_filter(trace_id, filter)?;
        if count <= 0 {
            tracing::trace!(trace_id, table = %self.table_name, "Nothing to pick a random item from");
            return Ok(None);
        }

        let pos = random_source()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..count);

        let mut query = format!("SELECT * FROM {}", quote_identifier(&self.table_name));
        push_where(&mut query, filter);
        query.push_str(&format!(" LIMIT 1 OFFSET {}", pos));

        let item = self.query_one(trace_id, &query, &[])?;
        tracing::trace!(trace_id, found = item.is_some(), table = %self.table_name, "Retrieved random item");
        Ok(item)
    }

    /// Insert a record as is. Returns a copy of the input.
    pub fn create(&self, trace_id: &str, item: &T) -> Result<T>
    where
        T: Clone,
    {
        let row = self.converter.to_row(item)?;
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let query = format!(
            "INSERT INTO {} ({}) VALUES({})",
            quote_identifier(&self.table_name),
            generate_columns(&row),
            generate_parameters(columns.len())
        );
        let values = generate_values(&columns, &row);

        self.execute(trace_id, &query, &values)?;
        tracing::trace!(
            trace_id,
            id = row.get(ID_COLUMN).and_then(|id| id.as_str()).unwrap_or_default(),
            table = %self.table_name,
            "Created item"
        );
        Ok(item.clone())
    }

    /// Delete records matching a filter
    pub fn delete_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<()> {
        let mut query = format!("DELETE FROM {}", quote_identifier(&self.table_name));
        push_where(&mut query, filter);

        let deleted = self.execute(trace_id, &query, &[])?;
        tracing::trace!(trace_id, deleted, table = %self.table_name, "Deleted items");
        Ok(())
    }
}

impl<T> std::fmt::Debug for SqlitePersistence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePersistence")
            .field("table_name", &self.table_name)
            .field("max_page_size", &self.max_page_size)
            .field("mode", &self.mode)
            .field("opened", &self.is_open())
            .field("database_name", &self.database_name)
            .finish()
    }
}
