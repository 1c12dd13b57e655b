use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::resolver::SqliteConnectionResolver;
use crate::config::{OptionsConfig, PersistenceConfig};
use crate::refs::References;
use crate::{Error, ErrorCode, Result};

/// Shared handle to an open SQLite database.
///
/// Clones point at the same connection. Once the owning [`SqliteConnection`]
/// closes, every clone fails with `NOT_OPENED`.
#[derive(Clone)]
pub struct SqliteClient {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl SqliteClient {
    fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Run `f` against the connection
    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::invalid_state(
                "",
                ErrorCode::NotOpened,
                "SQLite connection is closed",
            )),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn close(&self) -> Result<()> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(conn) => conn.close().map_err(|(_, e)| Error::Storage(e)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SqliteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteClient")
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct OpenHandle {
    client: SqliteClient,
    database_name: String,
}

/// Owns one SQLite handle, opened from resolved config
#[derive(Default)]
pub struct SqliteConnection {
    resolver: SqliteConnectionResolver,
    options: OptionsConfig,
    state: Mutex<Option<OpenHandle>>,
}

impl SqliteConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: &PersistenceConfig) {
        self.resolver.configure(config);
        self.options = config.options.clone();
    }

    pub fn set_references(&mut self, references: &References) {
        self.resolver.set_references(references);
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Resolve config and open the database. No-op when already open.
    pub fn open(&self, trace_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return Ok(());
        }

        let config = self.resolver.resolve(trace_id).inspect_err(|err| {
            tracing::error!(trace_id, error = %err, "Failed to resolve SQLite connection");
        })?;

        if config.database.is_empty() {
            return Err(Error::connection(
                trace_id,
                ErrorCode::ConnectFailed,
                "Connection to sqlite failed: database is not set",
            ));
        }

        let conn = open_database(&config.database, &self.options).map_err(|err| {
            tracing::error!(trace_id, database = %config.database, error = %err, "Failed to open SQLite database");
            Error::connection(trace_id, ErrorCode::ConnectFailed, "Connection to sqlite failed")
                .with_cause(err)
        })?;

        tracing::debug!(trace_id, database = %config.database, "Connected to SQLite database");
        *state = Some(OpenHandle {
            client: SqliteClient::new(conn),
            database_name: config.database,
        });
        Ok(())
    }

    /// Release the handle. Safe to call repeatedly.
    pub fn close(&self, trace_id: &str) -> Result<()> {
        let taken = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = taken else {
            return Ok(());
        };

        handle.client.close().map_err(|err| {
            tracing::error!(trace_id, database = %handle.database_name, error = %err, "Failed to close SQLite database");
            Error::connection(
                trace_id,
                ErrorCode::ConnectFailed,
                "Failed to close SQLite connection",
            )
            .with_cause(err)
        })?;
        tracing::debug!(trace_id, database = %handle.database_name, "Disconnected from SQLite database");
        Ok(())
    }

    /// Handle to the open database, or None when closed
    pub fn get_connection(&self) -> Option<SqliteClient> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| handle.client.clone())
    }

    /// Resolved database path, empty when closed
    pub fn get_database_name(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| handle.database_name.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.is_open())
            .field("database", &self.get_database_name())
            .finish()
    }
}

/// Paths carrying `?options` are opened as SQLite URI filenames
fn open_database(database: &str, options: &OptionsConfig) -> Result<Connection> {
    let conn = if database.contains('?') {
        Connection::open_with_flags(
            format!("file:{}", database),
            OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI,
        )?
    } else {
        Connection::open(database)?
    };

    if let Some(ms) = options.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(ms))?;
    }
    Ok(conn)
}
