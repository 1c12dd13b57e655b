//! # litepersist - Generic SQLite persistence
//!
//! One reusable engine that maps records onto a single SQLite table.
//!
//! litepersist provides:
//! - Connection resolution from config (`database` path or `file://` URI, optional discovery)
//! - Owned or shared connection lifecycle
//! - Idempotent schema bootstrap ("create if absent")
//! - Paged, filtered, counted and random reads over caller-rendered SQL fragments
//! - Id-addressed CRUD with upsert and partial update
//! - Three storage encodings: typed columns, key-value maps and JSON documents

pub mod config;
pub mod connect;
pub mod data;
pub mod persistence;
pub mod refs;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

// Re-exports for convenient access
pub use config::{ConnectionParams, CredentialParams, OptionsConfig, PersistenceConfig};
pub use connect::{ConnectionConfig, SqliteClient, SqliteConnection, SqliteConnectionResolver};
pub use data::{DataPage, Identifiable, PagingParams};
pub use persistence::{
    ConnectionMode, IdentifiableJsonSqlitePersistence, IdentifiableSqlitePersistence,
    JsonColumnConverter, RecordConverter, Row, SchemaBuilder, SerdeConverter, SqlitePersistence,
};
pub use refs::{CredentialStore, Discovery, References};

/// Result type alias for litepersist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error codes carried by lifecycle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No connection entry configured, or no connection component available
    NoConnection,
    /// A connection entry has neither a usable `uri` nor a `database`
    NoDatabase,
    /// A connection URI does not use the `file://` scheme
    WrongProtocol,
    /// A discovery key or credential store key could not be resolved
    CannotResolve,
    /// Opening the database (or its schema) failed
    ConnectFailed,
    /// Operation attempted without an open handle
    NotOpened,
    /// Table name is not defined
    NoTable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoConnection => "NO_CONNECTION",
            ErrorCode::NoDatabase => "NO_DATABASE",
            ErrorCode::WrongProtocol => "WRONG_PROTOCOL",
            ErrorCode::CannotResolve => "CANNOT_RESOLVE",
            ErrorCode::ConnectFailed => "CONNECT_FAILED",
            ErrorCode::NotOpened => "NOT_OPENED",
            ErrorCode::NoTable => "NO_TABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for litepersist operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error [{code}]: {message}")]
    Config {
        code: ErrorCode,
        message: String,
        trace_id: String,
    },

    #[error("Connection error [{code}]: {message}")]
    Connection {
        code: ErrorCode,
        message: String,
        trace_id: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("Invalid state [{code}]: {message}")]
    InvalidState {
        code: ErrorCode,
        message: String,
        trace_id: String,
    },

    /// Per-statement driver failures, surfaced verbatim
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(trace_id: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Config {
            code,
            message: message.into(),
            trace_id: trace_id.to_string(),
        }
    }

    pub fn connection(trace_id: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Connection {
            code,
            message: message.into(),
            trace_id: trace_id.to_string(),
            cause: None,
        }
    }

    pub fn invalid_state(trace_id: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Error::InvalidState {
            code,
            message: message.into(),
            trace_id: trace_id.to_string(),
        }
    }

    /// Attach an underlying cause. Only connection errors carry one; other kinds are returned unchanged.
    pub fn with_cause(self, cause: impl Into<Error>) -> Self {
        match self {
            Error::Connection {
                code,
                message,
                trace_id,
                ..
            } => Error::Connection {
                code,
                message,
                trace_id,
                cause: Some(Box::new(cause.into())),
            },
            other => other,
        }
    }

    /// Error code for config, connection and invalid-state errors
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Config { code, .. }
            | Error::Connection { code, .. }
            | Error::InvalidState { code, .. } => Some(*code),
            _ => None,
        }
    }
}
