//! SQLite connection resolution
//!
//! Turns configured connection entries into one database path:
//! - `database = "path"` is used as is
//! - `uri = "file://path"` has its scheme stripped
//! - entries with only a `discovery_key` are expanded through [`Discovery`] services
//!
//! Several entries are accepted (cluster-style config), the last database wins.

use std::sync::Arc;

use crate::config::{ConnectionParams, CredentialParams, OptionsConfig, PersistenceConfig};
use crate::refs::{CredentialStore, Discovery, References};
use crate::{Error, ErrorCode, Result};

const FILE_SCHEME: &str = "file://";

/// Resolved connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Database path (may carry `?query` options)
    pub database: String,
    /// `[options]` passthrough
    pub options: OptionsConfig,
    /// Credential found during resolution, if any. Not validated.
    pub credential: Option<CredentialParams>,
}

/// Resolves and validates SQLite connection parameters
#[derive(Clone, Default)]
pub struct SqliteConnectionResolver {
    connections: Vec<ConnectionParams>,
    credentials: Vec<CredentialParams>,
    options: OptionsConfig,
    discovery: Vec<Arc<dyn Discovery>>,
    credential_stores: Vec<Arc<dyn CredentialStore>>,
}

impl SqliteConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: &PersistenceConfig) {
        self.connections = config.connection_params();
        self.credentials = config.credential_params();
        self.options = config.options.clone();
    }

    pub fn set_references(&mut self, references: &References) {
        self.discovery = references.discovery().to_vec();
        self.credential_stores = references.credential_stores().to_vec();
    }

    /// Resolve the connection config.
    ///
    /// Connection lookup and credential lookup run on two scoped threads and
    /// are joined before composing. Credential failures are logged, not returned.
    pub fn resolve(&self, trace_id: &str) -> Result<ConnectionConfig> {
        let (connections, credential) = crossbeam::thread::scope(|scope| {
            let connections = scope.spawn(|_| {
                let connections = self.resolve_connections(trace_id)?;
                validate_connections(trace_id, &connections)?;
                Ok::<_, Error>(connections)
            });
            let credential = scope.spawn(|_| self.lookup_credential(trace_id));

            (
                connections
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload)),
                credential
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload)),
            )
        })
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload));

        let connections = connections?;
        let credential = credential.unwrap_or_else(|err| {
            tracing::warn!(trace_id, error = %err, "Credential lookup failed, continuing without credentials");
            None
        });

        Ok(self.compose_config(&connections, credential))
    }

    /// Configured entries with discovery keys expanded
    fn resolve_connections(&self, trace_id: &str) -> Result<Vec<ConnectionParams>> {
        let mut resolved = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            if !connection.use_discovery() {
                resolved.push(connection.clone());
                continue;
            }

            let key = connection.discovery_key.as_deref().unwrap_or_default();
            if self.discovery.is_empty() {
                return Err(Error::config(
                    trace_id,
                    ErrorCode::CannotResolve,
                    format!("Discovery wasn't found to resolve connection '{}'", key),
                ));
            }
            for discovery in &self.discovery {
                resolved.extend(discovery.resolve_all(trace_id, key)?);
            }
        }
        Ok(resolved)
    }

    fn lookup_credential(&self, trace_id: &str) -> Result<Option<CredentialParams>> {
        for credential in &self.credentials {
            let Some(key) = credential.store_key.as_deref().filter(|k| !k.is_empty()) else {
                return Ok(Some(credential.clone()));
            };
            if self.credential_stores.is_empty() {
                return Err(Error::config(
                    trace_id,
                    ErrorCode::CannotResolve,
                    format!("Credential store wasn't found to resolve '{}'", key),
                ));
            }
            for store in &self.credential_stores {
                if let Some(found) = store.lookup(trace_id, key)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn compose_config(
        &self,
        connections: &[ConnectionParams],
        credential: Option<CredentialParams>,
    ) -> ConnectionConfig {
        let mut database = String::new();
        for connection in connections {
            if let Some(uri) = connection.uri.as_deref().filter(|u| !u.is_empty()) {
                database = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri).to_string();
            }
            if let Some(db) = connection.database.as_deref().filter(|d| !d.is_empty()) {
                database = db.to_string();
            }
        }

        ConnectionConfig {
            database,
            options: self.options.clone(),
            credential,
        }
    }
}

fn validate_connection(trace_id: &str, connection: &ConnectionParams) -> Result<()> {
    if let Some(uri) = connection.uri.as_deref().filter(|u| !u.is_empty()) {
        if !uri.starts_with(FILE_SCHEME) {
            return Err(Error::config(
                trace_id,
                ErrorCode::WrongProtocol,
                "Connection protocol must be file://",
            ));
        }
        return Ok(());
    }

    if connection.database.as_deref().is_none_or(str::is_empty) {
        return Err(Error::config(
            trace_id,
            ErrorCode::NoDatabase,
            "Connection database is not set",
        ));
    }
    Ok(())
}

fn validate_connections(trace_id: &str, connections: &[ConnectionParams]) -> Result<()> {
    if connections.is_empty() {
        return Err(Error::config(
            trace_id,
            ErrorCode::NoConnection,
            "Database connection is not set",
        ));
    }
    connections
        .iter()
        .try_for_each(|connection| validate_connection(trace_id, connection))
}
