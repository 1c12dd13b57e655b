//! Explicit reference wiring
//!
//! Components receive their optional collaborators through a [`References`]
//! value instead of a locator: a shared connection, discovery services that
//! turn a `discovery_key` into connection entries, and credential stores.

use std::sync::Arc;

use crate::Result;
use crate::config::{ConnectionParams, CredentialParams};
use crate::connect::SqliteConnection;

/// Resolves connection entries registered under a discovery key
pub trait Discovery: Send + Sync {
    fn resolve_all(&self, trace_id: &str, key: &str) -> Result<Vec<ConnectionParams>>;
}

/// Looks up credentials registered under a store key
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, trace_id: &str, key: &str) -> Result<Option<CredentialParams>>;
}

/// Collaborators handed to connections and persistences
#[derive(Clone, Default)]
pub struct References {
    connection: Option<Arc<SqliteConnection>>,
    discovery: Vec<Arc<dyn Discovery>>,
    credential_stores: Vec<Arc<dyn CredentialStore>>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing connection. Whoever built it opens and closes it.
    pub fn with_connection(mut self, connection: Arc<SqliteConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery.push(discovery);
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_stores.push(store);
        self
    }

    pub fn connection(&self) -> Option<&Arc<SqliteConnection>> {
        self.connection.as_ref()
    }

    pub fn discovery(&self) -> &[Arc<dyn Discovery>] {
        &self.discovery
    }

    pub fn credential_stores(&self) -> &[Arc<dyn CredentialStore>] {
        &self.credential_stores
    }
}

impl std::fmt::Debug for References {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("References")
            .field("connection", &self.connection.is_some())
            .field("discovery", &self.discovery.len())
            .field("credential_stores", &self.credential_stores.len())
            .finish()
    }
}
