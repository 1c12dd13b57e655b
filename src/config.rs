use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Default page size when paging does not say otherwise
pub const DEFAULT_MAX_PAGE_SIZE: i64 = 100;

/// Full configuration surface consumed by connections and persistences.
///
/// ```toml
/// table = "dummies"
///
/// [connection]
/// database = "./data/test.db"
///
/// [options]
/// max_page_size = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Table name (legacy key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Table name, wins over `collection`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionParams>,
    /// Cluster-style list; used instead of `connection` when non-empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialParams>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialParams>,
    pub options: OptionsConfig,
}

/// One connection entry
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionParams {
    /// Key to look the connection up in a discovery service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_key: Option<String>,
    /// Path to the database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// `file://` URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// One credential entry. Looked up but never validated.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OptionsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_page_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
    /// Anything else under `[options]`, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConnectionParams {
    pub fn from_database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn from_discovery_key(key: impl Into<String>) -> Self {
        Self {
            discovery_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// True when the entry must be resolved through discovery
    pub fn use_discovery(&self) -> bool {
        let has_key = self.discovery_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_target = self.database.as_deref().is_some_and(|d| !d.is_empty())
            || self.uri.as_deref().is_some_and(|u| !u.is_empty());
        has_key && !has_target
    }
}

impl PersistenceConfig {
    /// Config with a single `connection.database` entry
    pub fn from_database(database: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionParams::from_database(database)),
            ..Self::default()
        }
    }

    /// Config with a single `connection.uri` entry
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionParams::from_uri(uri)),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: i64) -> Self {
        self.options.max_page_size = Some(max_page_size);
        self
    }

    /// Connection entries in effect: `connections` if any, else `connection`
    pub fn connection_params(&self) -> Vec<ConnectionParams> {
        if !self.connections.is_empty() {
            return self.connections.clone();
        }
        self.connection.iter().cloned().collect()
    }

    /// Credential entries in effect: `credentials` if any, else `credential`
    pub fn credential_params(&self) -> Vec<CredentialParams> {
        if !self.credentials.is_empty() {
            return self.credentials.clone();
        }
        self.credential.iter().cloned().collect()
    }

    /// Table name after applying `table` over `collection`
    pub fn table_name(&self) -> Option<&str> {
        self.table
            .as_deref()
            .or(self.collection.as_deref())
            .filter(|name| !name.is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("litepersist.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".litepersist").join("litepersist.db")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<PersistenceConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config = PersistenceConfig::from_toml_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &PersistenceConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("config already exists at {} (use --force to overwrite)", path.display()),
        )
        .into());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
