//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ColumnMapping;

/// Default `copy.batch_flush_bytes`.
pub const DEFAULT_FLUSH_BYTES: usize = 1024 * 1024;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination PostgreSQL database.
    pub target: TargetConfig,

    /// Query source. Connection fields that are not set fall back to `target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConfig>,

    /// Copy behavior.
    pub copy: CopyConfig,
}

impl Config {
    /// Connection settings of the source, filled in from the target.
    pub fn source_connection(&self) -> TargetConfig {
        match &self.source {
            Some(source) => source.connection(&self.target),
            None => self.target.clone(),
        }
    }

    /// Source query, if one is configured.
    pub fn source_query(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.query.as_str())
    }
}

/// PostgreSQL connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Source query configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,

    /// Query whose result set is copied.
    #[serde(default)]
    pub query: String,
}

impl SourceConfig {
    /// Resolve connection settings, taking unset fields from `target`.
    pub fn connection(&self, target: &TargetConfig) -> TargetConfig {
        TargetConfig {
            host: self.host.clone().unwrap_or_else(|| target.host.clone()),
            port: self.port.unwrap_or(target.port),
            database: self
                .database
                .clone()
                .unwrap_or_else(|| target.database.clone()),
            user: self.user.clone().unwrap_or_else(|| target.user.clone()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| target.password.clone()),
            ssl_mode: self
                .ssl_mode
                .clone()
                .unwrap_or_else(|| target.ssl_mode.clone()),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("ssl_mode", &self.ssl_mode)
            .field("query", &self.query)
            .finish()
    }
}

/// Copy behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Destination table, optionally schema-qualified.
    pub destination_table: String,

    /// Import timeout in seconds; 0 disables it (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Explicit source-to-destination column mappings.
    #[serde(default)]
    pub column_mappings: Vec<ColumnMapping>,

    /// Buffered COPY bytes that trigger a flush to the server (default: 1 MiB).
    #[serde(default = "default_batch_flush_bytes")]
    pub batch_flush_bytes: usize,
}

impl CopyConfig {
    pub fn new(destination_table: impl Into<String>) -> Self {
        Self {
            destination_table: destination_table.into(),
            timeout_secs: default_timeout_secs(),
            column_mappings: Vec::new(),
            batch_flush_bytes: default_batch_flush_bytes(),
        }
    }

    /// Import timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_require() -> String {
    "require".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_flush_bytes() -> usize {
    DEFAULT_FLUSH_BYTES
}
