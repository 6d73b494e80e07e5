//! Error types for the bulk copy library.

use std::time::Duration;

use thiserror::Error;

use crate::core::{HostType, WireType};

/// Main error type for bulk copy operations.
#[derive(Error, Debug)]
pub enum BulkCopyError {
    /// Configuration error (invalid YAML, missing fields, bad mappings, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A column mapping names a destination column that does not exist
    #[error("Destination column {0} is not found")]
    UnknownDestinationColumn(String),

    /// A column mapping names a source field that does not exist
    #[error("Source column {0} is not found")]
    UnknownSourceColumn(String),

    /// A column ordinal does not address a column on one side of the copy
    #[error("{side} column ordinal {ordinal} is out of range (column count {count})")]
    OrdinalOutOfRange {
        side: &'static str,
        ordinal: usize,
        count: usize,
    },

    /// No encoder exists for a destination column
    #[error("Writer is not supported. wire type={wire_type}, host type={host_type}")]
    Resolution {
        wire_type: WireType,
        host_type: HostType,
    },

    /// Destination column metadata could not be retrieved
    #[error("Failed to read metadata for table {table}: {message}")]
    Metadata { table: String, message: String },

    /// Host value conversion failed
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A value could not be encoded for its destination column
    #[error("Failed to encode column {column}: {message}")]
    Encode { column: String, message: String },

    /// Binary wire format error (encoding or decoding)
    #[error("Codec error: {0}")]
    Codec(String),

    /// Import session misuse or a malformed COPY stream
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The destination rejected a row or the import
    #[error("Destination error: {0}")]
    Destination(String),

    /// Database query or COPY error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection could not be established, with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// An import I/O operation exceeded the configured timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Copy was cancelled (SIGINT, token, etc.)
    #[error("Bulk copy cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BulkCopyError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        BulkCopyError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Metadata error
    pub fn metadata(table: impl Into<String>, message: impl Into<String>) -> Self {
        BulkCopyError::Metadata {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Encode error
    pub fn encode(column: impl Into<String>, message: impl Into<String>) -> Self {
        BulkCopyError::Encode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this error was raised before any import I/O took place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BulkCopyError::Config(_)
                | BulkCopyError::UnknownDestinationColumn(_)
                | BulkCopyError::UnknownSourceColumn(_)
                | BulkCopyError::OrdinalOutOfRange { .. }
                | BulkCopyError::Yaml(_)
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            e if e.is_configuration() => 2,
            BulkCopyError::Connection { .. } => 3,
            BulkCopyError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for bulk copy operations.
pub type Result<T> = std::result::Result<T, BulkCopyError>;
