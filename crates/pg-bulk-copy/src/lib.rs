//! # pg-bulk-copy
//!
//! Type-directed bulk loading into PostgreSQL over the binary COPY protocol.
//!
//! The library streams rows from a tabular source into one destination table:
//!
//! - **Schema discovery** with a zero-row metadata query
//! - **Column mapping** by name or ordinal, identity by default
//! - **Encoder resolution** per column from the (wire type, host type) pair,
//!   extensible at runtime
//! - **Atomic imports**: rows are committed only when the COPY completes
//! - **Cancellation** through a `CancellationToken`
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_bulk_copy::{BulkCopy, DataTable, HostType, PgConnection, TargetConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TargetConfig {
//!         host: "localhost".into(),
//!         port: 5432,
//!         database: "app".into(),
//!         user: "loader".into(),
//!         password: "secret".into(),
//!         ssl_mode: "disable".into(),
//!     };
//!     let mut table = DataTable::new()
//!         .with_column("id", HostType::I32)
//!         .with_column("name", HostType::String);
//!     table.add_row(vec![1.into(), "ada".into()])?;
//!
//!     let mut connection = PgConnection::new(config);
//!     let rows = BulkCopy::new(&mut connection, "people")
//!         .with_timeout_secs(30)
//!         .write_table(&table, None)
//!         .await?;
//!     println!("Copied {} rows", rows);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod destination;
pub mod encoder;
pub mod error;
pub mod source;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, CopyConfig, SourceConfig, TargetConfig};
pub use crate::core::{
    ColumnDescriptor, ColumnMapping, ColumnRef, Connection, HostType, HostValue, ImportSession,
    PgValue, TabularSource, WireType,
};
pub use destination::{MemoryColumn, MemoryDatabase, PgConnection, SslMode};
pub use encoder::{
    clear_custom_encoders, register_converter, register_encoder, unregister_encoder, Encoder,
    EncoderRegistry, FnEncoder, ResolvedEncoder, Tier,
};
pub use error::{BulkCopyError, Result};
pub use source::{DataTable, QuerySource, RecordField, RecordSource, TableSource};
pub use transfer::{BulkCopy, CopyState};
