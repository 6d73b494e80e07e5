//! Tabular sources.
//!
//! Every source implements [`TabularSource`](crate::core::TabularSource):
//!
//! - [`QuerySource`]: Rows of a live PostgreSQL query
//! - [`TableSource`]: An in-memory [`DataTable`]
//! - [`RecordSource`]: A slice of `serde::Serialize` records

pub mod query;
pub mod record;
pub mod table;

pub use query::{source_host_type, QueryColumn, QuerySource};
pub use record::{RecordField, RecordSource};
pub use table::{DataColumn, DataTable, TableSource};
