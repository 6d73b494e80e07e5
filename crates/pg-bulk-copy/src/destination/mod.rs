//! Destination connections.
//!
//! - [`postgres`]: Live PostgreSQL server through tokio-postgres
//! - [`memory`]: In-memory tables that replay the binary COPY stream
//! - [`tls`]: rustls setup for `ssl_mode`

pub mod memory;
pub mod postgres;
pub mod tls;

pub use memory::{MemoryColumn, MemoryConnection, MemoryDatabase, MemoryRow};
pub use postgres::PgConnection;
pub use tls::SslMode;
