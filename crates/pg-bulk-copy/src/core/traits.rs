//! Core traits for bulk copy.
//!
//! This module defines the seams between the writer and its collaborators:
//!
//! - [`TabularSource`]: Sequential, single-pass access to rows of host values
//! - [`Connection`]: Destination store connection with schema introspection
//! - [`ImportSession`]: One atomic binary import into a destination table
//!
//! The writer only talks to these traits, so the same streaming loop runs
//! against a live PostgreSQL server and against the in-memory destination.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::host::{HostType, HostValue};
use super::schema::DestinationColumn;
use super::value::PgValue;
use super::wire::WireType;

/// Uniform sequential-access view over a row producer.
///
/// Sources are single-pass: once [`advance`](TabularSource::advance) returned
/// `false` there is nothing left to read.
#[async_trait]
pub trait TabularSource: Send {
    /// Number of fields in every row.
    fn field_count(&self) -> usize;

    /// Name of the field at `index`.
    fn field_name(&self, index: usize) -> Option<&str>;

    /// Runtime type of the field at `index`.
    fn host_type_of(&self, index: usize) -> Option<HostType>;

    /// Resolve a field name to its ordinal.
    ///
    /// An exact match wins; otherwise the first ASCII case-insensitive match
    /// is returned.
    fn ordinal_of(&self, name: &str) -> Option<usize> {
        let count = self.field_count();
        (0..count)
            .find(|&i| self.field_name(i) == Some(name))
            .or_else(|| {
                (0..count).find(|&i| {
                    self.field_name(i)
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
                })
            })
    }

    /// Move to the next row. Returns `false` at end of data.
    async fn advance(&mut self) -> Result<bool>;

    /// Copy the current row into `values`, one slot per field.
    ///
    /// Missing values are written as [`HostValue::Null`].
    fn read_row(&mut self, values: &mut [HostValue]) -> Result<()>;
}

/// Connection to a destination table store.
#[async_trait]
pub trait Connection: Send {
    fn is_open(&self) -> bool;

    async fn open(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Fetch the columns of `table` in declaration order without reading rows.
    async fn describe_table(&mut self, table: &str) -> Result<Vec<DestinationColumn>>;

    /// Begin `COPY <table> FROM STDIN (FORMAT BINARY)`.
    ///
    /// `timeout` bounds every I/O operation of the returned session.
    async fn begin_import<'a>(
        &'a mut self,
        table: &str,
        column_count: usize,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn ImportSession + 'a>>;
}

/// An in-progress binary import.
///
/// Rows become durable only when [`complete`](ImportSession::complete)
/// succeeds. Dropping a session without completing it aborts the import and
/// the destination discards every row written so far.
#[async_trait]
pub trait ImportSession: Send {
    async fn start_row(&mut self) -> Result<()>;

    async fn write(&mut self, value: &PgValue, wire_type: WireType) -> Result<()>;

    async fn write_null(&mut self) -> Result<()>;

    /// Commit the import and return the number of rows the destination
    /// accepted.
    async fn complete(&mut self) -> Result<u64>;
}
