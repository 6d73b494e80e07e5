//! In-memory destination.
//!
//! Sessions build a real binary COPY stream and, on completion, parse it
//! back with [`CopyParser`] before appending the rows. A session dropped
//! without completing leaves its table untouched.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::codec::{CopyParser, CopyWriter};
use crate::core::{Connection, DestinationColumn, ImportSession, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

/// Row as stored by the in-memory destination; `None` is SQL NULL.
pub type MemoryRow = Vec<Option<PgValue>>;

/// Column definition of an in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryColumn {
    pub name: String,
    pub wire_type: WireType,
    pub nullable: bool,
}

impl MemoryColumn {
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<MemoryColumn>,
    rows: Vec<MemoryRow>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: DashMap<String, MemoryTable>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_close: AtomicBool,
}

/// A set of in-memory tables shared by every connection made from it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table.
    pub fn create_table(&self, name: impl Into<String>, columns: Vec<MemoryColumn>) {
        self.shared.tables.insert(
            name.into(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Option<Vec<MemoryRow>> {
        self.shared.tables.get(table).map(|t| t.rows.clone())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.shared.tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// A new, unopened connection.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            db: self.clone(),
            open: false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Make every later `close` fail after closing the connection.
    pub fn fail_on_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }
}

/// Connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BulkCopyError::Protocol("connection is not open".into()))
        }
    }

    fn columns_of(&self, table: &str) -> Result<Vec<MemoryColumn>> {
        self.db
            .shared
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| {
                BulkCopyError::metadata(table, format!("relation \"{}\" does not exist", table))
            })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<()> {
        self.db.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.db.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
        if self.db.shared.fail_close.load(Ordering::SeqCst) {
            return Err(BulkCopyError::connection(
                "connection reset while closing",
                "closing in-memory connection",
            ));
        }
        Ok(())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<DestinationColumn>> {
        self.ensure_open()?;
        Ok(self
            .columns_of(table)?
            .into_iter()
            .map(|c| DestinationColumn::new(c.name, c.wire_type))
            .collect())
    }

    async fn begin_import<'a>(
        &'a mut self,
        table: &str,
        column_count: usize,
        _timeout: Option<Duration>,
    ) -> Result<Box<dyn ImportSession + 'a>> {
        self.ensure_open()?;
        let columns = self.columns_of(table)?;
        if columns.len() != column_count {
            return Err(BulkCopyError::Protocol(format!(
                "table {} has {} columns, COPY sends {}",
                table,
                columns.len(),
                column_count
            )));
        }
        Ok(Box::new(MemoryImportSession {
            db: self.db.clone(),
            table: table.to_string(),
            writer: CopyWriter::new(column_count)?,
            columns,
            field: 0,
        }))
    }
}

struct MemoryImportSession {
    db: MemoryDatabase,
    table: String,
    writer: CopyWriter,
    columns: Vec<MemoryColumn>,
    field: usize,
}

#[async_trait]
impl ImportSession for MemoryImportSession {
    async fn start_row(&mut self) -> Result<()> {
        self.writer.start_row()?;
        self.field = 0;
        Ok(())
    }

    async fn write(&mut self, value: &PgValue, wire_type: WireType) -> Result<()> {
        self.writer.write(value, wire_type)?;
        self.field += 1;
        Ok(())
    }

    async fn write_null(&mut self) -> Result<()> {
        if let Some(column) = self.columns.get(self.field) {
            if !column.nullable {
                return Err(BulkCopyError::Destination(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, self.table
                )));
            }
        }
        self.writer.write_null()?;
        self.field += 1;
        Ok(())
    }

    async fn complete(&mut self) -> Result<u64> {
        self.writer.finish()?;
        let data = self.writer.take_chunk();
        let types = self.columns.iter().map(|c| c.wire_type).collect();
        let rows = CopyParser::parse_all(types, &data)?;
        let count = rows.len() as u64;

        let mut table = self.db.shared.tables.get_mut(&self.table).ok_or_else(|| {
            BulkCopyError::Destination(format!("relation \"{}\" was dropped", self.table))
        })?;
        table.rows.extend(rows);
        debug!("Committed {} rows into in-memory table {}", count, self.table);
        Ok(count)
    }
}
