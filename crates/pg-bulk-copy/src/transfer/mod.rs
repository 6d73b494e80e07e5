//! Row streaming writer.
//!
//! A [`BulkCopy`] moves every row of a tabular source into one destination
//! table through a single binary import session. Each invocation walks the
//! same states:
//!
//! ```text
//! Idle -> ConnectionEnsured -> SchemaResolved -> MappingResolved
//!      -> EncodersResolved -> Streaming -> Completed | Aborted
//! ```
//!
//! Everything up to `EncodersResolved` happens before the import begins, so
//! schema, mapping and resolution failures never touch the destination.
//! Rows become visible only when the session completes; on any failure or
//! cancellation the session is dropped and the destination discards it.

pub mod mapping;
pub mod schema;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CopyConfig;
use crate::core::{ColumnDescriptor, ColumnMapping, Connection, HostValue, TabularSource};
use crate::encoder::{EncoderRegistry, ResolvedEncoder};
use crate::error::{BulkCopyError, Result};
use crate::source::{DataTable, RecordField, RecordSource, TableSource};

pub use mapping::apply_mappings;
pub use schema::resolve_schema;

/// Last state reached by a [`BulkCopy`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    Idle,
    ConnectionEnsured,
    SchemaResolved,
    MappingResolved,
    EncodersResolved,
    Streaming,
    Completed,
    Aborted,
}

impl fmt::Display for CopyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CopyState::Idle => "idle",
            CopyState::ConnectionEnsured => "connection ensured",
            CopyState::SchemaResolved => "schema resolved",
            CopyState::MappingResolved => "mapping resolved",
            CopyState::EncodersResolved => "encoders resolved",
            CopyState::Streaming => "streaming",
            CopyState::Completed => "completed",
            CopyState::Aborted => "aborted",
        })
    }
}

fn set_state(state: &mut CopyState, next: CopyState) {
    debug!("Bulk copy state: {} -> {}", state, next);
    *state = next;
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: Option<&CancellationToken>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(BulkCopyError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Bulk writer bound to one destination table.
pub struct BulkCopy<'a> {
    connection: &'a mut dyn Connection,
    table: String,
    mappings: Vec<ColumnMapping>,
    timeout: Option<Duration>,
    registry: &'a EncoderRegistry,
    state: CopyState,
}

impl<'a> BulkCopy<'a> {
    /// Create a writer for `table` using the global encoder registry.
    ///
    /// If `connection` is not open, each write opens it and closes it again
    /// before returning.
    pub fn new(connection: &'a mut dyn Connection, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
            mappings: Vec::new(),
            timeout: None,
            registry: EncoderRegistry::global(),
            state: CopyState::Idle,
        }
    }

    /// Create a writer from the `copy` section of a configuration file.
    pub fn from_config(connection: &'a mut dyn Connection, config: &CopyConfig) -> Self {
        Self::new(connection, config.destination_table.clone())
            .with_mappings(config.column_mappings.clone())
            .with_timeout_secs(config.timeout_secs)
    }

    pub fn with_mappings(mut self, mappings: Vec<ColumnMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn add_mapping(&mut self, mapping: ColumnMapping) -> &mut Self {
        self.mappings.push(mapping);
        self
    }

    /// Bound every import I/O operation; 0 disables the timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Resolve encoders through `registry` instead of the global one.
    pub fn with_registry(mut self, registry: &'a EncoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> CopyState {
        self.state
    }

    /// Copy every row of `source` and return the number of committed rows.
    pub async fn write_to_server(
        &mut self,
        source: &mut dyn TabularSource,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        set_state(&mut self.state, CopyState::Idle);

        let owned = !self.connection.is_open();
        if owned {
            cancellable(cancel, self.connection.open()).await?;
        }
        set_state(&mut self.state, CopyState::ConnectionEnsured);

        let result = self.run(source, cancel).await;
        if !owned {
            return result;
        }

        let closed = self.connection.close().await;
        match (result, closed) {
            (Ok(rows), Ok(())) => Ok(rows),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close connection after error: {}", close_err);
                Err(e)
            }
        }
    }

    /// Copy every row of an in-memory table.
    pub async fn write_table(
        &mut self,
        table: &DataTable,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        let mut source = TableSource::new(table);
        self.write_to_server(&mut source, cancel).await
    }

    /// Copy serializable records, reading the declared `fields` of each.
    pub async fn write_records<T: Serialize + Sync>(
        &mut self,
        fields: Vec<RecordField>,
        records: &[T],
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        let mut source = RecordSource::new(fields, records);
        self.write_to_server(&mut source, cancel).await
    }

    async fn run(
        &mut self,
        source: &mut dyn TabularSource,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        let mut columns =
            cancellable(cancel, resolve_schema(&mut *self.connection, &self.table)).await?;
        set_state(&mut self.state, CopyState::SchemaResolved);

        apply_mappings(&mut columns, &self.mappings, source)?;
        set_state(&mut self.state, CopyState::MappingResolved);

        let encoders = self.resolve_encoders(&columns, source)?;
        set_state(&mut self.state, CopyState::EncodersResolved);

        info!(
            "Starting bulk copy into {} ({} columns)",
            self.table,
            columns.len()
        );
        match self.stream(&columns, &encoders, source, cancel).await {
            Ok(rows) => {
                set_state(&mut self.state, CopyState::Completed);
                info!("Copied {} rows into {}", rows, self.table);
                Ok(rows)
            }
            Err(e) => {
                set_state(&mut self.state, CopyState::Aborted);
                warn!("Bulk copy into {} aborted: {}", self.table, e);
                Err(e)
            }
        }
    }

    fn resolve_encoders(
        &self,
        columns: &[ColumnDescriptor],
        source: &dyn TabularSource,
    ) -> Result<Vec<ResolvedEncoder>> {
        let mut encoders = Vec::with_capacity(columns.len());
        for column in columns {
            let source_type = source.host_type_of(column.source_ordinal).ok_or(
                BulkCopyError::OrdinalOutOfRange {
                    side: "Source",
                    ordinal: column.source_ordinal,
                    count: source.field_count(),
                },
            )?;
            let encoder = self
                .registry
                .resolve(column.wire_type, column.host_type, source_type)?;
            debug!(
                "Column {}: {} from {} via {} ({})",
                column.name,
                column.wire_type,
                source_type,
                encoder.name(),
                encoder.tier
            );
            encoders.push(encoder);
        }
        Ok(encoders)
    }

    async fn stream(
        &mut self,
        columns: &[ColumnDescriptor],
        encoders: &[ResolvedEncoder],
        source: &mut dyn TabularSource,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        set_state(&mut self.state, CopyState::Streaming);
        let mut session = cancellable(
            cancel,
            self.connection
                .begin_import(&self.table, columns.len(), self.timeout),
        )
        .await?;

        let mut values = vec![HostValue::Null; source.field_count()];
        let mut rows: u64 = 0;
        while cancellable(cancel, source.advance()).await? {
            source.read_row(&mut values)?;
            cancellable(cancel, session.start_row()).await?;
            for (column, encoder) in columns.iter().zip(encoders) {
                let value = &values[column.source_ordinal];
                if value.is_null() {
                    cancellable(cancel, session.write_null()).await?;
                    continue;
                }
                let encoded = encoder
                    .encode(value, column.wire_type)
                    .map_err(|e| BulkCopyError::encode(&column.name, e.to_string()))?;
                cancellable(cancel, session.write(&encoded, column.wire_type)).await?;
            }
            rows += 1;
        }

        let committed = cancellable(cancel, session.complete()).await?;
        debug!("Streamed {} rows, destination committed {}", rows, committed);
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HostType, PgValue, WireType};
    use crate::destination::{MemoryColumn, MemoryDatabase};

    fn database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table(
            "metrics",
            vec![
                MemoryColumn::new("name", WireType::Text),
                MemoryColumn::new("value", WireType::Float8),
            ],
        );
        db
    }

    fn metrics(values: &[(&str, f64)]) -> DataTable {
        let mut table = DataTable::new()
            .with_column("name", HostType::String)
            .with_column("value", HostType::F64);
        for (name, value) in values {
            table.add_row(vec![(*name).into(), (*value).into()]).unwrap();
        }
        table
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = cancellable(Some(&token), async { Ok(1) }).await;
        assert!(matches!(result, Err(BulkCopyError::Cancelled)));
        assert_eq!(cancellable(None, async { Ok(1) }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_states_on_success() {
        let db = database();
        let mut conn = db.connect();
        let mut copy = BulkCopy::new(&mut conn, "metrics");
        assert_eq!(copy.state(), CopyState::Idle);

        let rows = copy
            .write_table(&metrics(&[("cpu", 0.5), ("mem", 0.25)]), None)
            .await
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(copy.state(), CopyState::Completed);
        assert_eq!(
            db.rows("metrics").unwrap()[1],
            vec![Some(PgValue::Text("mem".into())), Some(PgValue::Float8(0.25))]
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_stops_before_streaming() {
        let db = database();
        let mut conn = db.connect();
        let table = DataTable::new()
            .with_column("name", HostType::String)
            .with_column("value", HostType::Uuid);
        let mut copy = BulkCopy::new(&mut conn, "metrics");

        let err = copy.write_table(&table, None).await.unwrap_err();
        assert!(matches!(err, BulkCopyError::Resolution { .. }));
        assert_eq!(copy.state(), CopyState::MappingResolved);
    }

    #[tokio::test]
    async fn test_encode_failure_aborts() {
        let db = database();
        db.create_table("counts", vec![MemoryColumn::new("n", WireType::Int2)]);
        let mut conn = db.connect();
        let mut table = DataTable::new().with_column("n", HostType::I64);
        table.add_row(vec![1_i64.into()]).unwrap();
        table.add_row(vec![100_000_i64.into()]).unwrap();

        let mut copy = BulkCopy::new(&mut conn, "counts");
        let err = copy.write_table(&table, None).await.unwrap_err();
        assert!(matches!(err, BulkCopyError::Encode { ref column, .. } if column == "n"));
        assert_eq!(copy.state(), CopyState::Aborted);
        assert_eq!(db.row_count("counts"), 0);
    }

    #[tokio::test]
    async fn test_timeout_secs_zero_disables() {
        let db = database();
        let mut conn = db.connect();
        let copy = BulkCopy::new(&mut conn, "metrics").with_timeout_secs(0);
        assert!(copy.timeout.is_none());
    }
}
