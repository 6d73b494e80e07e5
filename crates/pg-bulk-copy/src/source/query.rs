//! Streaming source over a live PostgreSQL query.
//!
//! The query runs through `query_raw`, so rows are pulled from the server one
//! at a time. Field values are taken as raw binary payloads and decoded with
//! the same codec the COPY writer uses.

use std::error::Error;
use std::pin::Pin;

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Row, RowStream};
use tracing::debug;

use crate::codec;
use crate::core::{HostType, HostValue, PgValue, TabularSource, WireType};
use crate::encoder::temporal::{at_offset, time_anchor};
use crate::error::{BulkCopyError, Result};

/// Binary payload of one field, accepted for any column type.
struct RawField(Option<Vec<u8>>);

impl<'a> FromSql<'a> for RawField {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawField(Some(raw.to_vec())))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawField(None))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Result column of a [`QuerySource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryColumn {
    pub name: String,
    pub wire_type: WireType,
    pub host_type: HostType,
}

/// Host type produced when reading a column of `wire` type.
///
/// Differs from [`WireType::host_type`] where decoding keeps more than the
/// declared host type holds: intervals keep months, network columns keep
/// their prefix length.
pub fn source_host_type(wire: WireType) -> HostType {
    match wire {
        WireType::Interval => HostType::Interval,
        WireType::Inet | WireType::Cidr => HostType::Inet,
        WireType::Array(&WireType::Interval) => HostType::Array(&HostType::Interval),
        WireType::Array(&(WireType::Inet | WireType::Cidr)) => HostType::Array(&HostType::Inet),
        other => other.host_type(),
    }
}

/// Pull-style cursor over the result rows of a query.
pub struct QuerySource {
    columns: Vec<QueryColumn>,
    rows: Pin<Box<RowStream>>,
    current: Option<Row>,
}

impl QuerySource {
    /// Prepare `query` and start streaming its rows.
    pub async fn new(client: &Client, query: &str) -> Result<Self> {
        let statement = client.prepare(query).await?;
        let columns: Vec<QueryColumn> = statement
            .columns()
            .iter()
            .map(|c| {
                let wire_type = WireType::from_oid(c.type_().oid());
                QueryColumn {
                    name: c.name().to_string(),
                    wire_type,
                    host_type: source_host_type(wire_type),
                }
            })
            .collect();
        debug!("Query source has {} columns", columns.len());

        let params: [&(dyn ToSql + Sync); 0] = [];
        let rows = client.query_raw(&statement, params).await?;
        Ok(Self {
            columns,
            rows: Box::pin(rows),
            current: None,
        })
    }

    pub fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }
}

#[async_trait]
impl TabularSource for QuerySource {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn field_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    fn host_type_of(&self, index: usize) -> Option<HostType> {
        self.columns.get(index).map(|c| c.host_type)
    }

    async fn advance(&mut self) -> Result<bool> {
        self.current = self.rows.try_next().await?;
        Ok(self.current.is_some())
    }

    fn read_row(&mut self, values: &mut [HostValue]) -> Result<()> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| BulkCopyError::Protocol("no current row".into()))?;
        for (i, (slot, column)) in values.iter_mut().zip(&self.columns).enumerate() {
            let raw: RawField = row.try_get(i)?;
            *slot = match raw.0 {
                Some(bytes) => {
                    pg_to_host(codec::decode(column.wire_type, &bytes)?, column.wire_type)?
                }
                None => HostValue::Null,
            };
        }
        Ok(())
    }
}

fn element_tag(host: HostType) -> Result<&'static HostType> {
    match host {
        HostType::Array(element) | HostType::Range(element) => Ok(element),
        other => Err(BulkCopyError::Conversion(format!(
            "{} has no element type",
            other
        ))),
    }
}

/// Convert a decoded value of column type `wire` into its source host value.
pub fn pg_to_host(value: PgValue, wire: WireType) -> Result<HostValue> {
    Ok(match value {
        PgValue::Bool(v) => HostValue::Bool(v),
        PgValue::Int2(v) => HostValue::I16(v),
        PgValue::Int4(v) => HostValue::I32(v),
        PgValue::Int8(v) => HostValue::I64(v),
        PgValue::Float4(v) => HostValue::F32(v),
        PgValue::Float8(v) => HostValue::F64(v),
        PgValue::Numeric(v) => HostValue::Decimal(v),
        PgValue::Money(cents) => HostValue::Decimal(Decimal::new(cents, 2)),
        PgValue::Text(v) | PgValue::Json(v) => HostValue::String(v),
        PgValue::Bytea(v) | PgValue::Raw(v) => HostValue::Bytes(v),
        PgValue::Uuid(v) => HostValue::Uuid(v),
        PgValue::Date(v) => HostValue::Date(v),
        PgValue::Time(v) => HostValue::Time(v),
        PgValue::TimeTz(time, offset) => {
            HostValue::DateTimeOffset(at_offset(time_anchor().and_time(time), offset)?)
        }
        PgValue::Timestamp(v) => HostValue::DateTime(v),
        PgValue::TimestampTz(v) => HostValue::DateTimeUtc(v),
        PgValue::Interval(v) => HostValue::Interval(v),
        PgValue::Inet(v) => HostValue::Inet(v),
        PgValue::MacAddr(v) => HostValue::MacAddr(v),
        PgValue::Bits(v) => HostValue::BitString(v),
        PgValue::Point(v) => HostValue::Point(v),
        PgValue::Line(v) => HostValue::Line(v),
        PgValue::LineSegment(v) => HostValue::LineSegment(v),
        PgValue::Box(v) => HostValue::GeoBox(v),
        PgValue::Path(v) => HostValue::Path(v),
        PgValue::Polygon(v) => HostValue::Polygon(v),
        PgValue::Circle(v) => HostValue::Circle(v),
        PgValue::Range(range) => {
            let subtype = wire.range_subtype().ok_or_else(|| {
                BulkCopyError::Conversion(format!("{} is not a range type", wire))
            })?;
            let element = element_tag(source_host_type(wire))?;
            HostValue::range(element, (*range).try_map(|v| pg_to_host(v, subtype))?)
        }
        PgValue::Array(items) => {
            let element_wire = wire.array_element().ok_or_else(|| {
                BulkCopyError::Conversion(format!("{} is not an array type", wire))
            })?;
            let element = element_tag(source_host_type(wire))?;
            let items = items
                .into_iter()
                .map(|item| match item {
                    Some(v) => pg_to_host(v, element_wire),
                    None => Ok(HostValue::Null),
                })
                .collect::<Result<Vec<_>>>()?;
            HostValue::array(element, items)
        }
    })
}
