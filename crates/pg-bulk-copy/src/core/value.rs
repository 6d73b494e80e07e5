//! Protocol-level values written into an import session.
//!
//! A [`PgValue`] is what an encoder produces: a value already shaped for one
//! PostgreSQL wire type, ready for the binary codec.

use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::geometry::{Circle, GeoBox, Line, LineSegment, Path, Point, Polygon};
use super::net::{Inet, MacAddress};
use crate::error::{BulkCopyError, Result};

/// PostgreSQL `interval`: months, days and microseconds are kept apart
/// because their lengths are calendar-dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

/// Bit string for `bit` and `varbit` columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BitString(pub Vec<bool>);

impl BitString {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pack the bits MSB-first, padding the last byte with zeros.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.0.len().div_ceil(8)];
        for (i, bit) in self.0.iter().enumerate() {
            if *bit {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// Unpack `len` bits from MSB-first bytes.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self> {
        if bytes.len() * 8 < len {
            return Err(BulkCopyError::Codec(format!(
                "bit string of {} bits needs {} bytes, got {}",
                len,
                len.div_ceil(8),
                bytes.len()
            )));
        }
        let bits = (0..len)
            .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect();
        Ok(BitString(bits))
    }
}

impl FromStr for BitString {
    type Err = BulkCopyError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(BulkCopyError::Conversion(format!(
                    "invalid bit {:?} in bit string",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(BitString)
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// A range over `T` with independently inclusive, exclusive or infinite bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct PgRange<T> {
    pub lower: Bound<T>,
    pub upper: Bound<T>,
    /// An empty range ignores both bounds.
    pub empty: bool,
}

impl<T> PgRange<T> {
    pub fn new(lower: Bound<T>, upper: Bound<T>) -> Self {
        Self {
            lower,
            upper,
            empty: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            empty: true,
        }
    }

    /// Convert both bounds, failing on the first conversion error.
    pub fn try_map<U, F>(self, mut f: F) -> Result<PgRange<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        let mut map_bound = |b: Bound<T>| -> Result<Bound<U>> {
            Ok(match b {
                Bound::Included(v) => Bound::Included(f(v)?),
                Bound::Excluded(v) => Bound::Excluded(f(v)?),
                Bound::Unbounded => Bound::Unbounded,
            })
        };
        let lower = map_bound(self.lower)?;
        let upper = map_bound(self.upper)?;
        Ok(PgRange {
            lower,
            upper,
            empty: self.empty,
        })
    }
}

/// A value shaped for one PostgreSQL wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    /// Amount in the smallest currency unit (cents).
    Money(i64),
    Text(String),
    Bytea(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(Interval),
    /// Serialized JSON document text.
    Json(String),
    Inet(Inet),
    MacAddr(MacAddress),
    Bits(BitString),
    Point(Point),
    Line(Line),
    LineSegment(LineSegment),
    Box(GeoBox),
    Path(Path),
    Polygon(Polygon),
    Circle(Circle),
    Range(Box<PgRange<PgValue>>),
    /// One-dimensional array; `None` elements are SQL NULL.
    Array(Vec<Option<PgValue>>),
    /// Already encoded binary payload, written as-is.
    Raw(Vec<u8>),
}

impl PgValue {
    /// Short variant name used in codec error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PgValue::Bool(_) => "bool",
            PgValue::Int2(_) => "int2",
            PgValue::Int4(_) => "int4",
            PgValue::Int8(_) => "int8",
            PgValue::Float4(_) => "float4",
            PgValue::Float8(_) => "float8",
            PgValue::Numeric(_) => "numeric",
            PgValue::Money(_) => "money",
            PgValue::Text(_) => "text",
            PgValue::Bytea(_) => "bytea",
            PgValue::Uuid(_) => "uuid",
            PgValue::Date(_) => "date",
            PgValue::Time(_) => "time",
            PgValue::TimeTz(_, _) => "timetz",
            PgValue::Timestamp(_) => "timestamp",
            PgValue::TimestampTz(_) => "timestamptz",
            PgValue::Interval(_) => "interval",
            PgValue::Json(_) => "json",
            PgValue::Inet(_) => "inet",
            PgValue::MacAddr(_) => "macaddr",
            PgValue::Bits(_) => "bit",
            PgValue::Point(_) => "point",
            PgValue::Line(_) => "line",
            PgValue::LineSegment(_) => "lseg",
            PgValue::Box(_) => "box",
            PgValue::Path(_) => "path",
            PgValue::Polygon(_) => "polygon",
            PgValue::Circle(_) => "circle",
            PgValue::Range(_) => "range",
            PgValue::Array(_) => "array",
            PgValue::Raw(_) => "raw",
        }
    }

    pub fn range(range: PgRange<PgValue>) -> Self {
        PgValue::Range(Box::new(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_string_packing() {
        let bits: BitString = "101000001".parse().unwrap();
        assert_eq!(bits.len(), 9);
        assert_eq!(bits.to_bytes(), vec![0b1010_0000, 0b1000_0000]);
        assert_eq!(BitString::from_bytes(&bits.to_bytes(), 9).unwrap(), bits);
        assert_eq!(bits.to_string(), "101000001");
    }

    #[test]
    fn test_bit_string_rejects_garbage() {
        assert!("10a1".parse::<BitString>().is_err());
        assert!(BitString::from_bytes(&[0xFF], 9).is_err());
    }

    #[test]
    fn test_range_try_map() {
        let r = PgRange::new(Bound::Included(1), Bound::Excluded(10));
        let mapped = r.try_map(|v| Ok(i64::from(v) * 2)).unwrap();
        assert_eq!(mapped.lower, Bound::Included(2));
        assert_eq!(mapped.upper, Bound::Excluded(20));

        let failed = PgRange::new(Bound::Included(1), Bound::<i32>::Unbounded)
            .try_map(|_| Err::<i32, _>(BulkCopyError::Conversion("nope".into())));
        assert!(failed.is_err());
    }

    #[test]
    fn test_empty_range() {
        let r: PgRange<i32> = PgRange::empty();
        assert!(r.empty);
        assert_eq!(r.lower, Bound::Unbounded);
    }
}
