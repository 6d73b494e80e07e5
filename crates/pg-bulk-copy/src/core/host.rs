//! Host-side type tags and dynamically typed source values.
//!
//! A [`HostType`] is the stable runtime identity of a value produced by a
//! tabular source. Encoder lookup is keyed on these tags instead of on Rust
//! generic parameters, so one dispatch table covers every source.

use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::geometry::{Circle, GeoBox, Line, LineSegment, Path, Point, Polygon};
use super::net::{Inet, MacAddress};
use super::value::{BitString, Interval, PgRange};

/// Runtime type tag of a host value.
///
/// Parametrized forms reference their element tag through a `'static`
/// reference, e.g. `HostType::Array(&HostType::I32)`, which keeps the tag
/// `Copy` and hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Bytes,
    Uuid,
    /// Calendar date without time.
    Date,
    /// Time of day without date.
    Time,
    /// Date and time with unspecified zone semantics.
    DateTime,
    /// Instant carrying explicit UTC semantics.
    DateTimeUtc,
    /// Wall-clock value in the process-local zone.
    DateTimeLocal,
    /// Date and time at a fixed UTC offset.
    DateTimeOffset,
    Duration,
    Interval,
    Json,
    IpAddr,
    Inet,
    MacAddr,
    BitString,
    Point,
    Line,
    LineSegment,
    GeoBox,
    Path,
    Polygon,
    Circle,
    /// Nullable wrapper around another host type.
    Optional(&'static HostType),
    Array(&'static HostType),
    Range(&'static HostType),
    /// User-defined host type, identified by name.
    Custom(&'static str),
}

impl HostType {
    /// Return a `'static` reference to this tag when it is not parametrized.
    ///
    /// Used when an element tag has to be embedded in an `Array`/`Range` tag
    /// that is only known at runtime.
    pub fn as_static(self) -> Option<&'static HostType> {
        let tag: &'static HostType = match self {
            HostType::Bool => &HostType::Bool,
            HostType::I8 => &HostType::I8,
            HostType::I16 => &HostType::I16,
            HostType::I32 => &HostType::I32,
            HostType::I64 => &HostType::I64,
            HostType::U8 => &HostType::U8,
            HostType::U16 => &HostType::U16,
            HostType::U32 => &HostType::U32,
            HostType::U64 => &HostType::U64,
            HostType::F32 => &HostType::F32,
            HostType::F64 => &HostType::F64,
            HostType::Decimal => &HostType::Decimal,
            HostType::Char => &HostType::Char,
            HostType::String => &HostType::String,
            HostType::Bytes => &HostType::Bytes,
            HostType::Uuid => &HostType::Uuid,
            HostType::Date => &HostType::Date,
            HostType::Time => &HostType::Time,
            HostType::DateTime => &HostType::DateTime,
            HostType::DateTimeUtc => &HostType::DateTimeUtc,
            HostType::DateTimeLocal => &HostType::DateTimeLocal,
            HostType::DateTimeOffset => &HostType::DateTimeOffset,
            HostType::Duration => &HostType::Duration,
            HostType::Interval => &HostType::Interval,
            HostType::Json => &HostType::Json,
            HostType::IpAddr => &HostType::IpAddr,
            HostType::Inet => &HostType::Inet,
            HostType::MacAddr => &HostType::MacAddr,
            HostType::BitString => &HostType::BitString,
            HostType::Point => &HostType::Point,
            HostType::Line => &HostType::Line,
            HostType::LineSegment => &HostType::LineSegment,
            HostType::GeoBox => &HostType::GeoBox,
            HostType::Path => &HostType::Path,
            HostType::Polygon => &HostType::Polygon,
            HostType::Circle => &HostType::Circle,
            HostType::Optional(_)
            | HostType::Array(_)
            | HostType::Range(_)
            | HostType::Custom(_) => return None,
        };
        Some(tag)
    }

    /// Strip every `Optional` layer.
    pub fn without_optional(self) -> HostType {
        let mut current = self;
        while let HostType::Optional(inner) = current {
            current = *inner;
        }
        current
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostType::Bool => "bool",
            HostType::I8 => "i8",
            HostType::I16 => "i16",
            HostType::I32 => "i32",
            HostType::I64 => "i64",
            HostType::U8 => "u8",
            HostType::U16 => "u16",
            HostType::U32 => "u32",
            HostType::U64 => "u64",
            HostType::F32 => "f32",
            HostType::F64 => "f64",
            HostType::Decimal => "Decimal",
            HostType::Char => "char",
            HostType::String => "String",
            HostType::Bytes => "Vec<u8>",
            HostType::Uuid => "Uuid",
            HostType::Date => "NaiveDate",
            HostType::Time => "NaiveTime",
            HostType::DateTime => "NaiveDateTime",
            HostType::DateTimeUtc => "DateTime<Utc>",
            HostType::DateTimeLocal => "DateTime<Local>",
            HostType::DateTimeOffset => "DateTime<FixedOffset>",
            HostType::Duration => "TimeDelta",
            HostType::Interval => "Interval",
            HostType::Json => "serde_json::Value",
            HostType::IpAddr => "IpAddr",
            HostType::Inet => "Inet",
            HostType::MacAddr => "MacAddress",
            HostType::BitString => "BitString",
            HostType::Point => "Point",
            HostType::Line => "Line",
            HostType::LineSegment => "LineSegment",
            HostType::GeoBox => "GeoBox",
            HostType::Path => "Path",
            HostType::Polygon => "Polygon",
            HostType::Circle => "Circle",
            HostType::Optional(inner) => return write!(f, "Option<{}>", inner),
            HostType::Array(inner) => return write!(f, "Vec<{}>", inner),
            HostType::Range(inner) => return write!(f, "PgRange<{}>", inner),
            HostType::Custom(name) => name,
        };
        f.write_str(name)
    }
}

/// Array value together with its element tag.
#[derive(Debug, Clone)]
pub struct HostArray {
    pub element: &'static HostType,
    /// Items may contain [`HostValue::Null`].
    pub items: Vec<HostValue>,
}

/// Range value together with its element tag.
#[derive(Debug, Clone)]
pub struct HostRange {
    pub element: &'static HostType,
    pub range: PgRange<HostValue>,
}

/// Value of a user-defined host type.
#[derive(Clone)]
pub struct CustomValue {
    pub type_name: &'static str,
    pub value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(type_name: &'static str, value: T) -> Self {
        Self {
            type_name,
            value: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A dynamically typed value read from a tabular source.
///
/// [`HostValue::Null`] is the null sentinel: it is distinct from every
/// legitimate value and is never handed to an encoder.
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    DateTimeLocal(DateTime<Local>),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(TimeDelta),
    Interval(Interval),
    Json(serde_json::Value),
    IpAddr(IpAddr),
    Inet(Inet),
    MacAddr(MacAddress),
    BitString(BitString),
    Point(Point),
    Line(Line),
    LineSegment(LineSegment),
    GeoBox(GeoBox),
    Path(Path),
    Polygon(Polygon),
    Circle(Circle),
    Array(HostArray),
    Range(Box<HostRange>),
    Custom(CustomValue),
}

impl HostValue {
    /// Check if this value is the null sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Runtime type tag of this value, `None` for the null sentinel.
    #[must_use]
    pub fn host_type(&self) -> Option<HostType> {
        let tag = match self {
            HostValue::Null => return None,
            HostValue::Bool(_) => HostType::Bool,
            HostValue::I8(_) => HostType::I8,
            HostValue::I16(_) => HostType::I16,
            HostValue::I32(_) => HostType::I32,
            HostValue::I64(_) => HostType::I64,
            HostValue::U8(_) => HostType::U8,
            HostValue::U16(_) => HostType::U16,
            HostValue::U32(_) => HostType::U32,
            HostValue::U64(_) => HostType::U64,
            HostValue::F32(_) => HostType::F32,
            HostValue::F64(_) => HostType::F64,
            HostValue::Decimal(_) => HostType::Decimal,
            HostValue::Char(_) => HostType::Char,
            HostValue::String(_) => HostType::String,
            HostValue::Bytes(_) => HostType::Bytes,
            HostValue::Uuid(_) => HostType::Uuid,
            HostValue::Date(_) => HostType::Date,
            HostValue::Time(_) => HostType::Time,
            HostValue::DateTime(_) => HostType::DateTime,
            HostValue::DateTimeUtc(_) => HostType::DateTimeUtc,
            HostValue::DateTimeLocal(_) => HostType::DateTimeLocal,
            HostValue::DateTimeOffset(_) => HostType::DateTimeOffset,
            HostValue::Duration(_) => HostType::Duration,
            HostValue::Interval(_) => HostType::Interval,
            HostValue::Json(_) => HostType::Json,
            HostValue::IpAddr(_) => HostType::IpAddr,
            HostValue::Inet(_) => HostType::Inet,
            HostValue::MacAddr(_) => HostType::MacAddr,
            HostValue::BitString(_) => HostType::BitString,
            HostValue::Point(_) => HostType::Point,
            HostValue::Line(_) => HostType::Line,
            HostValue::LineSegment(_) => HostType::LineSegment,
            HostValue::GeoBox(_) => HostType::GeoBox,
            HostValue::Path(_) => HostType::Path,
            HostValue::Polygon(_) => HostType::Polygon,
            HostValue::Circle(_) => HostType::Circle,
            HostValue::Array(a) => HostType::Array(a.element),
            HostValue::Range(r) => HostType::Range(r.element),
            HostValue::Custom(c) => HostType::Custom(c.type_name),
        };
        Some(tag)
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> String {
        match self.host_type() {
            Some(tag) => tag.to_string(),
            None => "null".to_string(),
        }
    }

    /// Build an array value.
    pub fn array(element: &'static HostType, items: Vec<HostValue>) -> Self {
        HostValue::Array(HostArray { element, items })
    }

    /// Build a range value.
    pub fn range(element: &'static HostType, range: PgRange<HostValue>) -> Self {
        HostValue::Range(Box::new(HostRange { element, range }))
    }

    /// Check whether this value can stand in a slot declared as `declared`.
    pub fn conforms_to(&self, declared: HostType) -> bool {
        match self.host_type() {
            None => true,
            Some(actual) => actual == declared.without_optional(),
        }
    }
}

macro_rules! host_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

host_value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeUtc,
    DateTime<Local> => DateTimeLocal,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => Duration,
    Interval => Interval,
    serde_json::Value => Json,
    IpAddr => IpAddr,
    Inet => Inet,
    MacAddress => MacAddr,
    BitString => BitString,
    Point => Point,
    Line => Line,
    LineSegment => LineSegment,
    GeoBox => GeoBox,
    Path => Path,
    Polygon => Polygon,
    Circle => Circle,
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::String(v.to_string())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_has_no_type() {
        assert!(HostValue::Null.is_null());
        assert_eq!(HostValue::Null.host_type(), None);
        assert_eq!(HostValue::from(None::<i32>).host_type(), None);
    }

    #[test]
    fn test_parametrized_tags() {
        let v = HostValue::array(&HostType::I32, vec![1.into(), HostValue::Null]);
        assert_eq!(v.host_type(), Some(HostType::Array(&HostType::I32)));
        assert_eq!(
            HostType::Optional(&HostType::Optional(&HostType::I64)).without_optional(),
            HostType::I64
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(HostType::Optional(&HostType::I32).to_string(), "Option<i32>");
        assert_eq!(HostType::Array(&HostType::String).to_string(), "Vec<String>");
        assert_eq!(HostType::Custom("Money").to_string(), "Money");
    }

    #[test]
    fn test_as_static_only_for_plain_tags() {
        assert_eq!(HostType::Uuid.as_static(), Some(&HostType::Uuid));
        assert_eq!(HostType::Array(&HostType::I32).as_static(), None);
    }

    #[test]
    fn test_conforms_to_optional() {
        let v = HostValue::I32(5);
        assert!(v.conforms_to(HostType::Optional(&HostType::I32)));
        assert!(!v.conforms_to(HostType::I64));
        assert!(HostValue::Null.conforms_to(HostType::String));
    }

    #[test]
    fn test_custom_value_downcast() {
        let v = CustomValue::new("Cents", 1250_i64);
        assert_eq!(v.downcast_ref::<i64>(), Some(&1250));
        assert!(v.downcast_ref::<String>().is_none());
    }
}
