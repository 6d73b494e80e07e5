//! PostgreSQL wire types.

use std::fmt;

use super::host::HostType;

/// Destination column type in the binary transfer protocol.
///
/// Arrays are one-dimensional and reference their element type through a
/// `'static` reference so the tag stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Text,
    Varchar,
    /// Blank-padded `bpchar`.
    Char,
    Name,
    Xml,
    Bytea,
    Uuid,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    Jsonb,
    Inet,
    Cidr,
    MacAddr,
    MacAddr8,
    Bit,
    Varbit,
    Point,
    Line,
    LSeg,
    Box,
    Path,
    Polygon,
    Circle,
    Int4Range,
    Int8Range,
    NumRange,
    TsRange,
    TsTzRange,
    DateRange,
    Array(&'static WireType),
    /// A type this crate does not know, by OID.
    Other(u32),
}

const SCALARS: &[(u32, WireType, &str)] = &[
    (16, WireType::Bool, "bool"),
    (17, WireType::Bytea, "bytea"),
    (19, WireType::Name, "name"),
    (20, WireType::Int8, "int8"),
    (21, WireType::Int2, "int2"),
    (23, WireType::Int4, "int4"),
    (25, WireType::Text, "text"),
    (114, WireType::Json, "json"),
    (142, WireType::Xml, "xml"),
    (600, WireType::Point, "point"),
    (601, WireType::LSeg, "lseg"),
    (602, WireType::Path, "path"),
    (603, WireType::Box, "box"),
    (604, WireType::Polygon, "polygon"),
    (628, WireType::Line, "line"),
    (650, WireType::Cidr, "cidr"),
    (700, WireType::Float4, "float4"),
    (701, WireType::Float8, "float8"),
    (718, WireType::Circle, "circle"),
    (774, WireType::MacAddr8, "macaddr8"),
    (790, WireType::Money, "money"),
    (829, WireType::MacAddr, "macaddr"),
    (869, WireType::Inet, "inet"),
    (1042, WireType::Char, "bpchar"),
    (1043, WireType::Varchar, "varchar"),
    (1082, WireType::Date, "date"),
    (1083, WireType::Time, "time"),
    (1114, WireType::Timestamp, "timestamp"),
    (1184, WireType::TimestampTz, "timestamptz"),
    (1186, WireType::Interval, "interval"),
    (1266, WireType::TimeTz, "timetz"),
    (1560, WireType::Bit, "bit"),
    (1562, WireType::Varbit, "varbit"),
    (1700, WireType::Numeric, "numeric"),
    (2950, WireType::Uuid, "uuid"),
    (3802, WireType::Jsonb, "jsonb"),
    (3904, WireType::Int4Range, "int4range"),
    (3906, WireType::NumRange, "numrange"),
    (3908, WireType::TsRange, "tsrange"),
    (3910, WireType::TsTzRange, "tstzrange"),
    (3912, WireType::DateRange, "daterange"),
    (3926, WireType::Int8Range, "int8range"),
];

/// Array type OIDs keyed by element type.
const ARRAYS: &[(u32, WireType)] = &[
    (1000, WireType::Bool),
    (1001, WireType::Bytea),
    (1003, WireType::Name),
    (1005, WireType::Int2),
    (1007, WireType::Int4),
    (1009, WireType::Text),
    (1014, WireType::Char),
    (1015, WireType::Varchar),
    (1016, WireType::Int8),
    (1017, WireType::Point),
    (1018, WireType::LSeg),
    (1019, WireType::Path),
    (1020, WireType::Box),
    (1021, WireType::Float4),
    (1022, WireType::Float8),
    (1027, WireType::Polygon),
    (629, WireType::Line),
    (651, WireType::Cidr),
    (719, WireType::Circle),
    (775, WireType::MacAddr8),
    (791, WireType::Money),
    (1040, WireType::MacAddr),
    (1041, WireType::Inet),
    (1182, WireType::Date),
    (1183, WireType::Time),
    (1115, WireType::Timestamp),
    (1185, WireType::TimestampTz),
    (1187, WireType::Interval),
    (1231, WireType::Numeric),
    (1270, WireType::TimeTz),
    (1561, WireType::Bit),
    (1563, WireType::Varbit),
    (2951, WireType::Uuid),
    (199, WireType::Json),
    (3807, WireType::Jsonb),
    (143, WireType::Xml),
    (3905, WireType::Int4Range),
    (3907, WireType::NumRange),
    (3909, WireType::TsRange),
    (3911, WireType::TsTzRange),
    (3913, WireType::DateRange),
    (3927, WireType::Int8Range),
];

impl WireType {
    /// Resolve a wire type from its PostgreSQL type OID.
    pub fn from_oid(oid: u32) -> WireType {
        if let Some((_, wire, _)) = SCALARS.iter().find(|(o, _, _)| *o == oid) {
            return *wire;
        }
        if let Some((_, element)) = ARRAYS.iter().find(|(o, _)| *o == oid) {
            return WireType::Array(element);
        }
        WireType::Other(oid)
    }

    /// PostgreSQL type OID; `0` for arrays of unknown element types.
    pub fn oid(self) -> u32 {
        match self {
            WireType::Other(oid) => oid,
            WireType::Array(element) => ARRAYS
                .iter()
                .find(|(_, e)| e == element)
                .map_or(0, |(oid, _)| *oid),
            scalar => SCALARS
                .iter()
                .find(|(_, w, _)| *w == scalar)
                .map_or(0, |(oid, _, _)| *oid),
        }
    }

    /// Element type of an array wire type.
    pub fn array_element(self) -> Option<WireType> {
        match self {
            WireType::Array(element) => Some(*element),
            _ => None,
        }
    }

    /// Subtype of a built-in range wire type.
    pub fn range_subtype(self) -> Option<WireType> {
        match self {
            WireType::Int4Range => Some(WireType::Int4),
            WireType::Int8Range => Some(WireType::Int8),
            WireType::NumRange => Some(WireType::Numeric),
            WireType::TsRange => Some(WireType::Timestamp),
            WireType::TsTzRange => Some(WireType::TimestampTz),
            WireType::DateRange => Some(WireType::Date),
            _ => None,
        }
    }

    /// Host type that a reader of this column naturally produces.
    pub fn host_type(self) -> HostType {
        match self {
            WireType::Array(element) => HostType::Array(element.element_host()),
            other => *other.element_host(),
        }
    }

    fn element_host(self) -> &'static HostType {
        match self {
            WireType::Bool => &HostType::Bool,
            WireType::Int2 => &HostType::I16,
            WireType::Int4 => &HostType::I32,
            WireType::Int8 => &HostType::I64,
            WireType::Float4 => &HostType::F32,
            WireType::Float8 => &HostType::F64,
            WireType::Numeric | WireType::Money => &HostType::Decimal,
            WireType::Text
            | WireType::Varchar
            | WireType::Char
            | WireType::Name
            | WireType::Xml
            | WireType::Json
            | WireType::Jsonb => &HostType::String,
            WireType::Bytea => &HostType::Bytes,
            WireType::Uuid => &HostType::Uuid,
            WireType::Date => &HostType::Date,
            WireType::Time => &HostType::Time,
            WireType::TimeTz => &HostType::DateTimeOffset,
            WireType::Timestamp => &HostType::DateTime,
            WireType::TimestampTz => &HostType::DateTimeUtc,
            WireType::Interval => &HostType::Duration,
            WireType::Inet => &HostType::IpAddr,
            WireType::Cidr => &HostType::Inet,
            WireType::MacAddr | WireType::MacAddr8 => &HostType::MacAddr,
            WireType::Bit | WireType::Varbit => &HostType::BitString,
            WireType::Point => &HostType::Point,
            WireType::Line => &HostType::Line,
            WireType::LSeg => &HostType::LineSegment,
            WireType::Box => &HostType::GeoBox,
            WireType::Path => &HostType::Path,
            WireType::Polygon => &HostType::Polygon,
            WireType::Circle => &HostType::Circle,
            WireType::Int4Range => &HostType::Range(&HostType::I32),
            WireType::Int8Range => &HostType::Range(&HostType::I64),
            WireType::NumRange => &HostType::Range(&HostType::Decimal),
            WireType::TsRange => &HostType::Range(&HostType::DateTime),
            WireType::TsTzRange => &HostType::Range(&HostType::DateTimeUtc),
            WireType::DateRange => &HostType::Range(&HostType::Date),
            // Nested arrays and unknown types are carried as raw payloads.
            WireType::Array(_) | WireType::Other(_) => &HostType::Bytes,
        }
    }

    /// Check if this is one of the text-like types that share the text encoding.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            WireType::Text | WireType::Varchar | WireType::Char | WireType::Name | WireType::Xml
        )
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Array(element) => write!(f, "{}[]", element),
            WireType::Other(oid) => write!(f, "oid {}", oid),
            scalar => {
                let name = SCALARS
                    .iter()
                    .find(|(_, w, _)| w == scalar)
                    .map_or("unknown", |(_, _, name)| name);
                f.write_str(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_lookup_both_ways() {
        assert_eq!(WireType::from_oid(23), WireType::Int4);
        assert_eq!(WireType::Int4.oid(), 23);
        assert_eq!(WireType::from_oid(1007), WireType::Array(&WireType::Int4));
        assert_eq!(WireType::Array(&WireType::Int4).oid(), 1007);
        assert_eq!(WireType::from_oid(3910), WireType::TsTzRange);
        assert_eq!(WireType::from_oid(99999), WireType::Other(99999));
        assert_eq!(WireType::Other(99999).oid(), 99999);
    }

    #[test]
    fn test_every_scalar_has_an_array_oid() {
        for (_, wire, _) in SCALARS {
            let array = WireType::Array(wire);
            assert_ne!(array.oid(), 0, "missing array oid for {}", wire);
            assert_eq!(WireType::from_oid(array.oid()), array);
        }
    }

    #[test]
    fn test_declared_host_types() {
        assert_eq!(WireType::Timestamp.host_type(), HostType::DateTime);
        assert_eq!(WireType::TimestampTz.host_type(), HostType::DateTimeUtc);
        assert_eq!(WireType::TimeTz.host_type(), HostType::DateTimeOffset);
        assert_eq!(WireType::Interval.host_type(), HostType::Duration);
        assert_eq!(
            WireType::Array(&WireType::Text).host_type(),
            HostType::Array(&HostType::String)
        );
        assert_eq!(
            WireType::DateRange.host_type(),
            HostType::Range(&HostType::Date)
        );
        assert_eq!(
            WireType::Array(&WireType::Int8Range).host_type(),
            HostType::Array(&HostType::Range(&HostType::I64))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(WireType::TimestampTz.to_string(), "timestamptz");
        assert_eq!(WireType::Array(&WireType::Uuid).to_string(), "uuid[]");
        assert_eq!(WireType::Other(42).to_string(), "oid 42");
    }
}
