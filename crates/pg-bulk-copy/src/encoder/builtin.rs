//! Built-in encoder tables.
//!
//! Built once per process on first use and never mutated afterwards.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::convert::{can_convert, change_type, CONVERTIBLE_TARGETS};
use super::{natural, network, temporal, Encoder, FnEncoder, Tier};
use crate::core::{HostType, HostValue, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

type EncodeFn = fn(&HostValue, WireType) -> Result<PgValue>;

const TEMPORAL_SOURCES: &[HostType] = &[
    HostType::Date,
    HostType::Time,
    HostType::DateTime,
    HostType::DateTimeUtc,
    HostType::DateTimeLocal,
    HostType::DateTimeOffset,
    HostType::String,
];

const ARRAY_ELEMENTS: &[HostType] = &[
    HostType::I16,
    HostType::I32,
    HostType::I64,
    HostType::F32,
    HostType::F64,
    HostType::Decimal,
    HostType::String,
    HostType::Bool,
    HostType::Uuid,
    HostType::DateTime,
    HostType::DateTimeUtc,
    HostType::Date,
    HostType::Bytes,
];

const RANGE_ELEMENTS: &[HostType] = &[
    HostType::I32,
    HostType::I64,
    HostType::Decimal,
    HostType::DateTime,
    HostType::DateTimeUtc,
    HostType::Date,
];

const GEOMETRY: &[(HostType, WireType)] = &[
    (HostType::Point, WireType::Point),
    (HostType::Line, WireType::Line),
    (HostType::LineSegment, WireType::LSeg),
    (HostType::GeoBox, WireType::Box),
    (HostType::Path, WireType::Path),
    (HostType::Polygon, WireType::Polygon),
    (HostType::Circle, WireType::Circle),
];

const SAME_TYPE: &[HostType] = &[
    HostType::Bytes,
    HostType::DateTimeOffset,
    HostType::Duration,
    HostType::Time,
    HostType::BitString,
    HostType::IpAddr,
    HostType::Inet,
    HostType::MacAddr,
    HostType::Json,
    HostType::Interval,
];

/// Encode one array element or range bound.
///
/// The semantic table wins; otherwise the value is converted to the element
/// wire type's host type and mapped naturally.
pub(crate) fn encode_element(value: &HostValue, wire: WireType) -> Result<PgValue> {
    if let Some(source) = value.host_type() {
        if let Some(encoder) = BUILTIN.semantic.get(&(wire, source)) {
            return encoder.encode(value, wire);
        }
    }
    let converted = change_type(value, wire.host_type())?;
    natural::to_wire(&converted, wire)
}

struct ArrayEncoder {
    name: String,
}

impl Encoder for ArrayEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        let (HostValue::Array(array), WireType::Array(element)) = (value, wire) else {
            return Err(BulkCopyError::Conversion(format!(
                "{} cannot encode {} as {}",
                self.name,
                value.type_name(),
                wire
            )));
        };
        let items = array
            .items
            .iter()
            .map(|item| match item {
                HostValue::Null => Ok(None),
                item => encode_element(item, *element).map(Some),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PgValue::Array(items))
    }
}

struct RangeEncoder {
    name: String,
}

impl Encoder for RangeEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        let (HostValue::Range(range), Some(subtype)) = (value, wire.range_subtype()) else {
            return Err(BulkCopyError::Conversion(format!(
                "{} cannot encode {} as {}",
                self.name,
                value.type_name(),
                wire
            )));
        };
        let mapped = range.range.clone().try_map(|bound| {
            if bound.is_null() {
                return Err(BulkCopyError::Conversion("range bound is null".into()));
            }
            encode_element(&bound, subtype)
        })?;
        Ok(PgValue::range(mapped))
    }
}

/// Writes a geometric value as its own type.
///
/// Columns of an unknown type (domains, extension types) get the value's own
/// binary payload. Any other known column type is rejected.
struct GeometryEncoder {
    name: String,
    own_wire: WireType,
}

impl Encoder for GeometryEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        match wire {
            w if w == self.own_wire => natural::to_wire(value, wire),
            WireType::Other(_) => natural::to_raw(value, self.own_wire),
            _ => Err(BulkCopyError::Conversion(format!(
                "{} cannot be written to a {} column",
                value.type_name(),
                wire
            ))),
        }
    }
}

impl GeometryEncoder {
    fn accepts(&self, wire: WireType) -> bool {
        wire == self.own_wire || matches!(wire, WireType::Other(_))
    }
}

struct ConvertEncoder {
    name: String,
    target: HostType,
}

impl Encoder for ConvertEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &HostValue, wire: WireType) -> Result<PgValue> {
        let converted = change_type(value, self.target)?;
        natural::to_wire(&converted, wire)
    }
}

pub(crate) struct BuiltinTables {
    semantic: HashMap<(WireType, HostType), Arc<dyn Encoder>>,
    arrays: HashMap<HostType, Arc<dyn Encoder>>,
    ranges: HashMap<HostType, Arc<dyn Encoder>>,
    geometry: HashMap<HostType, Arc<GeometryEncoder>>,
    same_type: HashMap<HostType, Arc<dyn Encoder>>,
    convert: HashMap<HostType, Arc<dyn Encoder>>,
}

pub(crate) static BUILTIN: LazyLock<BuiltinTables> = LazyLock::new(BuiltinTables::build);

impl BuiltinTables {
    fn build() -> Self {
        let mut semantic: HashMap<(WireType, HostType), Arc<dyn Encoder>> = HashMap::new();
        let mut add = |wire: WireType, sources: &[HostType], f: EncodeFn| {
            for &source in sources {
                let name = format!("{} from {}", wire, source);
                semantic.insert((wire, source), Arc::new(FnEncoder::new(name, f)));
            }
        };

        add(WireType::Date, TEMPORAL_SOURCES, temporal::to_date);
        add(WireType::Time, TEMPORAL_SOURCES, temporal::to_time);
        add(WireType::TimeTz, TEMPORAL_SOURCES, temporal::to_timetz);
        add(WireType::Timestamp, TEMPORAL_SOURCES, temporal::to_timestamp);
        add(WireType::TimestampTz, TEMPORAL_SOURCES, temporal::to_timestamptz);
        add(
            WireType::Interval,
            &[HostType::Interval, HostType::Duration, HostType::String],
            temporal::to_interval,
        );
        for wire in [WireType::Json, WireType::Jsonb] {
            add(wire, &[HostType::String, HostType::Json], network::to_json);
        }
        for wire in [WireType::Inet, WireType::Cidr] {
            add(
                wire,
                &[HostType::IpAddr, HostType::Inet, HostType::String],
                network::to_inet,
            );
        }
        for wire in [WireType::MacAddr, WireType::MacAddr8] {
            add(wire, &[HostType::MacAddr, HostType::String], network::to_macaddr);
        }
        for &(host, wire) in GEOMETRY {
            add(wire, &[host], natural::to_wire);
        }

        let arrays = ARRAY_ELEMENTS
            .iter()
            .map(|&element| {
                let encoder: Arc<dyn Encoder> = Arc::new(ArrayEncoder {
                    name: format!("array of {}", element),
                });
                (element, encoder)
            })
            .collect();

        let ranges = RANGE_ELEMENTS
            .iter()
            .map(|&element| {
                let encoder: Arc<dyn Encoder> = Arc::new(RangeEncoder {
                    name: format!("range of {}", element),
                });
                (element, encoder)
            })
            .collect();

        let geometry = GEOMETRY
            .iter()
            .map(|&(host, own_wire)| {
                let encoder = Arc::new(GeometryEncoder {
                    name: format!("{} as {}", host, own_wire),
                    own_wire,
                });
                (host, encoder)
            })
            .collect();

        let same_type = SAME_TYPE
            .iter()
            .map(|&host| {
                let encoder: Arc<dyn Encoder> =
                    Arc::new(FnEncoder::new(format!("{} passthrough", host), natural::to_wire));
                (host, encoder)
            })
            .collect();

        let convert = CONVERTIBLE_TARGETS
            .iter()
            .map(|&target| {
                let encoder: Arc<dyn Encoder> = Arc::new(ConvertEncoder {
                    name: format!("convert to {}", target),
                    target,
                });
                (target, encoder)
            })
            .collect();

        Self {
            semantic,
            arrays,
            ranges,
            geometry,
            same_type,
            convert,
        }
    }

    /// Walk the built-in tiers in order for an already unwrapped source type.
    pub(crate) fn lookup(
        &self,
        wire: WireType,
        declared: HostType,
        source: HostType,
    ) -> Option<(Arc<dyn Encoder>, Tier)> {
        if let Some(e) = self.semantic.get(&(wire, source)) {
            return Some((Arc::clone(e), Tier::Semantic));
        }
        if let (HostType::Array(element), WireType::Array(_)) = (source, wire) {
            if let Some(e) = self.arrays.get(element) {
                return Some((Arc::clone(e), Tier::Array));
            }
        }
        if let HostType::Range(element) = source {
            if wire.range_subtype().is_some() {
                if let Some(e) = self.ranges.get(element) {
                    return Some((Arc::clone(e), Tier::Range));
                }
            }
        }
        if let Some(e) = self.geometry.get(&source) {
            if e.accepts(wire) {
                let encoder: Arc<dyn Encoder> = e.clone();
                return Some((encoder, Tier::Geometry));
            }
        }
        if declared == source {
            if let Some(e) = self.same_type.get(&source) {
                return Some((Arc::clone(e), Tier::SameType));
            }
        }
        if can_convert(source, declared) {
            if let Some(e) = self.convert.get(&declared) {
                return Some((Arc::clone(e), Tier::Convert));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Inet, MacAddress, PgRange, Point};
    use crate::encoder::temporal::{local_offset, local_to_utc};
    use bytes::BytesMut;
    use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
    use std::net::IpAddr;
    use std::ops::Bound;

    fn tier_of(wire: WireType, source: HostType) -> Option<Tier> {
        BUILTIN
            .lookup(wire, wire.host_type(), source)
            .map(|(_, tier)| tier)
    }

    #[test]
    fn test_tier_order() {
        assert_eq!(tier_of(WireType::Timestamp, HostType::DateTime), Some(Tier::Semantic));
        assert_eq!(
            tier_of(WireType::Array(&WireType::Int4), HostType::Array(&HostType::I32)),
            Some(Tier::Array)
        );
        assert_eq!(
            tier_of(WireType::Int4Range, HostType::Range(&HostType::I32)),
            Some(Tier::Range)
        );
        assert_eq!(tier_of(WireType::Other(99_999), HostType::Point), Some(Tier::Geometry));
        assert_eq!(tier_of(WireType::Bytea, HostType::Bytes), Some(Tier::SameType));
        assert_eq!(tier_of(WireType::Int4, HostType::I64), Some(Tier::Convert));
        assert_eq!(tier_of(WireType::Int4, HostType::I32), Some(Tier::Convert));
        assert_eq!(tier_of(WireType::Interval, HostType::Uuid), None);
        assert_eq!(tier_of(WireType::Int4, HostType::Uuid), None);
    }

    #[test]
    fn test_array_elements_use_semantic_tier() {
        let (encoder, _) = BUILTIN
            .lookup(
                WireType::Array(&WireType::Jsonb),
                HostType::Array(&HostType::String),
                HostType::Array(&HostType::String),
            )
            .unwrap();
        let ok = HostValue::array(&HostType::String, vec!["{}".into(), HostValue::Null]);
        assert_eq!(
            encoder.encode(&ok, WireType::Array(&WireType::Jsonb)).unwrap(),
            PgValue::Array(vec![Some(PgValue::Json("{}".into())), None])
        );
        let bad = HostValue::array(&HostType::String, vec!["{".into()]);
        assert!(encoder.encode(&bad, WireType::Array(&WireType::Jsonb)).is_err());
    }

    #[test]
    fn test_array_elements_convert_to_element_type() {
        let (encoder, _) = BUILTIN
            .lookup(
                WireType::Array(&WireType::Int8),
                HostType::Array(&HostType::I64),
                HostType::Array(&HostType::I16),
            )
            .unwrap();
        let value = HostValue::array(&HostType::I16, vec![HostValue::I16(4)]);
        assert_eq!(
            encoder.encode(&value, WireType::Array(&WireType::Int8)).unwrap(),
            PgValue::Array(vec![Some(PgValue::Int8(4))])
        );
    }

    #[test]
    fn test_range_bounds_are_encoded() {
        let (encoder, _) = BUILTIN
            .lookup(
                WireType::Int8Range,
                HostType::Range(&HostType::I64),
                HostType::Range(&HostType::I32),
            )
            .unwrap();
        let value = HostValue::range(
            &HostType::I32,
            PgRange::new(Bound::Included(HostValue::I32(1)), Bound::Unbounded),
        );
        assert_eq!(
            encoder.encode(&value, WireType::Int8Range).unwrap(),
            PgValue::range(PgRange::new(Bound::Included(PgValue::Int8(1)), Bound::Unbounded))
        );
    }

    #[test]
    fn test_geometry_fallback_writes_own_type() {
        let (encoder, _) = BUILTIN
            .lookup(WireType::Other(70_000), WireType::Other(70_000).host_type(), HostType::Point)
            .unwrap();
        let encoded = encoder
            .encode(&HostValue::Point(Point::new(1.0, 2.0)), WireType::Other(70_000))
            .unwrap();
        assert!(matches!(encoded, PgValue::Raw(ref b) if b.len() == 16));
    }

    #[test]
    fn test_geometry_is_not_written_into_other_known_columns() {
        assert!(BUILTIN
            .lookup(WireType::Bytea, HostType::Bytes, HostType::Point)
            .is_none());
        assert!(BUILTIN
            .lookup(WireType::Float8, HostType::F64, HostType::Circle)
            .is_none());

        let encoder = GeometryEncoder {
            name: "Point as point".into(),
            own_wire: WireType::Point,
        };
        let point = HostValue::Point(Point::new(1.0, 2.0));
        assert!(encoder.encode(&point, WireType::Bytea).is_err());
        assert!(encoder.encode(&point, WireType::Text).is_err());
        assert_eq!(
            encoder.encode(&point, WireType::Point).unwrap(),
            PgValue::Point(Point::new(1.0, 2.0))
        );
    }

    #[test]
    fn test_json_columns_take_converted_strings() {
        let (encoder, tier) = BUILTIN
            .lookup(WireType::Jsonb, HostType::String, HostType::I32)
            .unwrap();
        assert_eq!(tier, Tier::Convert);
        assert_eq!(
            encoder.encode(&HostValue::I32(5), WireType::Jsonb).unwrap(),
            PgValue::Json("5".into())
        );
        let (encoder, _) = BUILTIN
            .lookup(WireType::Json, HostType::String, HostType::Bool)
            .unwrap();
        assert_eq!(
            encoder.encode(&HostValue::Bool(true), WireType::Json).unwrap(),
            PgValue::Json("true".into())
        );
    }

    fn encode_semantic(wire: WireType, value: HostValue) -> Result<PgValue> {
        let source = value.host_type().unwrap();
        let (encoder, tier) = BUILTIN.lookup(wire, wire.host_type(), source).unwrap();
        assert_eq!(tier, Tier::Semantic, "{} from {}", wire, source);
        encoder.encode(&value, wire)
    }

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_timetz_pairs() {
        let t = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        let today = local_offset(&Local::now().date_naive().and_time(t));
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let dt = naive("2024-06-01 08:30:00");
        let offset_dt = east.from_local_datetime(&dt).single().unwrap();

        let cases = [
            (HostValue::from("08:30:00"), PgValue::TimeTz(t, today)),
            (HostValue::from("08:30:00+02:00"), PgValue::TimeTz(t, east)),
            (HostValue::from("2024-06-01 08:30:00"), PgValue::TimeTz(t, local_offset(&dt))),
            (HostValue::Time(t), PgValue::TimeTz(t, today)),
            (HostValue::DateTime(dt), PgValue::TimeTz(t, local_offset(&dt))),
            (HostValue::DateTimeOffset(offset_dt), PgValue::TimeTz(t, east)),
            (HostValue::DateTimeUtc(dt.and_utc()), PgValue::TimeTz(t, utc)),
        ];
        for (value, expected) in cases {
            let label = format!("{:?}", value);
            assert_eq!(encode_semantic(WireType::TimeTz, value).unwrap(), expected, "{}", label);
        }
    }

    #[test]
    fn test_date_pairs() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let dt = naive("2024-06-01 23:30:00");
        let west = FixedOffset::west_opt(2 * 3600).unwrap();
        let local = dt.and_utc().with_timezone(&Local);

        let cases = [
            (HostValue::Date(day), day),
            (HostValue::DateTime(dt), day),
            (HostValue::DateTimeUtc(dt.and_utc()), day),
            // Wall clock at its own offset, not the UTC date (2024-06-02).
            (HostValue::DateTimeOffset(west.from_local_datetime(&dt).single().unwrap()), day),
            (HostValue::DateTimeLocal(local), local.date_naive()),
            (HostValue::from("2024-06-01T23:30:00-02:00"), day),
            (HostValue::from("2024-06-01"), day),
        ];
        for (value, expected) in cases {
            let label = format!("{:?}", value);
            assert_eq!(
                encode_semantic(WireType::Date, value).unwrap(),
                PgValue::Date(expected),
                "{}",
                label
            );
        }
    }

    #[test]
    fn test_timestamptz_pairs() {
        let dt = naive("2024-06-01 09:00:00");
        let day = dt.date();
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let utc_seven = naive("2024-06-01 07:00:00").and_utc();

        let cases = [
            (HostValue::DateTime(dt), local_to_utc(dt).unwrap()),
            (HostValue::Date(day), local_to_utc(day.and_time(NaiveTime::MIN)).unwrap()),
            (HostValue::from("2024-06-01 09:00:00"), local_to_utc(dt).unwrap()),
            (HostValue::from("2024-06-01T09:00:00+02:00"), utc_seven),
            (HostValue::DateTimeUtc(utc_seven), utc_seven),
            (
                HostValue::DateTimeOffset(east.from_local_datetime(&dt).single().unwrap()),
                utc_seven,
            ),
        ];
        for (value, expected) in cases {
            let label = format!("{:?}", value);
            assert_eq!(
                encode_semantic(WireType::TimestampTz, value).unwrap(),
                PgValue::TimestampTz(expected),
                "{}",
                label
            );
        }
    }

    #[test]
    fn test_network_pairs() {
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        let cases = [
            (WireType::Inet, HostValue::from("10.1.2.3/8"), "10.1.2.3/8"),
            (WireType::Inet, HostValue::IpAddr(addr), "10.1.2.3/32"),
            (WireType::Inet, HostValue::from(" 2001:db8::1 "), "2001:db8::1/128"),
            (WireType::Cidr, HostValue::from("10.0.0.0/8"), "10.0.0.0/8"),
        ];
        for (wire, value, expected) in cases {
            let expected: Inet = expected.parse().unwrap();
            assert_eq!(encode_semantic(wire, value).unwrap(), PgValue::Inet(expected));
        }
        assert!(encode_semantic(WireType::Inet, "10.1.2/8".into()).is_err());

        let eui48 = MacAddress::Eui48([0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]);
        let eui64 = MacAddress::Eui64([0x08, 0x00, 0x2b, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let cases = [
            (WireType::MacAddr, "08:00:2b:01:02:03", eui48),
            (WireType::MacAddr, "08-00-2B-01-02-03", eui48),
            (WireType::MacAddr, "0800.2b01.0203", eui48),
            (WireType::MacAddr8, "08002b0102030405", eui64),
            (WireType::MacAddr8, "08:00:2b:01:02:03", eui48),
        ];
        for (wire, text, expected) in cases {
            assert_eq!(encode_semantic(wire, text.into()).unwrap(), PgValue::MacAddr(expected));
        }
    }

    #[test]
    fn test_cidr_rejects_host_bits_when_written() {
        let encoded = encode_semantic(WireType::Cidr, "10.1.2.3/8".into()).unwrap();
        let mut buf = BytesMut::new();
        let err = crate::codec::encode(&mut buf, &encoded, WireType::Cidr).unwrap_err();
        assert!(err.to_string().contains("right of mask"), "{}", err);

        let mut buf = BytesMut::new();
        assert!(crate::codec::encode(&mut buf, &encoded, WireType::Inet).is_ok());
    }
}
