//! Natural mapping of host values onto wire types.
//!
//! This is the last step of the convert tier and of user converters: the
//! value already has the right host shape and only needs the protocol
//! representation of the destination wire type.

use bytes::BytesMut;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{network, temporal};
use crate::codec;
use crate::core::{HostValue, Inet, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

fn unsupported(value: &HostValue, wire: WireType) -> BulkCopyError {
    BulkCopyError::Conversion(format!(
        "no natural mapping from {} to {}",
        value.type_name(),
        wire
    ))
}

fn out_of_range(value: &HostValue, wire: WireType) -> BulkCopyError {
    BulkCopyError::Conversion(format!(
        "{} value {:?} is out of range for {}",
        value.type_name(),
        value,
        wire
    ))
}

fn integer(value: &HostValue) -> Option<i128> {
    Some(match value {
        HostValue::I8(v) => i128::from(*v),
        HostValue::I16(v) => i128::from(*v),
        HostValue::I32(v) => i128::from(*v),
        HostValue::I64(v) => i128::from(*v),
        HostValue::U8(v) => i128::from(*v),
        HostValue::U16(v) => i128::from(*v),
        HostValue::U32(v) => i128::from(*v),
        HostValue::U64(v) => i128::from(*v),
        _ => return None,
    })
}

fn money_cents(d: Decimal) -> Option<i64> {
    d.checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
}

fn from_integer(i: i128, value: &HostValue, wire: WireType) -> Result<PgValue> {
    let overflow = || out_of_range(value, wire);
    Ok(match wire {
        WireType::Int2 => PgValue::Int2(i16::try_from(i).map_err(|_| overflow())?),
        WireType::Int4 => PgValue::Int4(i32::try_from(i).map_err(|_| overflow())?),
        WireType::Int8 => PgValue::Int8(i64::try_from(i).map_err(|_| overflow())?),
        WireType::Float4 => PgValue::Float4(i as f32),
        WireType::Float8 => PgValue::Float8(i as f64),
        WireType::Numeric => PgValue::Numeric(Decimal::from_i128(i).ok_or_else(overflow)?),
        WireType::Money => PgValue::Money(
            Decimal::from_i128(i)
                .and_then(money_cents)
                .ok_or_else(overflow)?,
        ),
        w if w.is_text() => PgValue::Text(i.to_string()),
        _ => return Err(unsupported(value, wire)),
    })
}

fn from_float(f: f64, value: &HostValue, wire: WireType) -> Result<PgValue> {
    Ok(match wire {
        WireType::Float8 => PgValue::Float8(f),
        WireType::Numeric => PgValue::Numeric(
            Decimal::from_f64(f).ok_or_else(|| out_of_range(value, wire))?,
        ),
        _ => return Err(unsupported(value, wire)),
    })
}

/// Map a host value onto `wire` without any type conversion.
///
/// Arrays and ranges are mapped element by element.
pub fn to_wire(value: &HostValue, wire: WireType) -> Result<PgValue> {
    if let Some(i) = integer(value) {
        return from_integer(i, value, wire);
    }
    Ok(match (value, wire) {
        (HostValue::Null, _) => {
            return Err(BulkCopyError::Conversion(format!(
                "null has no {} representation",
                wire
            )))
        }
        (HostValue::Bool(b), WireType::Bool) => PgValue::Bool(*b),
        (HostValue::F32(f), WireType::Float4) => PgValue::Float4(*f),
        (HostValue::F32(f), _) => return from_float(f64::from(*f), value, wire),
        (HostValue::F64(f), _) => return from_float(*f, value, wire),
        (HostValue::Decimal(d), WireType::Numeric) => PgValue::Numeric(*d),
        (HostValue::Decimal(d), WireType::Money) => {
            PgValue::Money(money_cents(*d).ok_or_else(|| out_of_range(value, wire))?)
        }
        (HostValue::Char(c), w) if w.is_text() => PgValue::Text(c.to_string()),
        (HostValue::String(s), w) if w.is_text() => PgValue::Text(s.clone()),
        (HostValue::String(_), WireType::Json | WireType::Jsonb) => {
            return network::to_json(value, wire)
        }
        (HostValue::Bytes(b), WireType::Bytea) => PgValue::Bytea(b.clone()),
        (HostValue::Bytes(b), WireType::Other(_)) => PgValue::Raw(b.clone()),
        (HostValue::Uuid(u), WireType::Uuid) => PgValue::Uuid(*u),
        (
            HostValue::Date(_)
            | HostValue::Time(_)
            | HostValue::DateTime(_)
            | HostValue::DateTimeUtc(_)
            | HostValue::DateTimeLocal(_)
            | HostValue::DateTimeOffset(_),
            _,
        ) => match wire {
            WireType::Date => return temporal::to_date(value, wire),
            WireType::Time => return temporal::to_time(value, wire),
            WireType::TimeTz => return temporal::to_timetz(value, wire),
            WireType::Timestamp => return temporal::to_timestamp(value, wire),
            WireType::TimestampTz => return temporal::to_timestamptz(value, wire),
            _ => return Err(unsupported(value, wire)),
        },
        (HostValue::Duration(_) | HostValue::Interval(_), WireType::Interval) => {
            return temporal::to_interval(value, wire)
        }
        (HostValue::Json(j), WireType::Json | WireType::Jsonb) => PgValue::Json(j.to_string()),
        (HostValue::IpAddr(a), WireType::Inet | WireType::Cidr) => {
            PgValue::Inet(Inet::host(*a))
        }
        (HostValue::Inet(n), WireType::Inet | WireType::Cidr) => PgValue::Inet(*n),
        (HostValue::MacAddr(m), WireType::MacAddr | WireType::MacAddr8) => PgValue::MacAddr(*m),
        (HostValue::BitString(b), WireType::Bit | WireType::Varbit) => PgValue::Bits(b.clone()),
        (HostValue::Point(p), WireType::Point) => PgValue::Point(*p),
        (HostValue::Line(l), WireType::Line) => PgValue::Line(*l),
        (HostValue::LineSegment(s), WireType::LSeg) => PgValue::LineSegment(*s),
        (HostValue::GeoBox(b), WireType::Box) => PgValue::Box(*b),
        (HostValue::Path(p), WireType::Path) => PgValue::Path(p.clone()),
        (HostValue::Polygon(p), WireType::Polygon) => PgValue::Polygon(p.clone()),
        (HostValue::Circle(c), WireType::Circle) => PgValue::Circle(*c),
        (HostValue::Array(array), WireType::Array(element)) => PgValue::Array(
            array
                .items
                .iter()
                .map(|item| match item {
                    HostValue::Null => Ok(None),
                    item => to_wire(item, *element).map(Some),
                })
                .collect::<Result<_>>()?,
        ),
        (HostValue::Range(range), w) => match w.range_subtype() {
            Some(subtype) => PgValue::range(range.range.clone().try_map(|bound| {
                if bound.is_null() {
                    return Err(BulkCopyError::Conversion("range bound is null".into()));
                }
                to_wire(&bound, subtype)
            })?),
            None => return Err(unsupported(value, wire)),
        },
        _ => return Err(unsupported(value, wire)),
    })
}

/// Encode `value` as `wire` into an opaque payload.
///
/// Used where the destination column type is not the value's own wire type,
/// e.g. a domain over a geometric type.
pub fn to_raw(value: &HostValue, own_wire: WireType) -> Result<PgValue> {
    let pg = to_wire(value, own_wire)?;
    let mut buf = BytesMut::new();
    codec::encode(&mut buf, &pg, own_wire)?;
    // Drop the length prefix; the session writes its own.
    Ok(PgValue::Raw(buf.split_off(4).to_vec()))
}
