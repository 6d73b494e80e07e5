//! Culture-invariant scalar conversion between host types.
//!
//! Conversions are checked: overflow, unparseable strings and NaN/infinite
//! floats are errors. Float to integer conversions round half to even.

use std::borrow::Cow;

use chrono::{NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::temporal::{local_to_utc, parse_datetime};
use crate::core::{HostType, HostValue};
use crate::error::{BulkCopyError, Result};

/// Host types the convert tier can produce.
pub const CONVERTIBLE_TARGETS: &[HostType] = &[
    HostType::Bool,
    HostType::I8,
    HostType::I16,
    HostType::I32,
    HostType::I64,
    HostType::U8,
    HostType::U16,
    HostType::U32,
    HostType::U64,
    HostType::F32,
    HostType::F64,
    HostType::Decimal,
    HostType::Char,
    HostType::String,
    HostType::Uuid,
    HostType::DateTime,
    HostType::DateTimeUtc,
    HostType::Date,
];

fn is_numeric(t: HostType) -> bool {
    matches!(
        t,
        HostType::Bool
            | HostType::I8
            | HostType::I16
            | HostType::I32
            | HostType::I64
            | HostType::U8
            | HostType::U16
            | HostType::U32
            | HostType::U64
            | HostType::F32
            | HostType::F64
            | HostType::Decimal
    )
}

fn is_integer(t: HostType) -> bool {
    matches!(
        t,
        HostType::I8
            | HostType::I16
            | HostType::I32
            | HostType::I64
            | HostType::U8
            | HostType::U16
            | HostType::U32
            | HostType::U64
    )
}

fn is_temporal(t: HostType) -> bool {
    matches!(
        t,
        HostType::Date
            | HostType::DateTime
            | HostType::DateTimeUtc
            | HostType::DateTimeLocal
            | HostType::DateTimeOffset
    )
}

/// Check whether values of `source` can ever convert to `target`.
///
/// Used at resolution time so impossible pairs fail before any row is
/// written; individual values may still fail at write time.
pub fn can_convert(source: HostType, target: HostType) -> bool {
    if source == target {
        return true;
    }
    match target {
        HostType::String => !matches!(
            source,
            HostType::Custom(_) | HostType::Array(_) | HostType::Range(_) | HostType::Optional(_)
        ),
        _ if source == HostType::String => CONVERTIBLE_TARGETS.contains(&target),
        HostType::Char => is_integer(source),
        t if is_numeric(t) => is_numeric(source) || (is_integer(t) && source == HostType::Char),
        HostType::DateTime | HostType::DateTimeUtc | HostType::Date => is_temporal(source),
        _ => false,
    }
}

fn failed(value: &HostValue, target: HostType) -> BulkCopyError {
    BulkCopyError::Conversion(format!(
        "cannot convert {} value to {}",
        value.type_name(),
        target
    ))
}

/// Exact integer value of an integer, bool or char host value.
fn as_i128(value: &HostValue) -> Option<i128> {
    Some(match value {
        HostValue::Bool(b) => i128::from(*b),
        HostValue::I8(v) => i128::from(*v),
        HostValue::I16(v) => i128::from(*v),
        HostValue::I32(v) => i128::from(*v),
        HostValue::I64(v) => i128::from(*v),
        HostValue::U8(v) => i128::from(*v),
        HostValue::U16(v) => i128::from(*v),
        HostValue::U32(v) => i128::from(*v),
        HostValue::U64(v) => i128::from(*v),
        HostValue::Char(c) => i128::from(u32::from(*c)),
        _ => return None,
    })
}

/// Integer value of any numeric host value; fractions round half to even.
fn to_integer(value: &HostValue, target: HostType) -> Result<i128> {
    if let Some(i) = as_i128(value) {
        return Ok(i);
    }
    let overflow = || {
        BulkCopyError::Conversion(format!(
            "{} value is out of range for {}",
            value.type_name(),
            target
        ))
    };
    match value {
        HostValue::F32(f) => float_to_integer(f64::from(*f)).ok_or_else(overflow),
        HostValue::F64(f) => float_to_integer(*f).ok_or_else(overflow),
        HostValue::Decimal(d) => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i128()
            .ok_or_else(overflow),
        HostValue::String(s) => s.trim().parse::<i128>().map_err(|_| {
            BulkCopyError::Conversion(format!("{:?} is not a valid {}", s, target))
        }),
        other => Err(failed(other, target)),
    }
}

fn float_to_integer(f: f64) -> Option<i128> {
    if !f.is_finite() {
        return None;
    }
    let rounded = f.round_ties_even();
    // i128 covers every u64 and i64, so anything outside is overflow anyway.
    if rounded.abs() >= 1.7e38 {
        return None;
    }
    Some(rounded as i128)
}

fn to_f64(value: &HostValue, target: HostType) -> Result<f64> {
    if let Some(i) = as_i128(value) {
        return Ok(i as f64);
    }
    match value {
        HostValue::F32(f) => Ok(f64::from(*f)),
        HostValue::F64(f) => Ok(*f),
        HostValue::Decimal(d) => d.to_f64().ok_or_else(|| failed(value, target)),
        HostValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| BulkCopyError::Conversion(format!("{:?} is not a valid {}", s, target))),
        other => Err(failed(other, target)),
    }
}

fn to_decimal(value: &HostValue, target: HostType) -> Result<Decimal> {
    if let Some(i) = as_i128(value) {
        return Decimal::from_i128(i).ok_or_else(|| failed(value, target));
    }
    match value {
        HostValue::Decimal(d) => Ok(*d),
        HostValue::F32(f) => Decimal::from_f32(*f).ok_or_else(|| failed(value, target)),
        HostValue::F64(f) => Decimal::from_f64(*f).ok_or_else(|| failed(value, target)),
        HostValue::String(s) => {
            let s = s.trim();
            s.parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| {
                    BulkCopyError::Conversion(format!("{:?} is not a valid {}", s, target))
                })
        }
        other => Err(failed(other, target)),
    }
}

fn to_bool(value: &HostValue, target: HostType) -> Result<bool> {
    if let Some(i) = as_i128(value) {
        return Ok(i != 0);
    }
    match value {
        HostValue::F32(f) => Ok(*f != 0.0),
        HostValue::F64(f) => Ok(*f != 0.0),
        HostValue::Decimal(d) => Ok(!d.is_zero()),
        HostValue::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(BulkCopyError::Conversion(format!(
                    "{:?} is not a valid {}",
                    s, target
                )))
            }
        }
        other => Err(failed(other, target)),
    }
}

/// Invariant text form of a host value.
pub fn to_invariant_string(value: &HostValue) -> Result<String> {
    Ok(match value {
        HostValue::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        HostValue::I8(v) => v.to_string(),
        HostValue::I16(v) => v.to_string(),
        HostValue::I32(v) => v.to_string(),
        HostValue::I64(v) => v.to_string(),
        HostValue::U8(v) => v.to_string(),
        HostValue::U16(v) => v.to_string(),
        HostValue::U32(v) => v.to_string(),
        HostValue::U64(v) => v.to_string(),
        HostValue::F32(v) => v.to_string(),
        HostValue::F64(v) => v.to_string(),
        HostValue::Decimal(v) => v.to_string(),
        HostValue::Char(c) => c.to_string(),
        HostValue::String(s) => s.clone(),
        HostValue::Bytes(b) => String::from_utf8(b.clone())
            .map_err(|_| BulkCopyError::Conversion("bytes are not valid UTF-8".into()))?,
        HostValue::Uuid(u) => u.to_string(),
        HostValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        HostValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        HostValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        HostValue::DateTimeUtc(dt) => dt.to_rfc3339(),
        HostValue::DateTimeLocal(dt) => dt.to_rfc3339(),
        HostValue::DateTimeOffset(dt) => dt.to_rfc3339(),
        HostValue::Duration(d) => d.to_string(),
        HostValue::Json(j) => j.to_string(),
        HostValue::IpAddr(a) => a.to_string(),
        HostValue::Inet(n) => n.to_string(),
        HostValue::MacAddr(m) => m.to_string(),
        HostValue::BitString(b) => b.to_string(),
        other => return Err(failed(other, HostType::String)),
    })
}

fn to_naive(value: &HostValue, target: HostType) -> Result<NaiveDateTime> {
    Ok(match value {
        HostValue::DateTime(dt) => *dt,
        HostValue::DateTimeUtc(dt) => dt.naive_utc(),
        HostValue::DateTimeLocal(dt) => dt.naive_local(),
        HostValue::DateTimeOffset(dt) => dt.naive_local(),
        HostValue::Date(d) => d.and_time(NaiveTime::MIN),
        HostValue::String(s) => parse_datetime(s)?.wall_clock(),
        other => return Err(failed(other, target)),
    })
}

fn integer_value(i: i128, target: HostType, value: &HostValue) -> Result<HostValue> {
    let overflow = || {
        BulkCopyError::Conversion(format!(
            "{} value {} is out of range for {}",
            value.type_name(),
            i,
            target
        ))
    };
    Ok(match target {
        HostType::I8 => HostValue::I8(i8::try_from(i).map_err(|_| overflow())?),
        HostType::I16 => HostValue::I16(i16::try_from(i).map_err(|_| overflow())?),
        HostType::I32 => HostValue::I32(i32::try_from(i).map_err(|_| overflow())?),
        HostType::I64 => HostValue::I64(i64::try_from(i).map_err(|_| overflow())?),
        HostType::U8 => HostValue::U8(u8::try_from(i).map_err(|_| overflow())?),
        HostType::U16 => HostValue::U16(u16::try_from(i).map_err(|_| overflow())?),
        HostType::U32 => HostValue::U32(u32::try_from(i).map_err(|_| overflow())?),
        HostType::U64 => HostValue::U64(u64::try_from(i).map_err(|_| overflow())?),
        HostType::Char => u32::try_from(i)
            .ok()
            .and_then(char::from_u32)
            .map(HostValue::Char)
            .ok_or_else(overflow)?,
        _ => return Err(failed(value, target)),
    })
}

/// Convert `value` to `target`, borrowing when it already has that type.
pub fn change_type(value: &HostValue, target: HostType) -> Result<Cow<'_, HostValue>> {
    if value.host_type() == Some(target) {
        return Ok(Cow::Borrowed(value));
    }
    let converted = match target {
        HostType::Bool => HostValue::Bool(to_bool(value, target)?),
        t if is_integer(t) => integer_value(to_integer(value, t)?, t, value)?,
        HostType::Char => match value {
            HostValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => HostValue::Char(c),
                    _ => {
                        return Err(BulkCopyError::Conversion(format!(
                            "{:?} is not a single character",
                            s
                        )))
                    }
                }
            }
            other => integer_value(to_integer(other, target)?, target, other)?,
        },
        HostType::F32 => {
            let f = to_f64(value, target)?;
            let narrowed = f as f32;
            if f.is_finite() && !narrowed.is_finite() {
                return Err(BulkCopyError::Conversion(format!(
                    "{} is out of range for f32",
                    f
                )));
            }
            HostValue::F32(narrowed)
        }
        HostType::F64 => HostValue::F64(to_f64(value, target)?),
        HostType::Decimal => HostValue::Decimal(to_decimal(value, target)?),
        HostType::String => HostValue::String(to_invariant_string(value)?),
        HostType::Uuid => match value {
            HostValue::String(s) => HostValue::Uuid(Uuid::parse_str(s.trim()).map_err(|_| {
                BulkCopyError::Conversion(format!("{:?} is not a valid Uuid", s))
            })?),
            other => return Err(failed(other, target)),
        },
        HostType::DateTime => HostValue::DateTime(to_naive(value, target)?),
        HostType::Date => HostValue::Date(to_naive(value, target)?.date()),
        HostType::DateTimeUtc => HostValue::DateTimeUtc(match value {
            HostValue::DateTimeLocal(dt) => dt.with_timezone(&Utc),
            HostValue::DateTimeOffset(dt) => dt.with_timezone(&Utc),
            HostValue::String(s) => parse_datetime(s)?.to_utc()?,
            other => local_to_utc(to_naive(other, target)?)?,
        }),
        _ => return Err(failed(value, target)),
    };
    Ok(Cow::Owned(converted))
}
