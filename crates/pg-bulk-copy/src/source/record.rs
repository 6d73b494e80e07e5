//! Tabular view over a slice of `Serialize` records.
//!
//! Each record is serialized into a JSON object once per row and the declared
//! fields are looked up by name. JSON scalars are then coerced to the
//! declared host type, so a `chrono` field serialized as an RFC 3339 string
//! comes back as a date-time and a `Vec<u8>` comes back as bytes.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::core::{BitString, HostType, HostValue, Inet, MacAddress, TabularSource};
use crate::encoder::convert::change_type;
use crate::encoder::temporal::{parse_datetime, parse_interval, parse_time};
use crate::error::{BulkCopyError, Result};

/// A declared record field: its serialized name and the host type to read it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub name: String,
    pub host_type: HostType,
}

impl RecordField {
    pub fn new(name: impl Into<String>, host_type: HostType) -> Self {
        Self {
            name: name.into(),
            host_type,
        }
    }
}

/// Sequential reader over serializable records.
pub struct RecordSource<'a, T> {
    fields: Vec<RecordField>,
    records: &'a [T],
    next: usize,
    current: Option<Map<String, Value>>,
}

impl<'a, T: Serialize + Sync> RecordSource<'a, T> {
    pub fn new(fields: Vec<RecordField>, records: &'a [T]) -> Self {
        Self {
            fields,
            records,
            next: 0,
            current: None,
        }
    }
}

#[async_trait]
impl<T: Serialize + Sync> TabularSource for RecordSource<'_, T> {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.name.as_str())
    }

    fn host_type_of(&self, index: usize) -> Option<HostType> {
        self.fields.get(index).map(|f| f.host_type)
    }

    async fn advance(&mut self) -> Result<bool> {
        let Some(record) = self.records.get(self.next) else {
            self.current = None;
            return Ok(false);
        };
        self.next += 1;
        match serde_json::to_value(record)? {
            Value::Object(map) => {
                self.current = Some(map);
                Ok(true)
            }
            other => Err(BulkCopyError::Conversion(format!(
                "record {} did not serialize to an object: {}",
                self.next - 1,
                other
            ))),
        }
    }

    fn read_row(&mut self, values: &mut [HostValue]) -> Result<()> {
        let map = self
            .current
            .as_mut()
            .ok_or_else(|| BulkCopyError::Protocol("no current record".into()))?;
        for (slot, field) in values.iter_mut().zip(&self.fields) {
            *slot = match map.remove(&field.name) {
                Some(value) => coerce(value, field.host_type).map_err(|e| {
                    BulkCopyError::Conversion(format!("field {}: {}", field.name, e))
                })?,
                None => HostValue::Null,
            };
        }
        Ok(())
    }
}

fn mismatch(value: &Value, target: HostType) -> BulkCopyError {
    BulkCopyError::Conversion(format!("cannot read {} as {}", value, target))
}

fn number_value(n: &Number) -> HostValue {
    if let Some(i) = n.as_i64() {
        HostValue::I64(i)
    } else if let Some(u) = n.as_u64() {
        HostValue::U64(u)
    } else {
        HostValue::F64(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn duration_from_str(s: &str) -> Result<TimeDelta> {
    let interval = parse_interval(s)?;
    if interval.months != 0 {
        return Err(BulkCopyError::Conversion(format!(
            "interval {:?} has a month component and is not a fixed duration",
            s
        )));
    }
    Ok(TimeDelta::days(i64::from(interval.days))
        + TimeDelta::microseconds(interval.microseconds))
}

fn coerce_str(s: String, target: HostType) -> Result<HostValue> {
    let parse_err = |e: &dyn std::fmt::Display| {
        BulkCopyError::Conversion(format!("cannot read {:?} as {}: {}", s, target, e))
    };
    Ok(match target {
        HostType::String => HostValue::String(s),
        HostType::Time => HostValue::Time(parse_time(&s)?),
        HostType::Date => match NaiveDate::from_str(s.trim()) {
            Ok(d) => HostValue::Date(d),
            Err(_) => HostValue::Date(parse_datetime(&s)?.wall_clock().date()),
        },
        HostType::DateTimeLocal => {
            HostValue::DateTimeLocal(parse_datetime(&s)?.to_utc()?.with_timezone(&Local))
        }
        HostType::DateTimeOffset => HostValue::DateTimeOffset(
            DateTime::parse_from_rfc3339(s.trim()).map_err(|e| parse_err(&e))?,
        ),
        HostType::Interval => HostValue::Interval(parse_interval(&s)?),
        HostType::Duration => HostValue::Duration(duration_from_str(&s)?),
        HostType::IpAddr => HostValue::IpAddr(s.trim().parse().map_err(|e| parse_err(&e))?),
        HostType::Inet => HostValue::Inet(s.parse::<Inet>()?),
        HostType::MacAddr => HostValue::MacAddr(s.parse::<MacAddress>()?),
        HostType::BitString => HostValue::BitString(s.parse::<BitString>()?),
        HostType::Decimal => HostValue::Decimal(
            Decimal::from_str(s.trim())
                .or_else(|_| Decimal::from_scientific(s.trim()))
                .map_err(|e| parse_err(&e))?,
        ),
        other => change_type(&HostValue::String(s), other)?.into_owned(),
    })
}

/// Coerce one serialized field value to `declared`.
fn coerce(value: Value, declared: HostType) -> Result<HostValue> {
    let target = declared.without_optional();
    if target == HostType::Json {
        return Ok(match value {
            Value::Null => HostValue::Null,
            other => HostValue::Json(other),
        });
    }
    match value {
        Value::Null => Ok(HostValue::Null),
        Value::Bool(b) => Ok(change_type(&HostValue::Bool(b), target)?.into_owned()),
        Value::Number(n) => match target {
            // Go through the decimal text to keep every written digit.
            HostType::Decimal => coerce_str(n.to_string(), target),
            _ => Ok(change_type(&number_value(&n), target)?.into_owned()),
        },
        Value::String(s) => coerce_str(s, target),
        Value::Array(items) => match target {
            HostType::Bytes => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| mismatch(item, HostType::U8))
                })
                .collect::<Result<Vec<u8>>>()
                .map(HostValue::Bytes),
            HostType::Array(element) => items
                .into_iter()
                .map(|item| coerce(item, *element))
                .collect::<Result<Vec<_>>>()
                .map(|items| HostValue::array(element, items)),
            _ => Err(mismatch(&Value::Array(items), target)),
        },
        other => Err(mismatch(&other, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime, Utc};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Order {
        id: i32,
        customer: Option<String>,
        total: Decimal,
        placed_at: DateTime<Utc>,
        tags: Vec<String>,
        payload: Vec<u8>,
    }

    fn fields() -> Vec<RecordField> {
        vec![
            RecordField::new("id", HostType::I32),
            RecordField::new("customer", HostType::Optional(&HostType::String)),
            RecordField::new("total", HostType::Decimal),
            RecordField::new("placed_at", HostType::DateTimeUtc),
            RecordField::new("tags", HostType::Array(&HostType::String)),
            RecordField::new("payload", HostType::Bytes),
        ]
    }

    #[tokio::test]
    async fn test_reads_declared_types() {
        let placed_at = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
        )
        .and_utc();
        let orders = vec![Order {
            id: 7,
            customer: None,
            total: Decimal::new(1999, 2),
            placed_at,
            tags: vec!["rush".into()],
            payload: vec![1, 2, 255],
        }];
        let mut source = RecordSource::new(fields(), &orders);
        let mut values = vec![HostValue::Null; source.field_count()];

        assert!(source.advance().await.unwrap());
        source.read_row(&mut values).unwrap();
        assert!(matches!(values[0], HostValue::I32(7)));
        assert!(values[1].is_null());
        assert!(matches!(values[2], HostValue::Decimal(d) if d == Decimal::new(1999, 2)));
        assert!(matches!(values[3], HostValue::DateTimeUtc(t) if t == placed_at));
        match &values[4] {
            HostValue::Array(a) => {
                assert!(matches!(&a.items[..], [HostValue::String(s)] if s == "rush"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&values[5], HostValue::Bytes(b) if b == &[1, 2, 255]));
        assert!(!source.advance().await.unwrap());
    }

    #[test]
    fn test_coerce_strings() {
        assert!(matches!(
            coerce(Value::from("10:15:00"), HostType::Time).unwrap(),
            HostValue::Time(_)
        ));
        assert!(matches!(
            coerce(Value::from("10.0.0.1"), HostType::IpAddr).unwrap(),
            HostValue::IpAddr(_)
        ));
        assert!(matches!(
            coerce(Value::from("1 02:00:00"), HostType::Duration).unwrap(),
            HostValue::Duration(d) if d == TimeDelta::hours(26)
        ));
        assert!(coerce(Value::from("P1M"), HostType::Duration).is_err());
        assert!(coerce(Value::from("not a number"), HostType::I32).is_err());
    }

    #[test]
    fn test_coerce_json_keeps_document() {
        let doc = serde_json::json!({"a": [1, 2]});
        assert!(matches!(
            coerce(doc.clone(), HostType::Json).unwrap(),
            HostValue::Json(v) if v == doc
        ));
        assert!(coerce(doc, HostType::I64).is_err());
    }

    #[test]
    fn test_number_overflow_is_checked() {
        assert!(coerce(Value::from(300), HostType::U8).is_err());
        assert!(matches!(
            coerce(Value::from(2.5), HostType::I32).unwrap(),
            HostValue::I32(2)
        ));
    }
}
