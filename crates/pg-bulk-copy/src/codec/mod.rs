//! PostgreSQL binary wire format.
//!
//! [`encode`] writes one length-prefixed field for a [`PgValue`] and
//! [`decode`] reads a field payload back. [`copy`] builds and parses whole
//! `COPY ... (FORMAT BINARY)` streams on top of them.
//!
//! Binary format specification:
//! https://www.postgresql.org/docs/current/sql-copy.html#id-1.9.3.55.9.4.5

pub mod copy;
pub mod numeric;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Bound;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};

use crate::core::{
    BitString, Circle, GeoBox, Inet, Interval, Line, LineSegment, MacAddress, Path, PgRange,
    PgValue, Point, Polygon, WireType,
};
use crate::error::{BulkCopyError, Result};

pub use copy::{CopyParser, CopyWriter};
pub use numeric::{decode_numeric, encode_numeric};

/// 2000-01-01 00:00:00 UTC in Unix microseconds.
const PG_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// `num_days_from_ce()` of 2000-01-01.
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

const MICROS_PER_DAY: i64 = 86_400_000_000;

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Write a length-prefixed field for `value` as `wire`.
///
/// On error nothing is left behind in `buf`.
pub fn encode(buf: &mut BytesMut, value: &PgValue, wire: WireType) -> Result<()> {
    let start = buf.len();
    buf.put_i32(0); // length placeholder
    let result = encode_payload(buf, value, wire).and_then(|()| {
        i32::try_from(buf.len() - start - 4)
            .map_err(|_| BulkCopyError::Codec(format!("{} value exceeds 2 GiB", wire)))
    });
    match result {
        Ok(len) => {
            buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
            Ok(())
        }
        Err(e) => {
            buf.truncate(start);
            Err(e)
        }
    }
}

/// Write a NULL field.
pub fn encode_null(buf: &mut BytesMut) {
    buf.put_i32(-1);
}

fn mismatch(value: &PgValue, wire: WireType) -> BulkCopyError {
    BulkCopyError::Codec(format!("cannot encode {} value as {}", value.kind(), wire))
}

fn timestamp_micros(dt: chrono::NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros() - PG_EPOCH_MICROS
}

fn time_micros(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1_000_000
        + i64::from(t.nanosecond().min(999_999_999) / 1000)
}

fn put_point(buf: &mut BytesMut, p: &Point) {
    buf.put_f64(p.x);
    buf.put_f64(p.y);
}

fn put_points(buf: &mut BytesMut, points: &[Point], wire: WireType) -> Result<()> {
    let n = i32::try_from(points.len())
        .map_err(|_| BulkCopyError::Codec(format!("too many points for {}", wire)))?;
    buf.put_i32(n);
    for p in points {
        put_point(buf, p);
    }
    Ok(())
}

fn encode_payload(buf: &mut BytesMut, value: &PgValue, wire: WireType) -> Result<()> {
    match (value, wire) {
        (PgValue::Raw(bytes), _) => buf.put_slice(bytes),
        (PgValue::Bool(b), WireType::Bool) => buf.put_u8(u8::from(*b)),
        (PgValue::Int2(v), WireType::Int2) => buf.put_i16(*v),
        (PgValue::Int4(v), WireType::Int4) => buf.put_i32(*v),
        (PgValue::Int8(v), WireType::Int8) => buf.put_i64(*v),
        (PgValue::Float4(v), WireType::Float4) => buf.put_f32(*v),
        (PgValue::Float8(v), WireType::Float8) => buf.put_f64(*v),
        (PgValue::Numeric(d), WireType::Numeric) => encode_numeric(buf, d),
        (PgValue::Money(cents), WireType::Money) => buf.put_i64(*cents),
        (PgValue::Text(s), w) if w.is_text() => buf.put_slice(s.as_bytes()),
        (PgValue::Text(s) | PgValue::Json(s), WireType::Json) => buf.put_slice(s.as_bytes()),
        (PgValue::Text(s) | PgValue::Json(s), WireType::Jsonb) => {
            buf.put_u8(1); // jsonb format version
            buf.put_slice(s.as_bytes());
        }
        (PgValue::Bytea(b), WireType::Bytea) => buf.put_slice(b),
        (PgValue::Uuid(u), WireType::Uuid) => buf.put_slice(u.as_bytes()),
        (PgValue::Date(d), WireType::Date) => {
            buf.put_i32(d.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE);
        }
        (PgValue::Time(t), WireType::Time) => buf.put_i64(time_micros(*t)),
        (PgValue::TimeTz(t, offset), WireType::TimeTz) => {
            buf.put_i64(time_micros(*t));
            // Zone is stored in seconds west of UTC.
            buf.put_i32(-offset.local_minus_utc());
        }
        (PgValue::Timestamp(dt), WireType::Timestamp) => buf.put_i64(timestamp_micros(*dt)),
        (PgValue::TimestampTz(dt), WireType::TimestampTz) => {
            buf.put_i64(timestamp_micros(dt.naive_utc()));
        }
        (PgValue::Interval(iv), WireType::Interval) => {
            buf.put_i64(iv.microseconds);
            buf.put_i32(iv.days);
            buf.put_i32(iv.months);
        }
        (PgValue::Inet(net), WireType::Inet | WireType::Cidr) => {
            let is_cidr = wire == WireType::Cidr;
            if is_cidr && !net.is_network() {
                return Err(BulkCopyError::Codec(format!(
                    "{} has bits set to right of mask",
                    net
                )));
            }
            match net.addr() {
                IpAddr::V4(v4) => {
                    buf.put_u8(PGSQL_AF_INET);
                    buf.put_u8(net.netmask());
                    buf.put_u8(u8::from(is_cidr));
                    buf.put_u8(4);
                    buf.put_slice(&v4.octets());
                }
                IpAddr::V6(v6) => {
                    buf.put_u8(PGSQL_AF_INET6);
                    buf.put_u8(net.netmask());
                    buf.put_u8(u8::from(is_cidr));
                    buf.put_u8(16);
                    buf.put_slice(&v6.octets());
                }
            }
        }
        (PgValue::MacAddr(MacAddress::Eui48(b)), WireType::MacAddr) => buf.put_slice(b),
        (PgValue::MacAddr(mac), WireType::MacAddr8) => buf.put_slice(&mac.to_eui64()),
        (PgValue::Bits(bits), WireType::Bit | WireType::Varbit) => {
            let len = i32::try_from(bits.len())
                .map_err(|_| BulkCopyError::Codec("bit string too long".into()))?;
            buf.put_i32(len);
            buf.put_slice(&bits.to_bytes());
        }
        (PgValue::Point(p), WireType::Point) => put_point(buf, p),
        (PgValue::Line(l), WireType::Line) => {
            buf.put_f64(l.a);
            buf.put_f64(l.b);
            buf.put_f64(l.c);
        }
        (PgValue::LineSegment(s), WireType::LSeg) => {
            put_point(buf, &s.start);
            put_point(buf, &s.end);
        }
        (PgValue::Box(b), WireType::Box) => {
            put_point(buf, &b.high);
            put_point(buf, &b.low);
        }
        (PgValue::Path(p), WireType::Path) => {
            buf.put_u8(u8::from(p.closed));
            put_points(buf, &p.points, wire)?;
        }
        (PgValue::Polygon(p), WireType::Polygon) => put_points(buf, &p.points, wire)?,
        (PgValue::Circle(c), WireType::Circle) => {
            put_point(buf, &c.center);
            buf.put_f64(c.radius);
        }
        (PgValue::Range(range), w) => match w.range_subtype() {
            Some(subtype) => encode_range(buf, range, subtype)?,
            None => return Err(mismatch(value, wire)),
        },
        (PgValue::Array(items), WireType::Array(element)) => {
            encode_array(buf, items, *element)?;
        }
        (value, wire) => return Err(mismatch(value, wire)),
    }
    Ok(())
}

fn encode_range(buf: &mut BytesMut, range: &PgRange<PgValue>, subtype: WireType) -> Result<()> {
    if range.empty {
        buf.put_u8(RANGE_EMPTY);
        return Ok(());
    }
    let mut flags = 0u8;
    match range.lower {
        Bound::Included(_) => flags |= RANGE_LB_INC,
        Bound::Excluded(_) => {}
        Bound::Unbounded => flags |= RANGE_LB_INF,
    }
    match range.upper {
        Bound::Included(_) => flags |= RANGE_UB_INC,
        Bound::Excluded(_) => {}
        Bound::Unbounded => flags |= RANGE_UB_INF,
    }
    buf.put_u8(flags);
    for bound in [&range.lower, &range.upper] {
        if let Bound::Included(v) | Bound::Excluded(v) = bound {
            encode(buf, v, subtype)?;
        }
    }
    Ok(())
}

fn encode_array(buf: &mut BytesMut, items: &[Option<PgValue>], element: WireType) -> Result<()> {
    let len = i32::try_from(items.len())
        .map_err(|_| BulkCopyError::Codec("array has too many elements".into()))?;
    let has_null = items.iter().any(Option::is_none);
    buf.put_i32(if items.is_empty() { 0 } else { 1 }); // ndim
    buf.put_i32(i32::from(has_null));
    buf.put_u32(element.oid());
    if items.is_empty() {
        return Ok(());
    }
    buf.put_i32(len);
    buf.put_i32(1); // lower bound
    for item in items {
        match item {
            Some(v) => encode(buf, v, element)?,
            None => encode_null(buf),
        }
    }
    Ok(())
}

/// Bounds-checked big-endian reader over one field payload.
struct Reader<'a> {
    buf: &'a [u8],
    wire: WireType,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], wire: WireType) -> Self {
        Self { buf, wire }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(BulkCopyError::Codec(format!(
                "truncated {} value: need {} bytes, have {}",
                self.wire,
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    fn point(&mut self) -> Result<Point> {
        Ok(Point::new(self.f64()?, self.f64()?))
    }

    fn points(&mut self) -> Result<Vec<Point>> {
        let n = self.i32()?;
        let n = usize::try_from(n)
            .map_err(|_| BulkCopyError::Codec(format!("negative point count in {}", self.wire)))?;
        if self.buf.len() < n.saturating_mul(16) {
            return Err(BulkCopyError::Codec(format!(
                "truncated {} value: {} points announced",
                self.wire, n
            )));
        }
        (0..n).map(|_| self.point()).collect()
    }

    /// Read a length-prefixed field; `None` for NULL.
    fn field(&mut self) -> Result<Option<&'a [u8]>> {
        let len = self.i32()?;
        if len == -1 {
            return Ok(None);
        }
        let len = usize::try_from(len)
            .map_err(|_| BulkCopyError::Codec(format!("invalid field length {}", len)))?;
        self.take(len).map(Some)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn finish<T>(self, value: T) -> Result<T> {
        if self.buf.is_empty() {
            Ok(value)
        } else {
            Err(BulkCopyError::Codec(format!(
                "{} trailing bytes after {} value",
                self.buf.len(),
                self.wire
            )))
        }
    }
}

fn utf8(bytes: &[u8], wire: WireType) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| BulkCopyError::Codec(format!("invalid UTF-8 in {} value: {}", wire, e)))
}

fn out_of_range(wire: WireType) -> BulkCopyError {
    BulkCopyError::Codec(format!("{} value out of range", wire))
}

fn decode_timestamp(micros: i64, wire: WireType) -> Result<DateTime<chrono::Utc>> {
    micros
        .checked_add(PG_EPOCH_MICROS)
        .and_then(DateTime::from_timestamp_micros)
        .ok_or_else(|| out_of_range(wire))
}

fn decode_time(micros: i64, wire: WireType) -> Result<NaiveTime> {
    if !(0..MICROS_PER_DAY).contains(&micros) {
        return Err(out_of_range(wire));
    }
    let secs = (micros / 1_000_000) as u32;
    let nanos = (micros % 1_000_000) as u32 * 1000;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).ok_or_else(|| out_of_range(wire))
}

/// Decode one field payload of type `wire`.
pub fn decode(wire: WireType, raw: &[u8]) -> Result<PgValue> {
    let mut r = Reader::new(raw, wire);
    let value = match wire {
        WireType::Bool => PgValue::Bool(r.u8()? != 0),
        WireType::Int2 => PgValue::Int2(r.i16()?),
        WireType::Int4 => PgValue::Int4(r.i32()?),
        WireType::Int8 => PgValue::Int8(r.i64()?),
        WireType::Float4 => PgValue::Float4(r.f32()?),
        WireType::Float8 => PgValue::Float8(r.f64()?),
        WireType::Numeric => PgValue::Numeric(decode_numeric(r.rest())?),
        WireType::Money => PgValue::Money(r.i64()?),
        WireType::Text | WireType::Varchar | WireType::Char | WireType::Name | WireType::Xml => {
            PgValue::Text(utf8(r.rest(), wire)?)
        }
        WireType::Json => PgValue::Json(utf8(r.rest(), wire)?),
        WireType::Jsonb => {
            let version = r.u8()?;
            if version != 1 {
                return Err(BulkCopyError::Codec(format!(
                    "unsupported jsonb version {}",
                    version
                )));
            }
            PgValue::Json(utf8(r.rest(), wire)?)
        }
        WireType::Bytea => PgValue::Bytea(r.rest().to_vec()),
        WireType::Uuid => PgValue::Uuid(uuid::Uuid::from_bytes(r.array()?)),
        WireType::Date => {
            let days = r.i32()?;
            let date = days
                .checked_add(PG_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| out_of_range(wire))?;
            PgValue::Date(date)
        }
        WireType::Time => PgValue::Time(decode_time(r.i64()?, wire)?),
        WireType::TimeTz => {
            let time = decode_time(r.i64()?, wire)?;
            let west = r.i32()?;
            let offset = west
                .checked_neg()
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| out_of_range(wire))?;
            PgValue::TimeTz(time, offset)
        }
        WireType::Timestamp => PgValue::Timestamp(decode_timestamp(r.i64()?, wire)?.naive_utc()),
        WireType::TimestampTz => PgValue::TimestampTz(decode_timestamp(r.i64()?, wire)?),
        WireType::Interval => {
            let microseconds = r.i64()?;
            let days = r.i32()?;
            let months = r.i32()?;
            PgValue::Interval(Interval::new(months, days, microseconds))
        }
        WireType::Inet | WireType::Cidr => {
            let family = r.u8()?;
            let bits = r.u8()?;
            let _is_cidr = r.u8()?;
            let nb = r.u8()?;
            let addr = match (family, nb) {
                (PGSQL_AF_INET, 4) => IpAddr::V4(Ipv4Addr::from(r.array::<4>()?)),
                (PGSQL_AF_INET6, 16) => IpAddr::V6(Ipv6Addr::from(r.array::<16>()?)),
                _ => {
                    return Err(BulkCopyError::Codec(format!(
                        "invalid {} address family {} with {} bytes",
                        wire, family, nb
                    )))
                }
            };
            PgValue::Inet(Inet::new(addr, bits).map_err(|e| BulkCopyError::Codec(e.to_string()))?)
        }
        WireType::MacAddr => PgValue::MacAddr(MacAddress::Eui48(r.array()?)),
        WireType::MacAddr8 => PgValue::MacAddr(MacAddress::Eui64(r.array()?)),
        WireType::Bit | WireType::Varbit => {
            let len = r.i32()?;
            let len = usize::try_from(len).map_err(|_| out_of_range(wire))?;
            let bytes = r.take(len.div_ceil(8))?;
            PgValue::Bits(BitString::from_bytes(bytes, len)?)
        }
        WireType::Point => PgValue::Point(r.point()?),
        WireType::Line => PgValue::Line(Line::new(r.f64()?, r.f64()?, r.f64()?)),
        WireType::LSeg => PgValue::LineSegment(LineSegment::new(r.point()?, r.point()?)),
        WireType::Box => {
            let high = r.point()?;
            let low = r.point()?;
            PgValue::Box(GeoBox { high, low })
        }
        WireType::Path => {
            let closed = r.u8()? != 0;
            let points = r.points()?;
            PgValue::Path(Path { points, closed })
        }
        WireType::Polygon => PgValue::Polygon(Polygon::new(r.points()?)),
        WireType::Circle => PgValue::Circle(Circle::new(r.point()?, r.f64()?)),
        WireType::Int4Range
        | WireType::Int8Range
        | WireType::NumRange
        | WireType::TsRange
        | WireType::TsTzRange
        | WireType::DateRange => {
            let subtype = wire
                .range_subtype()
                .ok_or_else(|| BulkCopyError::Codec(format!("{} is not a range", wire)))?;
            PgValue::range(decode_range(&mut r, subtype)?)
        }
        WireType::Array(element) => PgValue::Array(decode_array(&mut r, *element)?),
        WireType::Other(_) => PgValue::Raw(r.rest().to_vec()),
    };
    r.finish(value)
}

fn decode_range(r: &mut Reader<'_>, subtype: WireType) -> Result<PgRange<PgValue>> {
    let flags = r.u8()?;
    if flags & RANGE_EMPTY != 0 {
        return Ok(PgRange::empty());
    }
    let mut bound = |infinite: u8, inclusive: u8| -> Result<Bound<PgValue>> {
        if flags & infinite != 0 {
            return Ok(Bound::Unbounded);
        }
        let raw = r
            .field()?
            .ok_or_else(|| BulkCopyError::Codec("NULL range bound".into()))?;
        let v = decode(subtype, raw)?;
        Ok(if flags & inclusive != 0 {
            Bound::Included(v)
        } else {
            Bound::Excluded(v)
        })
    };
    let lower = bound(RANGE_LB_INF, RANGE_LB_INC)?;
    let upper = bound(RANGE_UB_INF, RANGE_UB_INC)?;
    Ok(PgRange::new(lower, upper))
}

fn decode_array(r: &mut Reader<'_>, element: WireType) -> Result<Vec<Option<PgValue>>> {
    let ndim = r.i32()?;
    let _has_null = r.i32()?;
    let oid = r.u32()?;
    if oid != element.oid() {
        return Err(BulkCopyError::Codec(format!(
            "array element oid {} does not match {}",
            oid, element
        )));
    }
    match ndim {
        0 => return Ok(Vec::new()),
        1 => {}
        n => {
            return Err(BulkCopyError::Codec(format!(
                "only one-dimensional arrays are supported, got {} dimensions",
                n
            )))
        }
    }
    let len = r.i32()?;
    let _lower_bound = r.i32()?;
    let len = usize::try_from(len)
        .map_err(|_| BulkCopyError::Codec(format!("invalid array length {}", len)))?;
    // Each element needs at least its 4-byte length word.
    if r.buf.len() < len.saturating_mul(4) {
        return Err(BulkCopyError::Codec(format!(
            "truncated array: {} elements announced",
            len
        )));
    }
    (0..len)
        .map(|_| r.field()?.map(|raw| decode(element, raw)).transpose())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn payload(value: &PgValue, wire: WireType) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode(&mut buf, value, wire).unwrap();
        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len() - 4);
        buf[4..].to_vec()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_fixed_width_scalars() {
        assert_eq!(payload(&PgValue::Int4(42), WireType::Int4), 42i32.to_be_bytes());
        assert_eq!(payload(&PgValue::Bool(true), WireType::Bool), vec![1]);
        assert_eq!(payload(&PgValue::Money(-1250), WireType::Money), (-1250i64).to_be_bytes());
    }

    #[test]
    fn test_temporal_epochs() {
        let date = NaiveDate::from_ymd_opt(2000, 1, 2).unwrap();
        assert_eq!(payload(&PgValue::Date(date), WireType::Date), 1i32.to_be_bytes());

        let before = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(payload(&PgValue::Date(before), WireType::Date), (-1i32).to_be_bytes());

        let t = ts("2000-01-01 00:00:01.5");
        assert_eq!(
            payload(&PgValue::Timestamp(t), WireType::Timestamp),
            1_500_000i64.to_be_bytes()
        );

        let utc = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            payload(&PgValue::TimestampTz(utc), WireType::TimestampTz),
            0i64.to_be_bytes()
        );
    }

    #[test]
    fn test_timetz_zone_is_seconds_west() {
        let t = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let plus_two = FixedOffset::east_opt(7200).unwrap();
        let bytes = payload(&PgValue::TimeTz(t, plus_two), WireType::TimeTz);
        assert_eq!(&bytes[8..], &(-7200i32).to_be_bytes());
        assert_eq!(
            decode(WireType::TimeTz, &bytes).unwrap(),
            PgValue::TimeTz(t, plus_two)
        );
    }

    #[test]
    fn test_jsonb_version_prefix() {
        let bytes = payload(&PgValue::Json("{\"a\":1}".into()), WireType::Jsonb);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], b"{\"a\":1}");
        assert_eq!(
            decode(WireType::Jsonb, &bytes).unwrap(),
            PgValue::Json("{\"a\":1}".into())
        );
    }

    #[test]
    fn test_inet_and_cidr_layout() {
        let net: Inet = "192.168.0.0/16".parse().unwrap();
        let bytes = payload(&PgValue::Inet(net), WireType::Cidr);
        assert_eq!(bytes, vec![2, 16, 1, 4, 192, 168, 0, 0]);

        let host: Inet = "10.1.2.3/8".parse().unwrap();
        let mut buf = BytesMut::new();
        assert!(encode(&mut buf, &PgValue::Inet(host), WireType::Cidr).is_err());
        assert!(buf.is_empty(), "failed encode must not leave bytes behind");

        let bytes = payload(&PgValue::Inet(host), WireType::Inet);
        assert_eq!(bytes[2], 0);
    }

    #[test]
    fn test_macaddr8_widens_eui48() {
        let mac = MacAddress::Eui48([1, 2, 3, 4, 5, 6]);
        assert_eq!(
            payload(&PgValue::MacAddr(mac), WireType::MacAddr8),
            vec![1, 2, 3, 0xFF, 0xFE, 4, 5, 6]
        );
        let mut buf = BytesMut::new();
        let wide = MacAddress::Eui64([0; 8]);
        assert!(encode(&mut buf, &PgValue::MacAddr(wide), WireType::MacAddr).is_err());
    }

    #[test]
    fn test_box_writes_high_corner_first() {
        let b = GeoBox::new(Point::new(0.0, 0.0), Point::new(2.0, 3.0));
        let bytes = payload(&PgValue::Box(b), WireType::Box);
        assert_eq!(&bytes[0..8], &2.0f64.to_be_bytes());
        assert_eq!(&bytes[8..16], &3.0f64.to_be_bytes());
    }

    #[test]
    fn test_range_flags() {
        let range = PgRange::new(Bound::Included(PgValue::Int4(1)), Bound::Unbounded);
        let bytes = payload(&PgValue::range(range.clone()), WireType::Int4Range);
        assert_eq!(bytes[0], RANGE_LB_INC | RANGE_UB_INF);
        assert_eq!(bytes.len(), 1 + 4 + 4);
        assert_eq!(
            decode(WireType::Int4Range, &bytes).unwrap(),
            PgValue::range(range)
        );

        let empty = payload(&PgValue::range(PgRange::empty()), WireType::DateRange);
        assert_eq!(empty, vec![RANGE_EMPTY]);
    }

    #[test]
    fn test_array_with_nulls() {
        let items = vec![Some(PgValue::Text("a".into())), None];
        let bytes = payload(&PgValue::Array(items.clone()), WireType::Array(&WireType::Text));
        assert_eq!(&bytes[0..4], &1i32.to_be_bytes()); // ndim
        assert_eq!(&bytes[4..8], &1i32.to_be_bytes()); // has_null
        assert_eq!(&bytes[8..12], &25u32.to_be_bytes()); // text oid
        assert_eq!(
            decode(WireType::Array(&WireType::Text), &bytes).unwrap(),
            PgValue::Array(items)
        );

        let empty = payload(&PgValue::Array(vec![]), WireType::Array(&WireType::Int4));
        assert_eq!(empty.len(), 12);
        assert_eq!(&empty[0..4], &0i32.to_be_bytes());
    }

    #[test]
    fn test_decode_reverses_encode() {
        let cases = vec![
            (PgValue::Int2(-7), WireType::Int2),
            (PgValue::Float8(1.25), WireType::Float8),
            (PgValue::Numeric(Decimal::new(-12345, 2)), WireType::Numeric),
            (PgValue::Text("héllo".into()), WireType::Varchar),
            (PgValue::Timestamp(ts("1969-07-20 20:17:40.123456")), WireType::Timestamp),
            (
                PgValue::Time(NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap()),
                WireType::Time,
            ),
            (PgValue::Interval(Interval::new(14, 3, 4_000_000)), WireType::Interval),
            (PgValue::Bits("1011".parse().unwrap()), WireType::Varbit),
            (
                PgValue::Path(Path::closed(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)])),
                WireType::Path,
            ),
            (PgValue::Inet("2001:db8::1/64".parse().unwrap()), WireType::Inet),
        ];
        for (value, wire) in cases {
            let bytes = payload(&value, wire);
            assert_eq!(decode(wire, &bytes).unwrap(), value, "{}", wire);
        }
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        let mut buf = BytesMut::new();
        let err = encode(&mut buf, &PgValue::Text("x".into()), WireType::Int4).unwrap_err();
        assert!(err.to_string().contains("int4"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_and_trailing() {
        assert!(decode(WireType::Int4, &[0, 0, 1]).is_err());
        assert!(decode(WireType::Int4, &[0, 0, 0, 1, 0]).is_err());
        assert!(decode(WireType::Text, &[0xFF, 0xFE]).is_err());
        assert!(decode(WireType::Time, &i64::MAX.to_be_bytes()).is_err());
    }
}
