//! Temporal parsing and the timezone normalization rules of the semantic tier.
//!
//! Naive wire types (`date`, `time`, `timestamp`) receive the wall clock a
//! value carries; values with explicit UTC semantics contribute their UTC
//! wall clock. Zone-aware wire types (`timetz`, `timestamptz`) receive an
//! instant; naive host values are reinterpreted at the process-local offset
//! in effect at that wall-clock time.

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};

use crate::core::{HostValue, Interval, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Date a bare time of day is placed on when a full timestamp is needed.
pub fn time_anchor() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// A parsed date/time string: with or without an explicit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDateTime {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl ParsedDateTime {
    /// Wall clock as written, ignoring any offset.
    pub fn wall_clock(self) -> NaiveDateTime {
        match self {
            ParsedDateTime::Naive(n) => n,
            ParsedDateTime::Zoned(z) => z.naive_local(),
        }
    }

    /// Instant; naive values are read as process-local wall clock.
    pub fn to_utc(self) -> Result<DateTime<Utc>> {
        match self {
            ParsedDateTime::Naive(n) => local_to_utc(n),
            ParsedDateTime::Zoned(z) => Ok(z.with_timezone(&Utc)),
        }
    }
}

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parse an ISO-8601 style date/time with culture-invariant formats.
///
/// Accepts a `T` or space separator, optional fractional seconds, an
/// optional `Z` or `±hh:mm` suffix, and bare dates (midnight).
pub fn parse_datetime(s: &str) -> Result<ParsedDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(ParsedDateTime::Zoned(dt));
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(ParsedDateTime::Zoned(dt));
    }
    if let Some(rest) = s.strip_suffix(['Z', 'z']) {
        if let Some(naive) = parse_naive(rest.trim_end()) {
            return Ok(ParsedDateTime::Zoned(naive.and_utc().fixed_offset()));
        }
    }
    parse_naive(s)
        .map(ParsedDateTime::Naive)
        .ok_or_else(|| BulkCopyError::Conversion(format!("invalid date/time: {:?}", s)))
}

/// Parse a time of day, or take the time of a full date/time string.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let trimmed = s.trim();
    if let Some(t) = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
    {
        return Ok(t);
    }
    parse_datetime(trimmed)
        .map(|p| p.wall_clock().time())
        .map_err(|_| BulkCopyError::Conversion(format!("invalid time: {:?}", s)))
}

/// Parse a time with zone. Without an explicit offset the process-local
/// offset is used.
pub fn parse_time_tz(s: &str) -> Result<(NaiveTime, FixedOffset)> {
    let trimmed = s.trim();
    let parsed = parse_datetime(trimmed)
        .or_else(|_| parse_datetime(&format!("{}T{}", Local::now().date_naive(), trimmed)))
        .map_err(|_| BulkCopyError::Conversion(format!("invalid time with zone: {:?}", s)))?;
    Ok(match parsed {
        ParsedDateTime::Zoned(z) => (z.time(), *z.offset()),
        ParsedDateTime::Naive(n) => (n.time(), local_offset(&n)),
    })
}

/// Process-local UTC offset in effect at a local wall-clock time.
///
/// Ambiguous times take the earlier offset; times skipped by a DST gap take
/// the offset obtained by reading the wall clock as UTC.
pub fn local_offset(naive: &NaiveDateTime) -> FixedOffset {
    Local
        .offset_from_local_datetime(naive)
        .earliest()
        .unwrap_or_else(|| Local.offset_from_utc_datetime(naive))
}

/// Read a naive value as process-local wall clock and return the instant.
pub fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    at_offset(naive, local_offset(&naive)).map(|dt| dt.with_timezone(&Utc))
}

/// Attach `offset` to a wall-clock value without shifting it.
pub fn at_offset(naive: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| BulkCopyError::Conversion(format!("{} out of range at {}", naive, offset)))
}

/// Split a duration into whole days and a microsecond remainder.
pub fn duration_to_interval(d: TimeDelta) -> Result<Interval> {
    let micros = d
        .num_microseconds()
        .ok_or_else(|| BulkCopyError::Conversion(format!("duration {} out of range", d)))?;
    let days = i32::try_from(micros / MICROS_PER_DAY)
        .map_err(|_| BulkCopyError::Conversion(format!("duration {} out of range", d)))?;
    Ok(Interval::new(0, days, micros % MICROS_PER_DAY))
}

/// Parse an interval: ISO-8601 `[-]P[nY][nM][nW][nD][T[nH][nM][n[.f]S]]` or
/// the clock form `[-][d.|d ]hh:mm[:ss[.f]]`.
pub fn parse_interval(s: &str) -> Result<Interval> {
    let trimmed = s.trim();
    let invalid = || BulkCopyError::Conversion(format!("invalid interval: {:?}", s));
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let interval = if let Some(iso) = body.strip_prefix(['P', 'p']) {
        parse_iso_interval(iso).ok_or_else(invalid)?
    } else {
        parse_clock_interval(body).ok_or_else(invalid)?
    };
    if !negative {
        return Ok(interval);
    }
    Ok(Interval::new(
        interval.months.checked_neg().ok_or_else(invalid)?,
        interval.days.checked_neg().ok_or_else(invalid)?,
        interval.microseconds.checked_neg().ok_or_else(invalid)?,
    ))
}

/// Fractional seconds, truncated to microseconds.
fn fraction_micros(frac: &str) -> Option<i64> {
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
    digits.parse().ok()
}

fn seconds_micros(s: &str) -> Option<i64> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let whole: i64 = whole.parse().ok()?;
    let frac = if frac.is_empty() {
        0
    } else {
        fraction_micros(frac)?
    };
    whole.checked_mul(1_000_000)?.checked_add(frac)
}

fn parse_iso_interval(s: &str) -> Option<Interval> {
    let (date_part, time_part) = match s.split_once(['T', 't']) {
        Some((d, t)) => (d, Some(t)),
        None => (s, None),
    };
    let mut months: i32 = 0;
    let mut days: i32 = 0;
    let mut micros: i64 = 0;
    let mut seen = false;

    let mut number = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: i32 = number.parse().ok()?;
        number.clear();
        seen = true;
        match c.to_ascii_uppercase() {
            'Y' => months = months.checked_add(n.checked_mul(12)?)?,
            'M' => months = months.checked_add(n)?,
            'W' => days = days.checked_add(n.checked_mul(7)?)?,
            'D' => days = days.checked_add(n)?,
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }

    if let Some(time_part) = time_part {
        for c in time_part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let unit = match c.to_ascii_uppercase() {
                'H' => 3_600_000_000,
                'M' => 60_000_000,
                'S' => {
                    micros = micros.checked_add(seconds_micros(&number)?)?;
                    number.clear();
                    seen = true;
                    continue;
                }
                _ => return None,
            };
            let n: i64 = number.parse().ok()?;
            number.clear();
            seen = true;
            micros = micros.checked_add(n.checked_mul(unit)?)?;
        }
        if !number.is_empty() {
            return None;
        }
    }

    seen.then_some(Interval::new(months, days, micros))
}

fn parse_clock_interval(s: &str) -> Option<Interval> {
    let first_colon = s.find(':')?;
    let (days, clock) = match s[..first_colon].rfind(['.', ' ']) {
        Some(sep) => (s[..sep].trim().parse::<i32>().ok()?, s[sep + 1..].trim()),
        None => (0, s),
    };
    if days < 0 {
        return None;
    }
    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds = match parts.next() {
        Some(sec) => seconds_micros(sec)?,
        None => 0,
    };
    if parts.next().is_some() || hours < 0 || !(0..60).contains(&minutes) {
        return None;
    }
    if !(0..60_000_000).contains(&seconds) {
        return None;
    }
    let micros = hours
        .checked_mul(3_600_000_000)?
        .checked_add(minutes * 60_000_000)?
        .checked_add(seconds)?;
    Some(Interval::new(0, days, micros))
}

fn unexpected(value: &HostValue, wire: WireType) -> BulkCopyError {
    BulkCopyError::Conversion(format!(
        "unexpected {} value for {} encoder",
        value.type_name(),
        wire
    ))
}

/// Wall clock of a host temporal value, as seen by a naive wire type.
fn wall_clock(value: &HostValue, wire: WireType) -> Result<NaiveDateTime> {
    Ok(match value {
        HostValue::DateTime(dt) => *dt,
        HostValue::DateTimeUtc(dt) => dt.naive_utc(),
        HostValue::DateTimeLocal(dt) => dt.naive_local(),
        HostValue::DateTimeOffset(dt) => dt.naive_local(),
        HostValue::Date(d) => d.and_time(NaiveTime::MIN),
        HostValue::Time(t) => time_anchor().and_time(*t),
        HostValue::String(s) => parse_datetime(s)?.wall_clock(),
        other => return Err(unexpected(other, wire)),
    })
}

/// Instant of a host temporal value, as seen by a zone-aware wire type.
fn instant(value: &HostValue, wire: WireType) -> Result<DateTime<FixedOffset>> {
    match value {
        HostValue::DateTimeOffset(dt) => Ok(*dt),
        HostValue::DateTimeLocal(dt) => Ok(dt.fixed_offset()),
        HostValue::DateTimeUtc(dt) => Ok(dt.fixed_offset()),
        HostValue::String(s) => match parse_datetime(s)? {
            ParsedDateTime::Zoned(z) => Ok(z),
            ParsedDateTime::Naive(n) => at_offset(n, local_offset(&n)),
        },
        HostValue::DateTime(_) | HostValue::Date(_) | HostValue::Time(_) => {
            let naive = wall_clock(value, wire)?;
            at_offset(naive, local_offset(&naive))
        }
        other => Err(unexpected(other, wire)),
    }
}

pub(crate) fn to_date(value: &HostValue, wire: WireType) -> Result<PgValue> {
    Ok(PgValue::Date(wall_clock(value, wire)?.date()))
}

pub(crate) fn to_time(value: &HostValue, wire: WireType) -> Result<PgValue> {
    match value {
        HostValue::String(s) => Ok(PgValue::Time(parse_time(s)?)),
        other => Ok(PgValue::Time(wall_clock(other, wire)?.time())),
    }
}

/// A bare time of day takes the local offset in effect today.
pub(crate) fn to_timetz(value: &HostValue, wire: WireType) -> Result<PgValue> {
    match value {
        HostValue::String(s) => {
            let (time, offset) = parse_time_tz(s)?;
            Ok(PgValue::TimeTz(time, offset))
        }
        HostValue::Time(t) => {
            let today = Local::now().date_naive().and_time(*t);
            Ok(PgValue::TimeTz(*t, local_offset(&today)))
        }
        other => {
            let dt = instant(other, wire)?;
            Ok(PgValue::TimeTz(dt.time(), *dt.offset()))
        }
    }
}

pub(crate) fn to_timestamp(value: &HostValue, wire: WireType) -> Result<PgValue> {
    Ok(PgValue::Timestamp(wall_clock(value, wire)?))
}

pub(crate) fn to_timestamptz(value: &HostValue, wire: WireType) -> Result<PgValue> {
    Ok(PgValue::TimestampTz(instant(value, wire)?.with_timezone(&Utc)))
}

pub(crate) fn to_interval(value: &HostValue, wire: WireType) -> Result<PgValue> {
    Ok(PgValue::Interval(match value {
        HostValue::Interval(iv) => *iv,
        HostValue::Duration(d) => duration_to_interval(*d)?,
        HostValue::String(s) => parse_interval(s)?,
        other => return Err(unexpected(other, wire)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_parse_datetime_forms() {
        assert_eq!(
            parse_datetime("2024-03-01 12:30:00").unwrap(),
            ParsedDateTime::Naive(naive("2024-03-01 12:30:00"))
        );
        assert_eq!(
            parse_datetime("2024-03-01T12:30:00.25").unwrap(),
            ParsedDateTime::Naive(naive("2024-03-01 12:30:00.25"))
        );
        assert_eq!(
            parse_datetime("2024-03-01").unwrap(),
            ParsedDateTime::Naive(naive("2024-03-01 00:00:00"))
        );

        let zoned = parse_datetime("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(zoned.wall_clock(), naive("2024-03-01 12:30:00"));
        assert_eq!(
            zoned.to_utc().unwrap().naive_utc(),
            naive("2024-03-01 10:30:00")
        );

        let utc = parse_datetime("2024-03-01 12:30:00Z").unwrap();
        assert!(matches!(utc, ParsedDateTime::Zoned(z) if z.offset().local_minus_utc() == 0));

        assert!(parse_datetime("03/01/2024").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn test_parse_time_forms() {
        assert_eq!(
            parse_time("08:15:30.5").unwrap(),
            NaiveTime::from_hms_milli_opt(8, 15, 30, 500).unwrap()
        );
        assert_eq!(
            parse_time("2024-01-01 23:59").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn test_parse_time_tz_keeps_explicit_offset() {
        let (t, off) = parse_time_tz("10:00:00+05:30").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(off.local_minus_utc(), 5 * 3600 + 1800);
    }

    #[test]
    fn test_parse_interval_iso() {
        assert_eq!(
            parse_interval("P1Y2M3DT4H5M6.5S").unwrap(),
            Interval::new(14, 3, ((4 * 60 + 5) * 60 + 6) * 1_000_000 + 500_000)
        );
        assert_eq!(parse_interval("P2W").unwrap(), Interval::new(0, 14, 0));
        assert_eq!(parse_interval("-PT1M").unwrap(), Interval::new(0, 0, -60_000_000));
        assert!(parse_interval("P").is_err());
        assert!(parse_interval("P1X").is_err());
    }

    #[test]
    fn test_parse_interval_clock() {
        assert_eq!(
            parse_interval("1.02:03:04.5").unwrap(),
            Interval::new(0, 1, (2 * 3600 + 3 * 60 + 4) * 1_000_000 + 500_000)
        );
        assert_eq!(
            parse_interval("3 00:00:01").unwrap(),
            Interval::new(0, 3, 1_000_000)
        );
        assert_eq!(parse_interval("00:30").unwrap(), Interval::new(0, 0, 1_800_000_000));
        assert_eq!(parse_interval("-01:00:00").unwrap(), Interval::new(0, 0, -3_600_000_000));
        assert!(parse_interval("1:60:00").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn test_duration_to_interval_splits_days() {
        let d = TimeDelta::days(2) + TimeDelta::hours(3);
        assert_eq!(
            duration_to_interval(d).unwrap(),
            Interval::new(0, 2, 3 * 3_600_000_000)
        );
        let neg = -(TimeDelta::days(1) + TimeDelta::seconds(1));
        assert_eq!(
            duration_to_interval(neg).unwrap(),
            Interval::new(0, -1, -1_000_000)
        );
    }

    #[test]
    fn test_naive_to_timestamp_is_unchanged() {
        let dt = naive("2024-06-01 09:00:00.123456");
        assert_eq!(
            to_timestamp(&HostValue::DateTime(dt), WireType::Timestamp).unwrap(),
            PgValue::Timestamp(dt)
        );
    }

    #[test]
    fn test_utc_to_timestamp_keeps_utc_wall_clock() {
        let dt = naive("2024-06-01 09:00:00").and_utc();
        assert_eq!(
            to_timestamp(&HostValue::DateTimeUtc(dt), WireType::Timestamp).unwrap(),
            PgValue::Timestamp(naive("2024-06-01 09:00:00"))
        );
    }

    #[test]
    fn test_offset_to_timestamptz_uses_full_instant() {
        let dt = DateTime::parse_from_rfc3339("2024-06-01T23:30:00-02:00").unwrap();
        assert_eq!(
            to_timestamptz(&HostValue::DateTimeOffset(dt), WireType::TimestampTz).unwrap(),
            PgValue::TimestampTz(naive("2024-06-02 01:30:00").and_utc())
        );
        assert_eq!(
            to_timestamp(&HostValue::DateTimeOffset(dt), WireType::Timestamp).unwrap(),
            PgValue::Timestamp(naive("2024-06-01 23:30:00"))
        );
    }

    #[test]
    fn test_naive_to_timestamptz_uses_local_offset() {
        let dt = naive("2024-06-01 09:00:00");
        let expected = local_to_utc(dt).unwrap();
        assert_eq!(
            to_timestamptz(&HostValue::DateTime(dt), WireType::TimestampTz).unwrap(),
            PgValue::TimestampTz(expected)
        );
    }

    #[test]
    fn test_timetz_from_utc_has_zero_offset() {
        let dt = naive("2024-06-01 09:00:00").and_utc();
        let value = to_timetz(&HostValue::DateTimeUtc(dt), WireType::TimeTz).unwrap();
        assert_eq!(
            value,
            PgValue::TimeTz(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                FixedOffset::east_opt(0).unwrap()
            )
        );
    }

    #[test]
    fn test_bare_time_to_timetz_uses_todays_offset() {
        let t = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        let expected = local_offset(&Local::now().date_naive().and_time(t));
        assert_eq!(
            to_timetz(&HostValue::Time(t), WireType::TimeTz).unwrap(),
            PgValue::TimeTz(t, expected)
        );
        assert_eq!(
            to_timetz(&"08:30:00".into(), WireType::TimeTz).unwrap(),
            PgValue::TimeTz(t, expected)
        );
        assert_eq!(
            to_timetz(&"08:30:00+05:30".into(), WireType::TimeTz).unwrap(),
            PgValue::TimeTz(t, FixedOffset::east_opt(5 * 3600 + 1800).unwrap())
        );
    }

    #[test]
    fn test_date_and_time_projections() {
        let dt = naive("2024-06-01 09:45:00");
        assert_eq!(
            to_date(&HostValue::DateTime(dt), WireType::Date).unwrap(),
            PgValue::Date(dt.date())
        );
        assert_eq!(
            to_time(&HostValue::Date(dt.date()), WireType::Time).unwrap(),
            PgValue::Time(NaiveTime::MIN)
        );
        assert_eq!(
            to_timestamp(&HostValue::Time(dt.time()), WireType::Timestamp).unwrap(),
            PgValue::Timestamp(time_anchor().and_time(dt.time()))
        );
        assert!(to_date(&HostValue::I32(1), WireType::Date).is_err());
    }

    #[test]
    fn test_interval_sources() {
        assert_eq!(
            to_interval(&HostValue::Duration(TimeDelta::minutes(90)), WireType::Interval).unwrap(),
            PgValue::Interval(Interval::new(0, 0, 5_400_000_000))
        );
        assert_eq!(
            to_interval(&HostValue::String("P1M".into()), WireType::Interval).unwrap(),
            PgValue::Interval(Interval::new(1, 0, 0))
        );
    }
}
