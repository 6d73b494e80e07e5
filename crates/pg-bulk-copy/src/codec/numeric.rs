//! PostgreSQL NUMERIC binary format.
//!
//! - ndigits (i16): number of base-10000 digits
//! - weight (i16): weight of first digit (position of first digit above decimal, minus 1)
//! - sign (i16): 0x0000=positive, 0x4000=negative, 0xC000=NaN
//! - dscale (i16): display scale (decimal places)
//! - digits (i16[]): array of base-10000 digits

use bytes::{Buf, BufMut, BytesMut};
use rust_decimal::Decimal;

use crate::error::{BulkCopyError, Result};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Largest scale `Decimal` can represent.
const MAX_SCALE: u32 = 28;

/// Group ASCII decimal digits four at a time into base-10000 digits.
fn base10000(digits: &[u8]) -> Vec<i16> {
    digits
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, b| acc * 10 + i16::from(b.wrapping_sub(b'0')))
        })
        .collect()
}

/// Write the NUMERIC payload for `d` (without the length prefix).
pub fn encode_numeric(buf: &mut BytesMut, d: &Decimal) {
    // Decimal's scale is capped at 28, so it always fits an i16.
    let dscale = d.scale() as i16;

    if d.is_zero() {
        buf.put_i16(0); // ndigits
        buf.put_i16(0); // weight
        buf.put_u16(NUMERIC_POS);
        buf.put_i16(dscale);
        return;
    }

    let sign = if d.is_sign_negative() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };

    // The string form keeps the scale, so 0.01 yields "01" as fraction digits.
    let abs_str = d.abs().to_string();
    let (int_part, frac_part) = abs_str.split_once('.').unwrap_or((abs_str.as_str(), ""));

    // Integer part: pad on the left to a multiple of 4.
    let int_clean = int_part.trim_start_matches('0');
    let int_digits = if int_clean.is_empty() {
        Vec::new()
    } else {
        let padded_len = int_clean.len().div_ceil(4) * 4;
        base10000(format!("{:0>width$}", int_clean, width = padded_len).as_bytes())
    };

    // Fractional part: pad on the right to a multiple of 4.
    let frac_digits = if frac_part.is_empty() {
        Vec::new()
    } else {
        let padded_len = frac_part.len().div_ceil(4) * 4;
        base10000(format!("{:0<width$}", frac_part, width = padded_len).as_bytes())
    };

    let weight = if int_digits.is_empty() {
        let leading_zero_groups = frac_digits.iter().take_while(|&&g| g == 0).count() as i16;
        -(leading_zero_groups + 1)
    } else {
        int_digits.len() as i16 - 1
    };

    let mut digits: Vec<i16> = int_digits;
    digits.extend(frac_digits);

    // The weight already points at the first non-zero group.
    let first = digits.iter().position(|&g| g != 0).unwrap_or(0);
    let last = digits.iter().rposition(|&g| g != 0).map_or(0, |i| i + 1);
    let digits = &digits[first..last.max(first)];

    buf.put_i16(digits.len() as i16);
    buf.put_i16(weight);
    buf.put_u16(sign);
    buf.put_i16(dscale);
    for digit in digits {
        buf.put_i16(*digit);
    }
}

/// Decode a NUMERIC payload.
///
/// NaN and infinities have no `Decimal` counterpart and are rejected.
pub fn decode_numeric(raw: &[u8]) -> Result<Decimal> {
    if raw.len() < 8 {
        return Err(BulkCopyError::Codec(format!(
            "Invalid NUMERIC length: {} (minimum 8)",
            raw.len()
        )));
    }
    let mut buf = raw;
    let ndigits = buf.get_i16();
    let weight = buf.get_i16();
    let sign = buf.get_u16();
    let dscale = buf.get_i16();

    match sign {
        NUMERIC_POS | NUMERIC_NEG => {}
        NUMERIC_NAN => return Err(BulkCopyError::Codec("NUMERIC NaN is not supported".into())),
        NUMERIC_PINF | NUMERIC_NINF => {
            return Err(BulkCopyError::Codec(
                "NUMERIC infinity is not supported".into(),
            ))
        }
        other => {
            return Err(BulkCopyError::Codec(format!(
                "Invalid NUMERIC sign: {:#06x}",
                other
            )))
        }
    }
    if ndigits < 0 || dscale < 0 || buf.remaining() != ndigits as usize * 2 {
        return Err(BulkCopyError::Codec(format!(
            "Invalid NUMERIC header: ndigits={}, dscale={}, payload={} bytes",
            ndigits,
            dscale,
            raw.len()
        )));
    }
    let dscale = (dscale as u32).min(MAX_SCALE);
    let overflow = || BulkCopyError::Codec("NUMERIC value out of range".into());

    if ndigits == 0 {
        return Ok(Decimal::new(0, dscale));
    }

    let mut mantissa: i128 = 0;
    for _ in 0..ndigits {
        let digit = buf.get_i16();
        if !(0..10000).contains(&digit) {
            return Err(BulkCopyError::Codec(format!(
                "Invalid NUMERIC digit: {}",
                digit
            )));
        }
        mantissa = mantissa
            .checked_mul(10000)
            .and_then(|m| m.checked_add(i128::from(digit)))
            .ok_or_else(overflow)?;
    }

    // value = mantissa * 10000^(weight - ndigits + 1)
    let exponent = i32::from(weight) - i32::from(ndigits) + 1;
    let (mut mantissa, mut scale) = if exponent >= 0 {
        let factor = 10000i128
            .checked_pow(exponent as u32)
            .ok_or_else(overflow)?;
        (mantissa.checked_mul(factor).ok_or_else(overflow)?, 0u32)
    } else {
        (mantissa, (-exponent) as u32 * 4)
    };

    // Drop padding zeros of the last base-10000 group down to the display scale.
    while scale > dscale && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    if scale > MAX_SCALE {
        return Err(overflow());
    }

    let mut value = Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|_| overflow())?;
    if value.scale() < dscale {
        value.rescale(dscale);
    }
    if sign == NUMERIC_NEG {
        value.set_sign_negative(true);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to extract the NUMERIC header from an encoded payload
    fn parse_numeric_header(buf: &[u8]) -> (i16, i16, u16, i16, Vec<i16>) {
        let mut cursor = std::io::Cursor::new(buf);
        let ndigits = cursor.get_i16();
        let weight = cursor.get_i16();
        let sign = cursor.get_u16();
        let dscale = cursor.get_i16();
        let mut digits = Vec::new();
        for _ in 0..ndigits {
            digits.push(cursor.get_i16());
        }
        (ndigits, weight, sign, dscale, digits)
    }

    fn encoded(s: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_numeric(&mut buf, &s.parse().unwrap());
        buf
    }

    #[test]
    fn test_encode_zero() {
        let buf = encoded("0");
        assert_eq!(buf.len(), 8);
        let (ndigits, weight, sign, dscale, digits) = parse_numeric_header(&buf);
        assert_eq!((ndigits, weight, sign, dscale), (0, 0, NUMERIC_POS, 0));
        assert!(digits.is_empty());
    }

    #[test]
    fn test_encode_simple_integer() {
        let (ndigits, weight, sign, dscale, digits) = parse_numeric_header(&encoded("12345"));
        assert_eq!(ndigits, 2);
        assert_eq!(weight, 1);
        assert_eq!(sign, NUMERIC_POS);
        assert_eq!(dscale, 0);
        assert_eq!(digits, vec![1, 2345]);
    }

    #[test]
    fn test_encode_negative_fraction() {
        let (_, weight, sign, dscale, digits) = parse_numeric_header(&encoded("-456.78"));
        assert_eq!(weight, 0);
        assert_eq!(sign, NUMERIC_NEG);
        assert_eq!(dscale, 2);
        assert_eq!(digits, vec![456, 7800]);
    }

    #[test]
    fn test_encode_small_fractions() {
        let (_, weight, _, dscale, digits) = parse_numeric_header(&encoded("0.01"));
        assert_eq!((weight, dscale), (-1, 2));
        assert_eq!(digits, vec![100]);

        let (_, weight, _, dscale, digits) = parse_numeric_header(&encoded("0.00000001"));
        assert_eq!((weight, dscale), (-2, 8));
        assert_eq!(digits, vec![1]);
    }

    #[test]
    fn test_encode_strips_inner_trailing_groups() {
        let (_, weight, _, _, digits) = parse_numeric_header(&encoded("100000000"));
        assert_eq!(weight, 2);
        assert_eq!(digits, vec![1]);
    }

    #[test]
    fn test_decode_matches_encode() {
        for s in [
            "0",
            "0.00",
            "1",
            "12345",
            "123.45",
            "-456.78",
            "0.0001",
            "0.00000001",
            "100000000",
            "79228162514264337593543950335",
            "-1.5000",
        ] {
            let d: Decimal = s.parse().unwrap();
            let decoded = decode_numeric(&encoded(s)).unwrap();
            assert_eq!(decoded, d, "{}", s);
            assert_eq!(decoded.scale(), d.scale(), "{}", s);
        }
    }

    #[test]
    fn test_decode_rejects_nan_and_garbage() {
        let mut nan = BytesMut::new();
        nan.put_i16(0);
        nan.put_i16(0);
        nan.put_u16(NUMERIC_NAN);
        nan.put_i16(0);
        assert!(decode_numeric(&nan).is_err());

        assert!(decode_numeric(&[0, 1]).is_err());

        let mut truncated = BytesMut::new();
        truncated.put_i16(2);
        truncated.put_i16(0);
        truncated.put_u16(NUMERIC_POS);
        truncated.put_i16(0);
        truncated.put_i16(1);
        assert!(decode_numeric(&truncated).is_err());
    }
}
