//! Decimal number encoding.
//!
//! Small non-negative integers take a single byte `0x80 | value`. Everything
//! else is normalised to `digits * 10^scale` with no redundant zeros and
//! written as a meta byte (sign + biased scale), an optional escaped scale
//! byte, and base-100 digit pairs where the last pair carries `0x80`.

use crate::codec::get_u8;
use crate::error::WireError;
use bytes::{Buf, BufMut};

const SMALL_MARKER: u8 = 0x80;
const SMALL_MAX: u64 = 127;
const NEGATIVE: u8 = 0x40;
const SCALE_BIAS: i32 = 32;
const MAX_INLINE_BIAS: i32 = 62;
const ESCAPED_SCALE: u8 = 0x3F;
const ESCAPE_OFFSET: i32 = 130;
const LAST_PAIR: u8 = 0x80;

/// Canonical decimal: `digits` holds an even number of ASCII digits with at
/// most one leading pad zero and no trailing zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalNumber {
    negative: bool,
    digits: String,
    scale: i32,
}

impl DecimalNumber {
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Significant digits without the pad zero.
    pub fn digits(&self) -> &str {
        self.digits.trim_start_matches('0')
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    fn write<B: BufMut>(&self, out: &mut B) {
        let sign = if self.negative { NEGATIVE } else { 0 };
        let bias = self.scale + SCALE_BIAS;
        if (0..=MAX_INLINE_BIAS).contains(&bias) {
            out.put_u8(bias as u8 | sign);
        } else {
            out.put_u8(ESCAPED_SCALE | sign);
            out.put_u8((self.scale + ESCAPE_OFFSET) as u8);
        }
        let digits = self.digits.as_bytes();
        for (i, pair) in digits.chunks(2).enumerate() {
            let mut byte = (pair[0] - b'0') * 10 + (pair[1] - b'0');
            if (i + 1) * 2 >= digits.len() {
                byte |= LAST_PAIR;
            }
            out.put_u8(byte);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedNumber {
    Small(u8),
    Decimal(DecimalNumber),
}

impl EncodedNumber {
    /// Parse the driver's decimal text (`-12.50`, `1E-40`, `007`) into its
    /// wire form.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let text = text.trim();
        if let Ok(value) = text.parse::<u64>() {
            if value <= SMALL_MAX {
                return Ok(EncodedNumber::Small(value as u8));
            }
        }

        let invalid = || WireError::InvalidNumber(text.to_string());
        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(idx) => {
                let exp = unsigned[idx + 1..].parse::<i64>().map_err(|_| invalid())?;
                (&unsigned[..idx], exp)
            }
            None => (unsigned, 0),
        };

        let mut scale = exponent;
        let mut digits = String::with_capacity(mantissa.len() + 1);
        match mantissa.split_once('.') {
            Some((int_part, frac_part)) => {
                scale = scale.saturating_sub(frac_part.len() as i64);
                digits.push_str(int_part);
                digits.push_str(frac_part);
            }
            None => digits.push_str(mantissa),
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let significant = digits.trim_start_matches('0');
        if significant.is_empty() {
            return Ok(EncodedNumber::Small(0));
        }
        let trimmed = significant.trim_end_matches('0');
        scale = scale.saturating_add((significant.len() - trimmed.len()) as i64);

        let bias = scale.saturating_add(i64::from(SCALE_BIAS));
        let escaped = scale.saturating_add(i64::from(ESCAPE_OFFSET));
        if !(0..=i64::from(MAX_INLINE_BIAS)).contains(&bias) && !(0..=255).contains(&escaped) {
            return Err(WireError::NumberOutOfRange(scale));
        }
        // escaped is within 0..=255 here
        let scale = scale as i32;

        let mut packed = String::with_capacity(trimmed.len() + 1);
        if trimmed.len() % 2 == 1 {
            packed.push('0');
        }
        packed.push_str(trimmed);
        Ok(EncodedNumber::Decimal(DecimalNumber {
            negative,
            digits: packed,
            scale,
        }))
    }

    pub fn write<B: BufMut>(&self, out: &mut B) {
        match self {
            EncodedNumber::Small(value) => out.put_u8(SMALL_MARKER | value),
            EncodedNumber::Decimal(decimal) => decimal.write(out),
        }
    }
}

/// Decode a number back to canonical decimal text.
pub fn decode_number<B: Buf>(buf: &mut B) -> Result<String, WireError> {
    let meta = get_u8(buf)?;
    if meta & SMALL_MARKER != 0 {
        return Ok((meta & !SMALL_MARKER).to_string());
    }
    let negative = meta & NEGATIVE != 0;
    let bias = meta & ESCAPED_SCALE;
    let scale = if bias == ESCAPED_SCALE {
        i32::from(get_u8(buf)?) - ESCAPE_OFFSET
    } else {
        i32::from(bias) - SCALE_BIAS
    };

    let mut digits = String::new();
    loop {
        let byte = get_u8(buf)?;
        let pair = byte & !LAST_PAIR;
        if pair > 99 {
            return Err(WireError::InvalidNumber(format!("digit pair {pair}")));
        }
        digits.push(char::from(b'0' + pair / 10));
        digits.push(char::from(b'0' + pair % 10));
        if byte & LAST_PAIR != 0 {
            break;
        }
    }
    Ok(render(negative, &digits, scale))
}

fn render(negative: bool, digits: &str, scale: i32) -> String {
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let mut out = String::with_capacity(digits.len() + scale.unsigned_abs() as usize + 3);
    if negative {
        out.push('-');
    }
    if scale >= 0 {
        out.push_str(digits);
        out.extend(std::iter::repeat('0').take(scale as usize));
        return out;
    }
    let frac_len = scale.unsigned_abs() as usize;
    if frac_len >= digits.len() {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take(frac_len - digits.len()));
        out.push_str(digits);
    } else {
        let (int_part, frac_part) = digits.split_at(digits.len() - frac_len);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode(text: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        EncodedNumber::parse(text).expect("parse").write(&mut buf);
        buf.to_vec()
    }

    fn roundtrip(text: &str) -> String {
        let bytes = encode(text);
        let mut slice = &bytes[..];
        let decoded = decode_number(&mut slice).expect("decode");
        assert!(slice.is_empty(), "trailing bytes for {text}");
        decoded
    }

    #[test]
    fn small_integers_take_one_byte() {
        assert_eq!(encode("0"), vec![0x80]);
        assert_eq!(encode("1"), vec![0x81]);
        assert_eq!(encode("127"), vec![0xFF]);
        assert_eq!(encode("007"), vec![0x87]);
        assert_ne!(encode("128").len(), 1);
    }

    #[test]
    fn zero_in_any_spelling_is_the_small_zero() {
        assert_eq!(encode("0.000"), vec![0x80]);
        assert_eq!(encode("-0"), vec![0x80]);
    }

    #[test]
    fn negative_one_and_a_half_normalises() {
        let EncodedNumber::Decimal(decimal) = EncodedNumber::parse("-1.50").expect("parse") else {
            panic!("expected decimal form");
        };
        assert!(decimal.is_negative());
        assert_eq!(decimal.digits(), "15");
        assert_eq!(decimal.scale(), -1);
        assert_eq!(encode("-1.50"), vec![0x40 | 31, 0x80 | 15]);
        assert_eq!(roundtrip("-1.50"), "-1.5");
        assert_eq!(encode("1.5"), encode("1.50"));
        assert_eq!(encode("1.5"), encode("150E-2"));
    }

    #[test]
    fn odd_digit_counts_get_a_leading_pad() {
        // 12345 -> 01 23 45
        assert_eq!(encode("12345"), vec![32, 1, 23, 0x80 | 45]);
        assert_eq!(roundtrip("12345"), "12345");
        assert_eq!(roundtrip("-98765.4321"), "-98765.4321");
        assert_eq!(roundtrip("1000"), "1000");
        assert_eq!(roundtrip("0.00012"), "0.00012");
    }

    #[test]
    fn scale_outside_inline_range_is_escaped() {
        let tiny = encode("1E-40");
        assert_eq!(tiny[0], 0x3F);
        assert_eq!(tiny[1], (130 - 40) as u8);
        assert_eq!(roundtrip("1E-40"), format!("0.{}1", "0".repeat(39)));

        let huge = format!("-7{}", "0".repeat(40));
        let bytes = encode(&huge);
        assert_eq!(bytes[0], 0x3F | 0x40);
        assert_eq!(bytes[1], 170);
        assert_eq!(roundtrip(&huge), huge);
    }

    #[test]
    fn inline_range_edges() {
        // scale 30 -> bias 62, still inline
        let at_edge = format!("1{}", "0".repeat(30));
        assert_eq!(encode(&at_edge)[0], 62);
        assert_eq!(roundtrip(&at_edge), at_edge);
        // scale 31 -> bias 63 must escape
        let past_edge = format!("1{}", "0".repeat(31));
        assert_eq!(encode(&past_edge)[0], 0x3F);
        assert_eq!(roundtrip(&past_edge), past_edge);
    }

    #[test]
    fn rejects_garbage_and_unencodable_scales() {
        assert!(matches!(EncodedNumber::parse("12a"), Err(WireError::InvalidNumber(_))));
        assert!(matches!(EncodedNumber::parse("-"), Err(WireError::InvalidNumber(_))));
        assert!(matches!(EncodedNumber::parse("1E-200"), Err(WireError::NumberOutOfRange(-200))));
    }

    #[test]
    fn exponent_extremes_fail_without_overflow() {
        assert!(matches!(
            EncodedNumber::parse("1E2147483647"),
            Err(WireError::NumberOutOfRange(2147483647))
        ));
        assert!(matches!(
            EncodedNumber::parse("1.5E-2147483648"),
            Err(WireError::NumberOutOfRange(-2147483649))
        ));
        assert!(matches!(
            EncodedNumber::parse("10E-2147483648"),
            Err(WireError::NumberOutOfRange(-2147483647))
        ));
        assert!(matches!(
            EncodedNumber::parse("1.5E-9223372036854775808"),
            Err(WireError::NumberOutOfRange(i64::MIN))
        ));
        assert!(matches!(
            EncodedNumber::parse("1E99999999999999999999"),
            Err(WireError::InvalidNumber(_))
        ));
    }
}
