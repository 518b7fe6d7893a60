//! Bit-packed date/time encoding.
//!
//! Layout, most significant bit first: date-only flag, fraction flag, time
//! zone flag, year sign + 14-bit year, 4-bit month, 5-bit day. Unless the
//! value is date-only it continues with 5-bit hour, 6-bit minute, 6-bit
//! second, the optional fraction (width depends on the column precision) and
//! the optional sign + 10-bit minute offset. The last byte is zero-padded.

use crate::bits::{BitReader, BitWriter};
use crate::codec::get_bytes;
use crate::error::WireError;
use bytes::{Buf, BufMut};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const MAX_PRECISION: u8 = 9;
pub const MAX_YEAR: u32 = (1 << 14) - 1;
pub const MAX_OFFSET_MINUTES: u32 = (1 << 10) - 1;

const FRACTION_BITS: [u32; 10] = [0, 4, 7, 10, 14, 17, 20, 24, 27, 30];
const FRACTION_HIGH_BITS: u32 = 4;
const DATE_BITS: u32 = 3 + 1 + 14 + 4 + 5;
const TIME_BITS: u32 = 5 + 6 + 6;
const OFFSET_BITS: u32 = 1 + 10;

/// Bit width of the fraction field for a column precision.
pub fn fraction_bits(precision: u8) -> u32 {
    FRACTION_BITS[usize::from(precision.min(MAX_PRECISION))]
}

fn nanos_divisor(precision: u8) -> u32 {
    10u32.pow(u32::from(MAX_PRECISION - precision.min(MAX_PRECISION)))
}

/// A wall-clock value plus the minute offset it was observed in. Plain
/// timestamps carry a zero offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireDateTime {
    pub local: NaiveDateTime,
    pub offset_minutes: i32,
}

impl WireDateTime {
    pub fn naive(local: NaiveDateTime) -> Self {
        Self {
            local,
            offset_minutes: 0,
        }
    }

    pub fn zoned(value: DateTime<FixedOffset>) -> Self {
        Self {
            local: value.naive_local(),
            offset_minutes: value.offset().local_minus_utc() / 60,
        }
    }

    pub fn to_zoned(self) -> Result<DateTime<FixedOffset>, WireError> {
        let out_of_range = || WireError::ValueOutOfRange(format!("offset {}m", self.offset_minutes));
        let offset = FixedOffset::east_opt(self.offset_minutes * 60).ok_or_else(out_of_range)?;
        self.local
            .and_local_timezone(offset)
            .single()
            .ok_or_else(out_of_range)
    }

    /// Pack the value for a column of the given fractional precision.
    /// Nanoseconds below the precision are truncated.
    pub fn encode(&self, precision: u8) -> Result<Vec<u8>, WireError> {
        let precision = precision.min(MAX_PRECISION);
        let date = self.local.date();
        let time = self.local.time();

        let year = date.year().unsigned_abs();
        if year > MAX_YEAR {
            return Err(WireError::ValueOutOfRange(format!("year {}", date.year())));
        }
        let offset = self.offset_minutes.unsigned_abs();
        if offset > MAX_OFFSET_MINUTES {
            return Err(WireError::ValueOutOfRange(format!(
                "offset {}m",
                self.offset_minutes
            )));
        }

        // leap seconds are reported as nanos >= 1e9
        let nanos = time.nanosecond().min(999_999_999);
        let fraction = nanos / nanos_divisor(precision);
        let has_fraction = fraction != 0;
        let has_timezone = self.offset_minutes != 0;
        let date_only = time.hour() == 0
            && time.minute() == 0
            && time.second() == 0
            && !has_fraction
            && !has_timezone;

        let mut bits = BitWriter::new();
        bits.push_bit(date_only);
        bits.push_bit(has_fraction);
        bits.push_bit(has_timezone);
        bits.push_bit(date.year() < 0);
        bits.push_bits(u64::from(year), 14);
        bits.push_bits(u64::from(date.month()), 4);
        bits.push_bits(u64::from(date.day()), 5);
        if !date_only {
            bits.push_bits(u64::from(time.hour()), 5);
            bits.push_bits(u64::from(time.minute()), 6);
            bits.push_bits(u64::from(time.second()), 6);
            if has_fraction {
                let width = fraction_bits(precision);
                let high = width.min(FRACTION_HIGH_BITS);
                let low = width - high;
                bits.push_bits(u64::from(fraction >> low), high);
                bits.push_bits(u64::from(fraction) & ((1u64 << low) - 1), low);
            }
            if has_timezone {
                bits.push_bit(self.offset_minutes < 0);
                bits.push_bits(u64::from(offset), 10);
            }
        }
        Ok(bits.finish())
    }

    pub fn write<B: BufMut>(&self, precision: u8, out: &mut B) -> Result<(), WireError> {
        let bytes = self.encode(precision)?;
        out.put_slice(&bytes);
        Ok(())
    }

    pub fn decode<B: Buf>(buf: &mut B, precision: u8) -> Result<Self, WireError> {
        let precision = precision.min(MAX_PRECISION);
        let flags = *buf.chunk().first().ok_or(WireError::TruncatedStream)?;
        let date_only = flags & 0x80 != 0;
        let has_fraction = flags & 0x40 != 0;
        let has_timezone = flags & 0x20 != 0;

        let mut total = DATE_BITS;
        if !date_only {
            total += TIME_BITS;
            if has_fraction {
                total += fraction_bits(precision);
            }
            if has_timezone {
                total += OFFSET_BITS;
            }
        }
        let bytes = get_bytes(buf, total.div_ceil(8) as usize)?;
        let mut bits = BitReader::new(&bytes);
        bits.read_bits(3)?;

        let negative_year = bits.read_bit()?;
        let year = bits.read_bits(14)? as i32;
        let year = if negative_year { -year } else { year };
        let month = bits.read_bits(4)? as u32;
        let day = bits.read_bits(5)? as u32;
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| WireError::ValueOutOfRange(format!("date {year}-{month}-{day}")))?;

        let (mut hour, mut minute, mut second, mut nanos) = (0, 0, 0, 0);
        let mut offset_minutes = 0;
        if !date_only {
            hour = bits.read_bits(5)? as u32;
            minute = bits.read_bits(6)? as u32;
            second = bits.read_bits(6)? as u32;
            if has_fraction {
                let width = fraction_bits(precision);
                let high = width.min(FRACTION_HIGH_BITS);
                let low = width - high;
                let fraction = (bits.read_bits(high)? << low) | bits.read_bits(low)?;
                nanos = fraction as u32 * nanos_divisor(precision);
            }
            if has_timezone {
                let negative = bits.read_bit()?;
                let minutes = bits.read_bits(10)? as i32;
                offset_minutes = if negative { -minutes } else { minutes };
            }
        }
        let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(|| {
            WireError::ValueOutOfRange(format!("time {hour}:{minute}:{second}.{nanos}"))
        })?;
        Ok(Self {
            local: date.and_time(time),
            offset_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nanos: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .expect("date")
            .and_hms_nano_opt(h, mi, s, nanos)
            .expect("time")
    }

    #[test]
    fn midnight_date_packs_into_four_bytes() {
        let value = WireDateTime::naive(at(2024, 2, 29, 0, 0, 0, 0));
        let bytes = value.encode(6).expect("encode");
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0] & 0xE0, 0x80);

        let mut slice = &bytes[..];
        assert_eq!(WireDateTime::decode(&mut slice, 6).expect("decode"), value);
        assert!(slice.is_empty());
    }

    #[test]
    fn microsecond_fraction_roundtrips() {
        let value = WireDateTime::naive(at(1999, 12, 31, 23, 59, 58, 123_456_789));
        let bytes = value.encode(6).expect("encode");
        // 27 date bits + 17 time bits + 20 fraction bits
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[0] & 0xE0, 0x40);

        let mut slice = &bytes[..];
        let decoded = WireDateTime::decode(&mut slice, 6).expect("decode");
        assert_eq!(decoded.local, at(1999, 12, 31, 23, 59, 58, 123_456_000));
        assert!(slice.is_empty());
    }

    #[test]
    fn fraction_below_precision_is_dropped() {
        let value = WireDateTime::naive(at(2020, 1, 1, 0, 0, 0, 400));
        let bytes = value.encode(3).expect("encode");
        assert_eq!(bytes.len(), 4, "truncated fraction is zero, so date-only");
    }

    #[test]
    fn offsets_and_negative_years_roundtrip() {
        let offset = FixedOffset::west_opt(5 * 3600 + 30 * 60).expect("offset");
        let zoned = at(2023, 6, 1, 8, 15, 0, 0)
            .and_local_timezone(offset)
            .single()
            .expect("zoned");
        let value = WireDateTime::zoned(zoned);
        assert_eq!(value.offset_minutes, -330);
        let bytes = value.encode(0).expect("encode");
        let mut slice = &bytes[..];
        let decoded = WireDateTime::decode(&mut slice, 0).expect("decode");
        assert_eq!(decoded.to_zoned().expect("zoned"), zoned);

        let utc = WireDateTime::zoned(
            at(2023, 6, 1, 0, 0, 0, 0)
                .and_local_timezone(FixedOffset::east_opt(0).expect("utc"))
                .single()
                .expect("zoned"),
        );
        assert_eq!(utc.encode(0).expect("encode").len(), 4);

        let bc = WireDateTime::naive(at(-44, 3, 15, 12, 0, 0, 0));
        let bytes = bc.encode(0).expect("encode");
        let mut slice = &bytes[..];
        assert_eq!(WireDateTime::decode(&mut slice, 0).expect("decode"), bc);
    }

    #[test]
    fn rejects_unencodable_values() {
        let far = WireDateTime::naive(at(20_000, 1, 1, 0, 0, 0, 0));
        assert!(matches!(far.encode(0), Err(WireError::ValueOutOfRange(_))));
        let wide = WireDateTime {
            local: at(2000, 1, 1, 1, 0, 0, 0),
            offset_minutes: 1440,
        };
        assert!(matches!(wide.encode(0), Err(WireError::ValueOutOfRange(_))));
    }
}
