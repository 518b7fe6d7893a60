//! Year-to-month and day-to-second interval encodings: a meta byte of
//! presence bits plus sign, followed by a VarUInt per non-zero field.

use super::datetime::MAX_PRECISION;
use crate::codec::{get_u8, get_var_uint, put_var_uint};
use crate::error::WireError;
use bytes::{Buf, BufMut};
use obridge_core::DaySecondInterval;

const NEGATIVE: u8 = 0x80;

const YEARS: u8 = 0x01;
const MONTHS: u8 = 0x02;

const DAYS: u8 = 0x01;
const HOURS: u8 = 0x02;
const MINUTES: u8 = 0x04;
const SECONDS: u8 = 0x08;
const FRACTION: u8 = 0x10;

fn checked(value: u32, what: &str) -> Result<u32, WireError> {
    if value > i32::MAX as u32 {
        return Err(WireError::ValueOutOfRange(format!("{what} {value}")));
    }
    Ok(value)
}

/// Encode signed total months.
pub fn write_year_to_month<B: BufMut>(total_months: i32, out: &mut B) {
    let abs = total_months.unsigned_abs();
    let (years, months) = (abs / 12, abs % 12);
    let mut meta = 0;
    if years != 0 {
        meta |= YEARS;
    }
    if months != 0 {
        meta |= MONTHS;
    }
    if total_months < 0 {
        meta |= NEGATIVE;
    }
    out.put_u8(meta);
    if years != 0 {
        put_var_uint(out, years);
    }
    if months != 0 {
        put_var_uint(out, months);
    }
}

pub fn read_year_to_month<B: Buf>(buf: &mut B) -> Result<i32, WireError> {
    let meta = get_u8(buf)?;
    let years = if meta & YEARS != 0 { get_var_uint(buf)? } else { 0 };
    let months = if meta & MONTHS != 0 { get_var_uint(buf)? } else { 0 };
    let total = i64::from(years) * 12 + i64::from(months);
    let total = i32::try_from(total)
        .map_err(|_| WireError::ValueOutOfRange(format!("{years} years {months} months")))?;
    Ok(if meta & NEGATIVE != 0 { -total } else { total })
}

/// Fractional seconds as transmitted: nanoseconds scaled down to `precision`
/// digits, zero when the precision is zero.
pub fn scaled_fraction(nanos: u32, precision: u8) -> u32 {
    if precision == 0 {
        return 0;
    }
    let precision = precision.min(MAX_PRECISION);
    nanos / 10u32.pow(u32::from(MAX_PRECISION - precision))
}

pub fn write_day_to_second<B: BufMut>(
    interval: &DaySecondInterval,
    precision: u8,
    out: &mut B,
) -> Result<(), WireError> {
    let days = checked(interval.days, "days")?;
    let fraction = scaled_fraction(interval.nanos, precision);
    let fields = [
        (DAYS, days),
        (HOURS, interval.hours),
        (MINUTES, interval.minutes),
        (SECONDS, interval.seconds),
        (FRACTION, fraction),
    ];

    let mut meta = if interval.negative { NEGATIVE } else { 0 };
    for (bit, value) in fields {
        if value != 0 {
            meta |= bit;
        }
    }
    out.put_u8(meta);
    for (_, value) in fields {
        if value != 0 {
            put_var_uint(out, value);
        }
    }
    Ok(())
}

pub fn read_day_to_second<B: Buf>(buf: &mut B, precision: u8) -> Result<DaySecondInterval, WireError> {
    let meta = get_u8(buf)?;
    let mut field = |bit: u8| -> Result<u32, WireError> {
        if meta & bit != 0 {
            get_var_uint(buf)
        } else {
            Ok(0)
        }
    };
    let days = field(DAYS)?;
    let hours = field(HOURS)?;
    let minutes = field(MINUTES)?;
    let seconds = field(SECONDS)?;
    let fraction = field(FRACTION)?;

    let nanos = if precision == 0 {
        0
    } else {
        let precision = precision.min(MAX_PRECISION);
        fraction
            .checked_mul(10u32.pow(u32::from(MAX_PRECISION - precision)))
            .ok_or_else(|| WireError::ValueOutOfRange(format!("fraction {fraction}")))?
    };
    Ok(DaySecondInterval {
        negative: meta & NEGATIVE != 0,
        days,
        hours,
        minutes,
        seconds,
        nanos,
    })
}
