//! Per-type field encoders. A [`ValueCodec`] is chosen once per column (or
//! parameter) and then applied to every value of that column.

pub mod datetime;
pub mod interval;
pub mod number;

use crate::codec::{get_bool, get_bytes, get_f32, get_f64, get_string, get_var_uint, put_bool, put_string, put_var_uint};
use crate::error::WireError;
use bytes::{Buf, BufMut};
use obridge_core::{FieldValue, TypeTag};
use uuid::Uuid;

pub use datetime::WireDateTime;
pub use number::{decode_number, DecimalNumber, EncodedNumber};

const GUID_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    Boolean,
    Float,
    Double,
    Number,
    String,
    Binary,
    Guid,
    DateTime { precision: u8 },
    DateTimeTz { precision: u8 },
    IntervalYearToMonth,
    IntervalDayToSecond { precision: u8 },
}

impl ValueCodec {
    /// `precision` is the fractional second digit count; ignored by tags
    /// that do not use it.
    pub fn new(tag: TypeTag, precision: u8) -> Self {
        let precision = precision.min(datetime::MAX_PRECISION);
        match tag {
            TypeTag::Boolean => ValueCodec::Boolean,
            TypeTag::Float => ValueCodec::Float,
            TypeTag::Double => ValueCodec::Double,
            TypeTag::Number => ValueCodec::Number,
            TypeTag::String => ValueCodec::String,
            TypeTag::Binary => ValueCodec::Binary,
            TypeTag::Guid => ValueCodec::Guid,
            TypeTag::DateTime => ValueCodec::DateTime { precision },
            TypeTag::DateTimeTz => ValueCodec::DateTimeTz { precision },
            TypeTag::IntervalYearToMonth => ValueCodec::IntervalYearToMonth,
            TypeTag::IntervalDayToSecond => ValueCodec::IntervalDayToSecond { precision },
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            ValueCodec::Boolean => TypeTag::Boolean,
            ValueCodec::Float => TypeTag::Float,
            ValueCodec::Double => TypeTag::Double,
            ValueCodec::Number => TypeTag::Number,
            ValueCodec::String => TypeTag::String,
            ValueCodec::Binary => TypeTag::Binary,
            ValueCodec::Guid => TypeTag::Guid,
            ValueCodec::DateTime { .. } => TypeTag::DateTime,
            ValueCodec::DateTimeTz { .. } => TypeTag::DateTimeTz,
            ValueCodec::IntervalYearToMonth => TypeTag::IntervalYearToMonth,
            ValueCodec::IntervalDayToSecond { .. } => TypeTag::IntervalDayToSecond,
        }
    }

    pub fn precision(&self) -> u8 {
        match self {
            ValueCodec::DateTime { precision }
            | ValueCodec::DateTimeTz { precision }
            | ValueCodec::IntervalDayToSecond { precision } => *precision,
            _ => 0,
        }
    }

    fn unexpected(&self, value: &FieldValue) -> WireError {
        WireError::UnexpectedValue {
            tag: self.type_tag(),
            found: value.kind(),
        }
    }

    /// Write the bare encoding of `value`. Binary values carry no length;
    /// callers that need one use [`ValueCodec::encode_framed`]. Nothing is
    /// written when conversion fails.
    pub fn encode<B: BufMut>(&self, value: &FieldValue, out: &mut B) -> Result<(), WireError> {
        match (self, value) {
            (ValueCodec::Boolean, FieldValue::Boolean(v)) => put_bool(out, *v),
            (ValueCodec::Float, FieldValue::Float(v)) => out.put_f32_le(*v),
            (ValueCodec::Double, FieldValue::Double(v)) => out.put_f64_le(*v),
            (ValueCodec::Double, FieldValue::Float(v)) => out.put_f64_le(f64::from(*v)),
            (ValueCodec::Number, FieldValue::Number(text)) => EncodedNumber::parse(text)?.write(out),
            (ValueCodec::Number, FieldValue::Integer(v)) => {
                EncodedNumber::parse(&v.to_string())?.write(out)
            }
            (ValueCodec::String, FieldValue::String(text))
            | (ValueCodec::String, FieldValue::Number(text)) => put_string(out, text),
            (ValueCodec::Binary, FieldValue::Binary(bytes)) => out.put_slice(bytes),
            (ValueCodec::Guid, FieldValue::Guid(guid)) => out.put_slice(guid.as_bytes()),
            (ValueCodec::Guid, FieldValue::Binary(bytes)) if bytes.len() == GUID_BYTES => {
                out.put_slice(bytes)
            }
            (ValueCodec::DateTime { precision }, FieldValue::DateTime(local)) => {
                WireDateTime::naive(*local).write(*precision, out)?
            }
            (ValueCodec::DateTime { precision }, FieldValue::DateTimeTz(zoned)) => {
                WireDateTime::naive(zoned.naive_local()).write(*precision, out)?
            }
            (ValueCodec::DateTimeTz { precision }, FieldValue::DateTimeTz(zoned)) => {
                WireDateTime::zoned(*zoned).write(*precision, out)?
            }
            (ValueCodec::DateTimeTz { precision }, FieldValue::DateTime(local)) => {
                WireDateTime::naive(*local).write(*precision, out)?
            }
            (ValueCodec::IntervalYearToMonth, FieldValue::IntervalYearToMonth(months)) => {
                interval::write_year_to_month(*months, out)
            }
            (ValueCodec::IntervalDayToSecond { precision }, FieldValue::IntervalDayToSecond(v)) => {
                interval::write_day_to_second(v, *precision, out)?
            }
            (_, other) => return Err(self.unexpected(other)),
        }
        Ok(())
    }

    /// Row and parameter framing: binary values are preceded by their
    /// VarUInt length, everything else is self-delimiting.
    pub fn encode_framed<B: BufMut>(&self, value: &FieldValue, out: &mut B) -> Result<(), WireError> {
        if let (ValueCodec::Binary, FieldValue::Binary(bytes)) = (self, value) {
            put_var_uint(out, bytes.len() as u32);
            out.put_slice(bytes);
            return Ok(());
        }
        self.encode(value, out)
    }

    /// Read one framed value.
    pub fn decode<B: Buf>(&self, buf: &mut B) -> Result<FieldValue, WireError> {
        let value = match self {
            ValueCodec::Boolean => FieldValue::Boolean(get_bool(buf)?),
            ValueCodec::Float => FieldValue::Float(get_f32(buf)?),
            ValueCodec::Double => FieldValue::Double(get_f64(buf)?),
            ValueCodec::Number => FieldValue::Number(decode_number(buf)?),
            ValueCodec::String => FieldValue::String(get_string(buf, usize::MAX)?),
            ValueCodec::Binary => {
                let length = get_var_uint(buf)? as usize;
                FieldValue::Binary(get_bytes(buf, length)?)
            }
            ValueCodec::Guid => {
                let bytes = get_bytes(buf, GUID_BYTES)?;
                let guid = Uuid::from_slice(&bytes)
                    .map_err(|_| WireError::protocol("guid must be 16 bytes"))?;
                FieldValue::Guid(guid)
            }
            ValueCodec::DateTime { precision } => {
                FieldValue::DateTime(WireDateTime::decode(buf, *precision)?.local)
            }
            ValueCodec::DateTimeTz { precision } => {
                FieldValue::DateTimeTz(WireDateTime::decode(buf, *precision)?.to_zoned()?)
            }
            ValueCodec::IntervalYearToMonth => {
                FieldValue::IntervalYearToMonth(interval::read_year_to_month(buf)?)
            }
            ValueCodec::IntervalDayToSecond { precision } => {
                FieldValue::IntervalDayToSecond(interval::read_day_to_second(buf, *precision)?)
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn framed(codec: ValueCodec, value: &FieldValue) -> Vec<u8> {
        let mut out = Vec::new();
        codec.encode_framed(value, &mut out).expect("encode");
        out
    }

    #[test]
    fn fixed_width_values_are_little_endian() {
        assert_eq!(framed(ValueCodec::Boolean, &FieldValue::Boolean(true)), vec![1]);
        assert_eq!(
            framed(ValueCodec::Float, &FieldValue::Float(1.0)),
            1.0f32.to_le_bytes().to_vec()
        );
        assert_eq!(
            framed(ValueCodec::Double, &FieldValue::Float(0.5)),
            0.5f64.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn binary_is_bare_unless_framed() {
        let value = FieldValue::Binary(vec![0xDE, 0xAD]);
        let mut bare = Vec::new();
        ValueCodec::Binary.encode(&value, &mut bare).expect("encode");
        assert_eq!(bare, vec![0xDE, 0xAD]);

        let bytes = framed(ValueCodec::Binary, &value);
        assert_eq!(bytes, vec![2, 0xDE, 0xAD]);
        assert_eq!(ValueCodec::Binary.decode(&mut &bytes[..]).expect("decode"), value);
    }

    #[test]
    fn integers_go_through_the_number_path() {
        assert_eq!(framed(ValueCodec::Number, &FieldValue::Integer(1)), vec![0x81]);
        let bytes = framed(ValueCodec::Number, &FieldValue::Integer(-250));
        assert_eq!(
            ValueCodec::Number.decode(&mut &bytes[..]).expect("decode"),
            FieldValue::Number("-250".into())
        );
    }

    #[test]
    fn guid_uses_standard_byte_order() {
        let guid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").expect("uuid");
        let bytes = framed(ValueCodec::Guid, &FieldValue::Guid(guid));
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[15], 0xFF);
        assert_eq!(
            ValueCodec::Guid.decode(&mut &bytes[..]).expect("decode"),
            FieldValue::Guid(guid)
        );
    }

    #[test]
    fn precision_only_sticks_to_temporal_codecs() {
        assert_eq!(ValueCodec::new(TypeTag::DateTime, 12), ValueCodec::DateTime { precision: 9 });
        assert_eq!(ValueCodec::new(TypeTag::Number, 6).precision(), 0);
        let local = NaiveDate::from_ymd_opt(2024, 5, 6)
            .expect("date")
            .and_hms_milli_opt(7, 8, 9, 10)
            .expect("time");
        let codec = ValueCodec::new(TypeTag::DateTime, 3);
        let bytes = framed(codec, &FieldValue::DateTime(local));
        assert_eq!(codec.decode(&mut &bytes[..]).expect("decode"), FieldValue::DateTime(local));
    }

    #[test]
    fn mismatched_values_are_rejected_without_output() {
        let mut out = Vec::new();
        let err = ValueCodec::Boolean
            .encode(&FieldValue::String("yes".into()), &mut out)
            .expect_err("mismatch");
        assert!(matches!(
            err,
            WireError::UnexpectedValue {
                tag: TypeTag::Boolean,
                found: "string"
            }
        ));
        assert!(!err.is_fatal());
        assert!(out.is_empty());

        let err = ValueCodec::Number
            .encode(&FieldValue::Number("1.2.3".into()), &mut out)
            .expect_err("bad number");
        assert!(matches!(err, WireError::InvalidNumber(_)));
        assert!(out.is_empty());
    }
}
