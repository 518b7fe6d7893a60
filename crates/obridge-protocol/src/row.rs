//! `TableHeader` and `RowDataBatch` payloads.

use crate::codec::{get_bytes, put_var_uint};
use crate::column::{ColumnDescriptor, ColumnInfo};
use crate::error::WireError;
use bytes::{Buf, BufMut};
use obridge_core::{DriverError, FieldValue, RowCursor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Pack presence flags eight to a byte, least significant bit first. A set
/// bit marks a value that is present.
pub fn presence_mask<I: IntoIterator<Item = bool>>(present: I) -> Vec<u8> {
    let mut mask = Vec::new();
    let mut current = 0u8;
    let mut bit = 0;
    for flag in present {
        if flag {
            current |= 1 << bit;
        }
        bit += 1;
        if bit == 8 {
            mask.push(current);
            current = 0;
            bit = 0;
        }
    }
    if bit != 0 {
        mask.push(current);
    }
    mask
}

pub fn write_table_header<B: BufMut>(columns: &[ColumnDescriptor], out: &mut B) {
    put_var_uint(out, columns.len() as u32);
    for column in columns {
        column.write_header(out);
    }
}

/// Encode the cursor's current row: the presence mask over nullable columns
/// followed by every present value in column order.
pub fn write_row<B: BufMut>(
    columns: &[ColumnDescriptor],
    cursor: &dyn RowCursor,
    out: &mut B,
) -> Result<(), RowError> {
    let mask = presence_mask(
        columns
            .iter()
            .filter(|c| c.is_nullable())
            .map(|c| !cursor.is_null(c.ordinal())),
    );
    // values first, so a failed conversion leaves `out` untouched
    let mut values = Vec::new();
    for column in columns {
        if column.is_nullable() && cursor.is_null(column.ordinal()) {
            continue;
        }
        let value = cursor.field(column.ordinal())?;
        if value.is_null() {
            return Err(WireError::UnexpectedValue {
                tag: column.type_tag(),
                found: value.kind(),
            }
            .into());
        }
        column.codec().encode_framed(&value, &mut values)?;
    }
    out.put_slice(&mask);
    out.put_slice(&values);
    Ok(())
}

/// Decode one `RowDataBatch` payload (without its tag byte). Absent values
/// come back as [`FieldValue::Null`].
pub fn decode_row<B: Buf>(buf: &mut B, columns: &[ColumnInfo]) -> Result<Vec<FieldValue>, WireError> {
    let nullable = columns.iter().filter(|c| c.is_nullable()).count();
    let mask = get_bytes(buf, nullable.div_ceil(8))?;
    let mut bit = 0usize;
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        if column.is_nullable() {
            let present = mask[bit / 8] & (1 << (bit % 8)) != 0;
            bit += 1;
            if !present {
                row.push(FieldValue::Null);
                continue;
            }
        }
        row.push(column.codec().decode(buf)?);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_lsb_first_and_spills_into_new_bytes() {
        assert_eq!(presence_mask([false, true, false]), vec![0b010]);
        assert_eq!(presence_mask([true; 9]), vec![0xFF, 0x01]);
        assert!(presence_mask(std::iter::empty()).is_empty());
    }
}
