//! Result set column descriptors and the `TableHeader` payload.

use crate::codec::{get_bool, get_string, get_u8, get_var_uint, put_bool, put_string, put_var_uint};
use crate::error::WireError;
use crate::values::ValueCodec;
use bytes::{Buf, BufMut};
use obridge_core::{ColumnMeta, TypeTag};

pub const HAS_NULLABILITY: u8 = 1 << 0;
pub const HAS_SIZE: u8 = 1 << 1;
pub const HAS_PRECISION: u8 = 1 << 2;
pub const HAS_SCALE: u8 = 1 << 3;
pub const HAS_ALIASED: u8 = 1 << 4;
pub const HAS_EXPRESSION: u8 = 1 << 5;
pub const HAS_BASE_COLUMN: u8 = 1 << 6;
pub const HAS_BASE_TABLE: u8 = 1 << 7;

const MAX_NAME_BYTES: usize = 64 * 1024;

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Column metadata resolved once per query: presence mask, type tag and the
/// codec every row of the column goes through.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    meta: ColumnMeta,
    presence: u8,
    codec: ValueCodec,
}

impl ColumnDescriptor {
    pub fn new(meta: ColumnMeta) -> Self {
        let mut presence = 0;
        if meta.allow_null.is_some() {
            presence |= HAS_NULLABILITY;
        }
        if meta.size.is_some() {
            presence |= HAS_SIZE;
        }
        if meta.precision.is_some() {
            presence |= HAS_PRECISION;
        }
        if meta.scale.is_some() {
            presence |= HAS_SCALE;
        }
        if meta.is_aliased.is_some() {
            presence |= HAS_ALIASED;
        }
        if meta.is_expression.is_some() {
            presence |= HAS_EXPRESSION;
        }
        if non_empty(&meta.base_column_name) {
            presence |= HAS_BASE_COLUMN;
        }
        if non_empty(&meta.base_table_name) {
            presence |= HAS_BASE_TABLE;
        }

        // fractional second digits travel in the scale attribute
        let precision = meta.scale.unwrap_or(0).clamp(0, 9) as u8;
        let codec = ValueCodec::new(meta.native_type.type_tag(), precision);
        Self {
            meta,
            presence,
            codec,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.meta.ordinal
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn presence(&self) -> u8 {
        self.presence
    }

    pub fn type_tag(&self) -> TypeTag {
        self.codec.type_tag()
    }

    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    /// Unknown nullability counts as nullable.
    pub fn is_nullable(&self) -> bool {
        self.meta.allow_null.unwrap_or(true)
    }

    pub fn write_header<B: BufMut>(&self, out: &mut B) {
        let meta = &self.meta;
        out.put_u8(self.presence);
        put_string(out, &meta.name);
        out.put_u8(self.type_tag().wire_byte());
        if let Some(allow_null) = meta.allow_null {
            put_bool(out, allow_null);
        }
        if let Some(size) = meta.size {
            put_var_uint(out, size);
        }
        if let Some(precision) = meta.precision {
            out.put_u8(precision as u8);
        }
        if let Some(scale) = meta.scale {
            out.put_u8(scale as i8 as u8);
        }
        if let Some(aliased) = meta.is_aliased {
            put_bool(out, aliased);
        }
        if let Some(expression) = meta.is_expression {
            put_bool(out, expression);
        }
        if self.presence & HAS_BASE_COLUMN != 0 {
            put_string(out, meta.base_column_name.as_deref().unwrap_or_default());
        }
        if self.presence & HAS_BASE_TABLE != 0 {
            put_string(out, meta.base_table_name.as_deref().unwrap_or_default());
        }
    }
}

/// Client-side view of one `TableHeader` column entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_tag: TypeTag,
    pub allow_null: Option<bool>,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<i8>,
    pub is_aliased: Option<bool>,
    pub is_expression: Option<bool>,
    pub base_column_name: Option<String>,
    pub base_table_name: Option<String>,
}

impl ColumnInfo {
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let presence = get_u8(buf)?;
        let name = get_string(buf, MAX_NAME_BYTES)?;
        let tag_byte = get_u8(buf)?;
        let type_tag = TypeTag::from_wire(tag_byte).ok_or(WireError::UnknownTypeTag(tag_byte))?;
        let has = |bit: u8| presence & bit != 0;

        let allow_null = if has(HAS_NULLABILITY) { Some(get_bool(buf)?) } else { None };
        let size = if has(HAS_SIZE) { Some(get_var_uint(buf)?) } else { None };
        let precision = if has(HAS_PRECISION) { Some(get_u8(buf)?) } else { None };
        let scale = if has(HAS_SCALE) { Some(get_u8(buf)? as i8) } else { None };
        let is_aliased = if has(HAS_ALIASED) { Some(get_bool(buf)?) } else { None };
        let is_expression = if has(HAS_EXPRESSION) { Some(get_bool(buf)?) } else { None };
        let base_column_name = if has(HAS_BASE_COLUMN) {
            Some(get_string(buf, MAX_NAME_BYTES)?)
        } else {
            None
        };
        let base_table_name = if has(HAS_BASE_TABLE) {
            Some(get_string(buf, MAX_NAME_BYTES)?)
        } else {
            None
        };
        Ok(Self {
            name,
            type_tag,
            allow_null,
            size,
            precision,
            scale,
            is_aliased,
            is_expression,
            base_column_name,
            base_table_name,
        })
    }

    pub fn is_nullable(&self) -> bool {
        self.allow_null.unwrap_or(true)
    }

    /// Codec matching the one the server picked for this column.
    pub fn codec(&self) -> ValueCodec {
        let precision = self.scale.unwrap_or(0).clamp(0, 9) as u8;
        ValueCodec::new(self.type_tag, precision)
    }
}

/// Decode a `TableHeader` payload (without its tag byte).
pub fn decode_table_header<B: Buf>(buf: &mut B) -> Result<Vec<ColumnInfo>, WireError> {
    let count = get_var_uint(buf)? as usize;
    let mut columns = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        columns.push(ColumnInfo::decode(buf)?);
    }
    Ok(columns)
}
