use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire type category of a field. The byte values are part of the protocol
/// and never change between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Boolean,
    Float,
    Double,
    DateTime,
    DateTimeTz,
    IntervalDayToSecond,
    IntervalYearToMonth,
    Guid,
    String,
    Binary,
    Number,
}

impl TypeTag {
    pub fn wire_byte(self) -> u8 {
        match self {
            TypeTag::Boolean => 0x01,
            TypeTag::Float => 0x03,
            TypeTag::Double => 0x04,
            TypeTag::DateTime => 0x05,
            TypeTag::DateTimeTz => 0x06,
            TypeTag::IntervalDayToSecond => 0x07,
            TypeTag::IntervalYearToMonth => 0x08,
            TypeTag::Guid => 0x09,
            TypeTag::String => 0x10,
            TypeTag::Binary => 0x11,
            TypeTag::Number => 0x20,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        let tag = match byte {
            0x01 => TypeTag::Boolean,
            0x03 => TypeTag::Float,
            0x04 => TypeTag::Double,
            0x05 => TypeTag::DateTime,
            0x06 => TypeTag::DateTimeTz,
            0x07 => TypeTag::IntervalDayToSecond,
            0x08 => TypeTag::IntervalYearToMonth,
            0x09 => TypeTag::Guid,
            0x10 => TypeTag::String,
            0x11 => TypeTag::Binary,
            0x20 => TypeTag::Number,
            _ => return None,
        };
        Some(tag)
    }

    /// Whether the column precision (fractional second digits) shapes the encoding.
    pub fn uses_precision(self) -> bool {
        matches!(
            self,
            TypeTag::DateTime | TypeTag::DateTimeTz | TypeTag::IntervalDayToSecond
        )
    }
}

/// Upstream column type family as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    Number,
    Date,
    Timestamp,
    TimestampWithTimeZone,
    TimestampWithLocalTimeZone,
    IntervalYearToMonth,
    IntervalDayToSecond,
    Char,
    Raw,
    Boolean,
    BinaryFloat,
    BinaryDouble,
    Guid,
    #[default]
    Unknown,
}

impl NativeType {
    /// Classify a driver type name such as `NUMBER(10,2)` or
    /// `TIMESTAMP(6) WITH TIME ZONE`. Intended to run once per column.
    pub fn from_type_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        let base = strip_type_modifiers(&lower);
        let s = base.as_str();
        if s.starts_with("number")
            || s == "integer"
            || s == "int"
            || s == "smallint"
            || s == "decimal"
            || s == "numeric"
            || s == "float"
        {
            return NativeType::Number;
        }
        if s == "date" {
            return NativeType::Date;
        }
        if s.starts_with("timestamp") {
            if s == "timestamp with time zone" {
                return NativeType::TimestampWithTimeZone;
            }
            if s == "timestamp with local time zone" {
                return NativeType::TimestampWithLocalTimeZone;
            }
            return NativeType::Timestamp;
        }
        if s.starts_with("interval year") {
            return NativeType::IntervalYearToMonth;
        }
        if s.starts_with("interval day") {
            return NativeType::IntervalDayToSecond;
        }
        match s {
            "char" | "nchar" | "varchar" | "varchar2" | "nvarchar2" | "clob" | "nclob"
            | "long" | "rowid" | "urowid" => NativeType::Char,
            "raw" | "long raw" | "blob" | "bfile" => NativeType::Raw,
            "boolean" | "bool" => NativeType::Boolean,
            "binary_float" => NativeType::BinaryFloat,
            "binary_double" => NativeType::BinaryDouble,
            "guid" | "uuid" => NativeType::Guid,
            _ => NativeType::Unknown,
        }
    }

    pub fn type_tag(self) -> TypeTag {
        match self {
            NativeType::Number => TypeTag::Number,
            NativeType::Date | NativeType::Timestamp | NativeType::TimestampWithLocalTimeZone => {
                TypeTag::DateTime
            }
            NativeType::TimestampWithTimeZone => TypeTag::DateTimeTz,
            NativeType::IntervalYearToMonth => TypeTag::IntervalYearToMonth,
            NativeType::IntervalDayToSecond => TypeTag::IntervalDayToSecond,
            NativeType::Char | NativeType::Unknown => TypeTag::String,
            NativeType::Raw => TypeTag::Binary,
            NativeType::Boolean => TypeTag::Boolean,
            NativeType::BinaryFloat => TypeTag::Float,
            NativeType::BinaryDouble => TypeTag::Double,
            NativeType::Guid => TypeTag::Guid,
        }
    }
}

// "timestamp(6) with time zone" -> "timestamp with time zone"
fn strip_type_modifiers(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for ch in name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Column metadata as reported by the upstream driver. Optional attributes are
/// `None` when the driver did not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    #[serde(default)]
    pub ordinal: usize,
    pub name: String,
    #[serde(default)]
    pub native_type: NativeType,
    /// Driver type name such as `NUMBER(10,2)`; overrides `native_type`
    /// once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub allow_null: Option<bool>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub precision: Option<i16>,
    #[serde(default)]
    pub scale: Option<i16>,
    #[serde(default)]
    pub is_aliased: Option<bool>,
    #[serde(default)]
    pub is_expression: Option<bool>,
    #[serde(default)]
    pub base_column_name: Option<String>,
    #[serde(default)]
    pub base_table_name: Option<String>,
}

impl ColumnMeta {
    pub fn new(ordinal: usize, name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            ordinal,
            name: name.into(),
            native_type,
            type_name: None,
            allow_null: None,
            size: None,
            precision: None,
            scale: None,
            is_aliased: None,
            is_expression: None,
            base_column_name: None,
            base_table_name: None,
        }
    }

    /// Classify `type_name`, if present, into `native_type`.
    pub fn resolve_type_name(&mut self) {
        if let Some(type_name) = &self.type_name {
            self.native_type = NativeType::from_type_name(type_name);
        }
    }

    pub fn nullable(mut self, allow_null: bool) -> Self {
        self.allow_null = Some(allow_null);
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_precision(mut self, precision: i16, scale: i16) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_scale(mut self, scale: i16) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_base(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.base_table_name = Some(table.into());
        self.base_column_name = Some(column.into());
        self
    }
}

/// Signed day-to-second interval split into its display fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DaySecondInterval {
    pub negative: bool,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub nanos: u32,
}

/// A single field as handed over by the driver's row cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Float(f32),
    Double(f64),
    Integer(i64),
    /// Arbitrary precision decimal in plain text, e.g. `-12.340`.
    Number(String),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    /// Signed total months.
    IntervalYearToMonth(i32),
    IntervalDayToSecond(DaySecondInterval),
    Guid(Uuid),
    String(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Float(_) => "float",
            FieldValue::Double(_) => "double",
            FieldValue::Integer(_) => "integer",
            FieldValue::Number(_) => "number",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::DateTimeTz(_) => "datetime with time zone",
            FieldValue::IntervalYearToMonth(_) => "interval year to month",
            FieldValue::IntervalDayToSecond(_) => "interval day to second",
            FieldValue::Guid(_) => "guid",
            FieldValue::String(_) => "string",
            FieldValue::Binary(_) => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    pub fn wire_byte(self) -> u8 {
        match self {
            ParameterDirection::Input => 1,
            ParameterDirection::Output => 2,
            ParameterDirection::InputOutput => 3,
            ParameterDirection::ReturnValue => 6,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ParameterDirection::Input),
            2 => Some(ParameterDirection::Output),
            3 => Some(ParameterDirection::InputOutput),
            6 => Some(ParameterDirection::ReturnValue),
            _ => None,
        }
    }

    pub fn carries_input(self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }

    pub fn carries_output(self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

/// Named statement parameter bound before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub type_tag: TypeTag,
    pub direction: ParameterDirection,
    /// Fractional second digits for date/time and day-second parameters.
    pub precision: u8,
    pub value: FieldValue,
}
