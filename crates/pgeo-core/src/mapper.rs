//! Mapping of engine column types to field types, and value coercion.
//!
//! Engines may return any scalar as text, so every coercion also accepts
//! trimmed text. A value that cannot be represented in its field type is an
//! error, never a silent null.

use pgeo_core_common::{RawValue, SqlType};

use crate::types::{FieldType, FieldValue, parse_datetime};

/// Returns the field type used for a column of `sql_type`.
#[must_use]
pub fn field_type(sql_type: SqlType) -> FieldType {
    match sql_type {
        SqlType::Bit | SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer => {
            FieldType::Integer
        },
        SqlType::BigInt => FieldType::Integer64,
        SqlType::Real => FieldType::Float,
        SqlType::Float | SqlType::Double | SqlType::Decimal | SqlType::Numeric => {
            FieldType::Double
        },
        SqlType::Char
        | SqlType::VarChar
        | SqlType::LongVarChar
        | SqlType::WChar
        | SqlType::WVarChar
        | SqlType::WLongVarChar
        | SqlType::Guid
        | SqlType::Other(_) => FieldType::String,
        SqlType::Date | SqlType::Time | SqlType::Timestamp => FieldType::DateTime,
        SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary => FieldType::Binary,
    }
}

/// Renders a raw value for error messages.
#[must_use]
pub fn describe(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => "NULL".to_string(),
        RawValue::Integer(v) => v.to_string(),
        RawValue::Real(v) => v.to_string(),
        RawValue::Text(s) => format!("'{s}'"),
        RawValue::Binary(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

fn parse_i64(raw: &RawValue) -> Option<i64> {
    match raw {
        RawValue::Integer(v) => Some(*v),
        RawValue::Real(_) | RawValue::Text(_) => raw.as_i64(),
        RawValue::Null | RawValue::Binary(_) => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn parse_f64(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Integer(v) => Some(*v as f64),
        RawValue::Real(v) => Some(*v),
        RawValue::Text(s) => s.trim().parse().ok(),
        RawValue::Null | RawValue::Binary(_) => None,
    }
}

fn parse_bit(raw: &RawValue) -> Option<i32> {
    if let RawValue::Text(s) = raw {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => return Some(1),
            "false" | "no" => return Some(0),
            _ => {},
        }
    }
    parse_i64(raw).map(|v| i32::from(v != 0))
}

/// Converts a raw value from a column of `sql_type` into a field value.
///
/// Returns `None` if the value does not fit the field type.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn coerce(raw: &RawValue, sql_type: SqlType) -> Option<FieldValue> {
    if raw.is_null() {
        return Some(FieldValue::Null);
    }
    match field_type(sql_type) {
        FieldType::Integer if sql_type == SqlType::Bit => parse_bit(raw).map(FieldValue::Integer),
        FieldType::Integer => parse_i64(raw)
            .and_then(|v| i32::try_from(v).ok())
            .map(FieldValue::Integer),
        FieldType::Integer64 => parse_i64(raw).map(FieldValue::Integer64),
        FieldType::Float => parse_f64(raw).map(|v| FieldValue::Float(v as f32)),
        FieldType::Double => parse_f64(raw).map(FieldValue::Double),
        FieldType::String => match raw {
            RawValue::Text(s) => Some(FieldValue::String(s.clone())),
            RawValue::Integer(v) => Some(FieldValue::String(v.to_string())),
            RawValue::Real(v) => Some(FieldValue::String(v.to_string())),
            RawValue::Null | RawValue::Binary(_) => None,
        },
        FieldType::DateTime => match raw {
            RawValue::Text(s) => parse_datetime(s).map(FieldValue::DateTime),
            _ => None,
        },
        FieldType::Binary => match raw {
            RawValue::Binary(bytes) => Some(FieldValue::Binary(bytes.clone())),
            _ => None,
        },
    }
}
