//! Field types and values exposed on features.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use pgeo_core_common::SqlType;

/// The type of a feature field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Integer64,
    /// Single precision float
    Float,
    /// Double precision float
    Double,
    String,
    DateTime,
    Binary,
}

impl FieldType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::Integer64 => "Integer64",
            FieldType::Float => "Float",
            FieldType::Double => "Double",
            FieldType::String => "String",
            FieldType::DateTime => "DateTime",
            FieldType::Binary => "Binary",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of one field in a layer schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// The column type reported by the engine.
    pub sql_type: SqlType,
}

/// Date layouts with a four-digit year first.
const YEAR_FIRST_LAYOUTS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Month-first layouts; `%y` is tried first so `1/30/20` is 2020, not year 20.
const MONTH_FIRST_LAYOUTS: [&str; 2] = ["%m/%d/%y", "%m/%d/%Y"];

const TIME_LAYOUTS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Canonical text form of date-time values.
pub const DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Parses `YYYY-MM-DD`, `YYYY/MM/DD` or `MM/DD/YY[YY]`, each optionally
/// followed by `HH:MM[:SS[.fff]]`. Fractional seconds are truncated.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let (date, time) = match text.split_once([' ', 'T']) {
        Some((date, time)) => (date, time.trim()),
        None => (text, ""),
    };

    let year_first = date.split(['-', '/']).next().is_some_and(|y| y.len() == 4);
    let layouts = if year_first {
        YEAR_FIRST_LAYOUTS
    } else {
        MONTH_FIRST_LAYOUTS
    };
    let date = layouts
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(date, layout).ok())?;

    let time = if time.is_empty() {
        NaiveTime::from_hms_opt(0, 0, 0)?
    } else {
        TIME_LAYOUTS
            .iter()
            .find_map(|layout| NaiveTime::parse_from_str(time, layout).ok())?
            .with_nanosecond(0)?
    };
    Some(date.and_time(time))
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i32),
    Integer64(i64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Integer view of integral values.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(i64::from(*v)),
            FieldValue::Integer64(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point view of any numeric value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(f64::from(*v)),
            FieldValue::Integer64(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(f64::from(*v)),
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Integer64(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            FieldValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}
