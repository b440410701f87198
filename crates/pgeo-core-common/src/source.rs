//! Tabular source traits for reading geodatabase containers.
//!
//! This module defines the interface a backing engine must present: table
//! enumeration, column metadata, sequential row cursors, seek-by-identifier
//! and verbatim query execution. The geometry decoding and filtering engine in
//! `pgeo-core` consumes nothing else, so any engine (an ODBC session, an
//! in-memory fake) can stand behind it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Column type descriptor as reported by the backing engine.
///
/// The variants follow the SQL type codes an Access/ODBC engine reports for
/// table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Decimal,
    Numeric,
    Char,
    VarChar,
    LongVarChar,
    WChar,
    WVarChar,
    WLongVarChar,
    Guid,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    /// Engine specific type code with no standard mapping.
    Other(i32),
}

impl SqlType {
    /// Returns `true` for the binary column types that can hold shape blobs.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary
        )
    }

    /// Returns the canonical name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Bit => "Bit",
            SqlType::TinyInt => "TinyInt",
            SqlType::SmallInt => "SmallInt",
            SqlType::Integer => "Integer",
            SqlType::BigInt => "BigInt",
            SqlType::Real => "Real",
            SqlType::Float => "Float",
            SqlType::Double => "Double",
            SqlType::Decimal => "Decimal",
            SqlType::Numeric => "Numeric",
            SqlType::Char => "Char",
            SqlType::VarChar => "VarChar",
            SqlType::LongVarChar => "LongVarChar",
            SqlType::WChar => "WChar",
            SqlType::WVarChar => "WVarChar",
            SqlType::WLongVarChar => "WLongVarChar",
            SqlType::Guid => "Guid",
            SqlType::Date => "Date",
            SqlType::Time => "Time",
            SqlType::Timestamp => "Timestamp",
            SqlType::Binary => "Binary",
            SqlType::VarBinary => "VarBinary",
            SqlType::LongVarBinary => "LongVarBinary",
            SqlType::Other(_) => "Other",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Other(code) => write!(f, "Other({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for SqlType {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let ty = match normalized.as_str() {
            "bit" | "boolean" | "yesno" => SqlType::Bit,
            "tinyint" | "byte" => SqlType::TinyInt,
            "smallint" | "short" => SqlType::SmallInt,
            "integer" | "int" | "long" | "counter" => SqlType::Integer,
            "bigint" => SqlType::BigInt,
            "real" | "single" => SqlType::Real,
            "float" => SqlType::Float,
            "double" => SqlType::Double,
            "decimal" | "currency" => SqlType::Decimal,
            "numeric" => SqlType::Numeric,
            "char" => SqlType::Char,
            "varchar" | "text" => SqlType::VarChar,
            "longvarchar" | "memo" => SqlType::LongVarChar,
            "wchar" => SqlType::WChar,
            "wvarchar" => SqlType::WVarChar,
            "wlongvarchar" => SqlType::WLongVarChar,
            "guid" => SqlType::Guid,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "timestamp" | "datetime" => SqlType::Timestamp,
            "binary" => SqlType::Binary,
            "varbinary" => SqlType::VarBinary,
            "longvarbinary" | "longbinary" | "oleobject" | "blob" => SqlType::LongVarBinary,
            "other" => SqlType::Other(0),
            _ => {
                return Err(SourceError::UnknownType {
                    name: s.to_string(),
                });
            },
        };
        Ok(ty)
    }
}

/// Metadata for one column of a table or query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name as reported by the engine.
    pub name: String,
    /// Engine type descriptor.
    pub sql_type: SqlType,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the engine reports this column as (part of) the primary key.
    pub primary_key: bool,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            primary_key: false,
        }
    }

    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }
}

/// A raw column value as handed back by the engine.
///
/// Engines are free to return every scalar as text; typed coercion happens
/// downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Binary(Vec<u8>),
}

impl RawValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Interprets the value as an integer identifier, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Integer(v) => Some(*v),
            #[allow(clippy::cast_possible_truncation)]
            RawValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            RawValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Integer(i64::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Real(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        RawValue::Binary(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

/// One row, positionally aligned with the cursor's columns.
pub type Row = Vec<RawValue>;

/// Errors reported by a backing engine.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The container could not be read from disk.
    #[error("Failed to read container '{path}': {source}")]
    Io {
        /// The container path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a container this engine understands.
    #[error("'{path}' is not a recognized container: {reason}")]
    NotRecognized {
        /// The container path
        path: PathBuf,
        /// Why the content was rejected
        reason: String,
    },

    /// A table name did not resolve.
    #[error("No such table: '{0}'")]
    NoSuchTable(String),

    /// A column name did not resolve.
    #[error("No such column '{column}' in '{table}'")]
    NoSuchColumn {
        /// The table or result being addressed
        table: String,
        /// The missing column
        column: String,
    },

    /// The engine rejected or failed to run a query.
    #[error("Query failed: {message} (query: {sql})")]
    Query {
        /// The query text as submitted
        sql: String,
        /// Engine diagnostic
        message: String,
    },

    /// A type name in container metadata is not known.
    #[error("Unknown column type '{name}'")]
    UnknownType {
        /// The type name as found
        name: String,
    },

    /// Catch-all for engine specific failures.
    #[error("{0}")]
    Other(String),
}

/// Result type alias that uses [`SourceError`].
pub type SourceResult<T> = Result<T, SourceError>;

/// A forward-only cursor over rows.
pub trait RowCursor {
    /// Columns describing every row this cursor yields.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Fetches the next row, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails while fetching.
    fn next_row(&mut self) -> SourceResult<Option<Row>>;
}

/// The result of running a query: its columns plus a cursor over the rows.
pub struct QueryResult {
    /// Result columns. An empty list means the statement produced no result set.
    pub columns: Vec<ColumnDescriptor>,
    /// Cursor over the result rows.
    pub cursor: Box<dyn RowCursor>,
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Trait for the tabular engine behind a container.
///
/// Implementations own the connection to the container. Cursors they hand out
/// must not borrow from the source, so a layer can hold a cursor across calls.
pub trait TabularSource {
    /// Lists all user tables in the engine's natural enumeration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table catalog cannot be read.
    fn list_tables(&self) -> SourceResult<Vec<String>>;

    /// Returns column metadata for `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoSuchTable`] for unknown tables.
    fn columns(&self, table: &str) -> SourceResult<Vec<ColumnDescriptor>>;

    /// Opens a cursor over every row of `table` in natural order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoSuchTable`] for unknown tables.
    fn scan(&self, table: &str) -> SourceResult<Box<dyn RowCursor>>;

    /// Fetches the row of `table` whose `key_column` equals `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or column does not exist.
    fn fetch(&self, table: &str, key_column: &str, id: i64) -> SourceResult<Option<Row>>;

    /// Returns the number of rows in `table` when the engine can count cheaply.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails while counting.
    fn count_rows(&self, _table: &str) -> SourceResult<Option<u64>> {
        Ok(None)
    }

    /// Runs `sql` verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Query`] if the engine rejects the statement.
    fn query(&self, sql: &str) -> SourceResult<QueryResult>;
}

/// Opens a container file and hands back the engine serving it.
pub trait Connector {
    /// Short name of the engine, used in diagnostics.
    fn name(&self) -> &str;

    /// Connects to the container at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be read and
    /// [`SourceError::NotRecognized`] if it is not a container this engine understands.
    fn connect(&self, path: &Path) -> SourceResult<Box<dyn TabularSource>>;
}

/// A cursor over rows that are already materialized.
#[derive(Debug)]
pub struct VecCursor {
    columns: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<Row>,
}

impl VecCursor {
    #[must_use]
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_type_from_str_accepts_access_names() {
        assert_eq!("Long".parse::<SqlType>().unwrap(), SqlType::Integer);
        assert_eq!("memo".parse::<SqlType>().unwrap(), SqlType::LongVarChar);
        assert_eq!("DateTime".parse::<SqlType>().unwrap(), SqlType::Timestamp);
        assert_eq!(
            "LongBinary".parse::<SqlType>().unwrap(),
            SqlType::LongVarBinary
        );
    }

    #[test]
    fn sql_type_from_str_rejects_unknown() {
        let err = "hyperlink".parse::<SqlType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown column type 'hyperlink'");
    }

    #[test]
    fn binary_types_are_flagged() {
        assert!(SqlType::LongVarBinary.is_binary());
        assert!(SqlType::VarBinary.is_binary());
        assert!(!SqlType::VarChar.is_binary());
    }

    #[test]
    fn raw_value_as_i64() {
        assert_eq!(RawValue::Integer(7).as_i64(), Some(7));
        assert_eq!(RawValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(RawValue::Real(3.0).as_i64(), Some(3));
        assert_eq!(RawValue::Real(3.5).as_i64(), None);
        assert_eq!(RawValue::Null.as_i64(), None);
    }

    #[test]
    fn vec_cursor_yields_rows_in_order() {
        let columns = vec![ColumnDescriptor::new("id", SqlType::Integer)];
        let mut cursor = VecCursor::new(columns, vec![vec![1.into()], vec![2.into()]]);

        assert_eq!(cursor.columns().len(), 1);
        assert_eq!(cursor.next_row().unwrap(), Some(vec![RawValue::Integer(1)]));
        assert_eq!(cursor.next_row().unwrap(), Some(vec![RawValue::Integer(2)]));
        assert_eq!(cursor.next_row().unwrap(), None);
    }
}
