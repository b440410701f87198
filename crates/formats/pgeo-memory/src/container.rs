//! The `pgeo-json` container format.
//!
//! A container is a single JSON document:
//!
//! ```json
//! {
//!   "format": "pgeo-json",
//!   "version": 1,
//!   "tables": [
//!     {
//!       "name": "Parcels",
//!       "columns": [{ "name": "OBJECTID", "type": "Integer", "primary_key": true }],
//!       "rows": [[1]]
//!     }
//!   ]
//! }
//! ```
//!
//! Binary cells are hex strings. Bit columns accept JSON booleans, stored
//! with the engine convention of `-1` for true.

use std::fs;
use std::path::Path;

use log::{debug, info};
use pgeo_core_common::{
    ColumnDescriptor, Connector, RawValue, Row, SourceError, SourceResult, SqlType, TabularSource,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::{MemorySource, MemoryTable};

/// Value of the `format` marker.
pub const CONTAINER_FORMAT: &str = "pgeo-json";
/// Newest container version this crate reads.
pub const CONTAINER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ContainerFile {
    #[serde(default)]
    format: Option<String>,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    tables: Vec<TableFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    name: String,
    columns: Vec<ColumnFile>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnFile {
    name: String,
    #[serde(rename = "type")]
    sql_type: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
    #[serde(default)]
    primary_key: bool,
}

const fn default_version() -> u32 {
    CONTAINER_VERSION
}

const fn default_nullable() -> bool {
    true
}

fn is_integral(sql_type: SqlType) -> bool {
    matches!(
        sql_type,
        SqlType::Bit | SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
    )
}

fn is_real(sql_type: SqlType) -> bool {
    matches!(
        sql_type,
        SqlType::Real | SqlType::Float | SqlType::Double | SqlType::Decimal | SqlType::Numeric
    )
}

/// Converts a JSON cell into a raw value for a column of `sql_type`.
fn cell_to_raw(value: Value, sql_type: SqlType) -> Result<RawValue, String> {
    match value {
        Value::Null => Ok(RawValue::Null),
        Value::Bool(b) if is_integral(sql_type) => Ok(RawValue::Integer(if b { -1 } else { 0 })),
        Value::Number(n) if is_integral(sql_type) => n
            .as_i64()
            .map(RawValue::Integer)
            .ok_or_else(|| format!("{n} is not an integer")),
        Value::Number(n) if is_real(sql_type) => n
            .as_f64()
            .map(RawValue::Real)
            .ok_or_else(|| format!("{n} is not representable as a double")),
        Value::String(s) if sql_type.is_binary() => hex::decode(s.trim())
            .map(RawValue::Binary)
            .map_err(|err| format!("binary cells must be hex strings: {err}")),
        Value::String(s) if !is_integral(sql_type) && !is_real(sql_type) => Ok(RawValue::Text(s)),
        // Untyped columns keep whatever the document holds.
        Value::Number(n) if matches!(sql_type, SqlType::Other(_)) => Ok(n
            .as_i64()
            .map_or_else(|| RawValue::Real(n.as_f64().unwrap_or(f64::NAN)), RawValue::Integer)),
        other => Err(format!("{other} is not a valid {sql_type} value")),
    }
}

fn raw_to_cell(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Integer(v) => Value::from(*v),
        RawValue::Real(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        RawValue::Text(s) => Value::String(s.clone()),
        RawValue::Binary(bytes) => Value::String(hex::encode(bytes)),
    }
}

fn not_recognized(path: &Path, reason: impl Into<String>) -> SourceError {
    SourceError::NotRecognized {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn table_from_file(path: &Path, file: TableFile) -> SourceResult<MemoryTable> {
    let columns = file
        .columns
        .iter()
        .map(|c| -> SourceResult<ColumnDescriptor> {
            Ok(ColumnDescriptor::new(&c.name, c.sql_type.parse::<SqlType>()?)
                .with_nullable(c.nullable)
                .with_primary_key(c.primary_key))
        })
        .collect::<SourceResult<Vec<_>>>()?;

    let mut table = MemoryTable::new(file.name, columns);
    for (row_index, cells) in file.rows.into_iter().enumerate() {
        if cells.len() != table.columns().len() {
            return Err(not_recognized(
                path,
                format!(
                    "table '{}' row {row_index} has {} cells, expected {}",
                    table.name(),
                    cells.len(),
                    table.columns().len()
                ),
            ));
        }
        let row = cells
            .into_iter()
            .zip(table.columns())
            .map(|(cell, column)| {
                cell_to_raw(cell, column.sql_type).map_err(|reason| {
                    not_recognized(
                        path,
                        format!(
                            "table '{}' row {row_index} column '{}': {reason}",
                            table.name(),
                            column.name
                        ),
                    )
                })
            })
            .collect::<SourceResult<Row>>()?;
        table.push_row(row)?;
    }
    Ok(table)
}

impl MemorySource {
    /// Parses a `pgeo-json` document.
    ///
    /// `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotRecognized`] if the document is not a
    /// container of a supported version, and [`SourceError::UnknownType`] for
    /// unknown column types.
    pub fn from_json(text: &str, path: &Path) -> SourceResult<Self> {
        let file: ContainerFile = serde_json::from_str(text)
            .map_err(|err| not_recognized(path, format!("invalid JSON: {err}")))?;
        match file.format.as_deref() {
            Some(CONTAINER_FORMAT) => {},
            Some(other) => return Err(not_recognized(path, format!("unknown format '{other}'"))),
            None => return Err(not_recognized(path, "missing format marker")),
        }
        if file.version > CONTAINER_VERSION {
            return Err(not_recognized(
                path,
                format!("unsupported version {}", file.version),
            ));
        }

        let mut source = MemorySource::new();
        for table in file.tables {
            source.add_table(table_from_file(path, table)?);
        }
        Ok(source)
    }

    /// Serializes every table as a `pgeo-json` document.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Other`] if serialization fails.
    pub fn to_json(&self) -> SourceResult<String> {
        let file = ContainerFile {
            format: Some(CONTAINER_FORMAT.to_string()),
            version: CONTAINER_VERSION,
            tables: self
                .tables()
                .iter()
                .map(|table| TableFile {
                    name: table.name().to_string(),
                    columns: table
                        .columns()
                        .iter()
                        .map(|c| ColumnFile {
                            name: c.name.clone(),
                            sql_type: c.sql_type.as_str().to_string(),
                            nullable: c.nullable,
                            primary_key: c.primary_key,
                        })
                        .collect(),
                    rows: table
                        .rows()
                        .iter()
                        .map(|row| row.iter().map(raw_to_cell).collect())
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|err| SourceError::Other(err.to_string()))
    }

    /// Writes the container to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> SourceResult<()> {
        let text = self.to_json()?;
        fs::write(path, text).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Wrote container {} ({} tables)", path.display(), self.tables().len());
        Ok(())
    }
}

/// Opens `pgeo-json` container files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContainerConnector;

impl Connector for JsonContainerConnector {
    fn name(&self) -> &str {
        CONTAINER_FORMAT
    }

    fn connect(&self, path: &Path) -> SourceResult<Box<dyn TabularSource>> {
        debug!("Opening {} with the {} connector", path.display(), self.name());
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = MemorySource::from_json(&text, path)?;
        info!(
            "Loaded container {} with {} tables",
            path.display(),
            source.tables().len()
        );
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_cells_are_hex() {
        assert_eq!(
            cell_to_raw(Value::String("0a1B".into()), SqlType::LongVarBinary),
            Ok(RawValue::Binary(vec![0x0a, 0x1b]))
        );
        let err = cell_to_raw(Value::String("abc".into()), SqlType::LongVarBinary).unwrap_err();
        assert!(err.contains("hex"), "{err}");
        assert!(cell_to_raw(Value::String("zz".into()), SqlType::LongVarBinary).is_err());
        assert_eq!(
            raw_to_cell(&RawValue::Binary(vec![0, 255, 16])),
            Value::String("00ff10".into())
        );
    }

    #[test]
    fn cells_follow_column_types() {
        assert_eq!(
            cell_to_raw(Value::Bool(true), SqlType::Bit),
            Ok(RawValue::Integer(-1))
        );
        assert_eq!(
            cell_to_raw(Value::from(3), SqlType::Double),
            Ok(RawValue::Real(3.0))
        );
        assert_eq!(
            cell_to_raw(Value::from("2020/01/30 00:00:00"), SqlType::Timestamp),
            Ok(RawValue::Text("2020/01/30 00:00:00".into()))
        );
        assert!(cell_to_raw(Value::from(1.5), SqlType::Integer).is_err());
        assert!(cell_to_raw(Value::from("12"), SqlType::Integer).is_err());
        assert!(cell_to_raw(Value::from("0g"), SqlType::LongVarBinary).is_err());
    }

    #[test]
    fn rejects_documents_without_marker() {
        let err = MemorySource::from_json(r#"{"tables": []}"#, Path::new("x.json")).unwrap_err();
        assert!(matches!(err, SourceError::NotRecognized { .. }));
        assert!(err.to_string().contains("missing format marker"));

        let err = MemorySource::from_json("not json", Path::new("x.json")).unwrap_err();
        assert!(matches!(err, SourceError::NotRecognized { .. }));

        let err = MemorySource::from_json(
            r#"{"format": "pgeo-json", "version": 9}"#,
            Path::new("x.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported version 9"));
    }

    #[test]
    fn row_width_is_checked() {
        let text = r#"{
            "format": "pgeo-json",
            "tables": [{"name": "t", "columns": [{"name": "a", "type": "Long"}], "rows": [[1, 2]]}]
        }"#;
        let err = MemorySource::from_json(text, Path::new("t.json")).unwrap_err();
        assert!(err.to_string().contains("row 0 has 2 cells"));
    }
}
