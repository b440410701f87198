//! Schema discovery.
//!
//! Tables come from the engine in its natural order. A table is spatial when
//! the geometry registry names it together with one of its columns; the
//! registry is authoritative, so a shape column without a registry entry is
//! just a binary field. Registry problems degrade the affected table to
//! non-spatial and are kept as [`SchemaError`]s.

use std::sync::Arc;

use log::{debug, warn};
use pgeo_core_common::{ColumnDescriptor, RawValue, Row, SourceError, TabularSource};
use pgeo_shape::{Dimension, Envelope, GeometryKind, GeometryType};

use crate::error::{OpenError, SchemaError};
use crate::mapper;
use crate::options::OpenOptions;
use crate::types::FieldDefn;

const REGISTRY_COLUMNS: [&str; 10] = [
    "TableName",
    "FieldName",
    "ShapeType",
    "ExtentLeft",
    "ExtentRight",
    "ExtentBottom",
    "ExtentTop",
    "SRID",
    "HasZ",
    "HasM",
];

pub(crate) const DEFAULT_FID_COLUMN: &str = "OBJECTID";

/// The geometry column of a spatial layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryField {
    /// Column holding the shape blobs.
    pub column: String,
    /// Declared, already promoted, geometry type.
    pub geometry_type: GeometryType,
    /// Extent recorded in the registry.
    pub extent: Option<Envelope>,
    pub srid: Option<i64>,
}

/// Schema of one layer: its fields, geometry and identifier column, plus the
/// positions of each in a raw engine row.
#[derive(Debug, Clone)]
pub struct LayerSchema {
    name: String,
    fields: Vec<FieldDefn>,
    geometry: Option<GeometryField>,
    fid_column: Option<String>,
    field_indices: Vec<usize>,
    geometry_index: Option<usize>,
    fid_index: Option<usize>,
}

fn position(columns: &[ColumnDescriptor], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
}

impl LayerSchema {
    /// Builds a schema over `columns`. The geometry column is left out of the
    /// fields; the identifier column stays a field.
    pub(crate) fn new(
        name: impl Into<String>,
        columns: &[ColumnDescriptor],
        geometry: Option<GeometryField>,
        fid_column: Option<&str>,
    ) -> Self {
        let geometry_index = geometry.as_ref().and_then(|g| position(columns, &g.column));
        let geometry = geometry.filter(|_| geometry_index.is_some());
        let fid_index = fid_column.and_then(|c| position(columns, c));

        let mut fields = Vec::with_capacity(columns.len());
        let mut field_indices = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            if Some(index) == geometry_index {
                continue;
            }
            fields.push(FieldDefn {
                name: column.name.clone(),
                field_type: mapper::field_type(column.sql_type),
                nullable: column.nullable,
                sql_type: column.sql_type,
            });
            field_indices.push(index);
        }

        Self {
            name: name.into(),
            fields,
            geometry,
            fid_column: fid_index.map(|i| columns[i].name.clone()),
            field_indices,
            geometry_index,
            fid_index,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDefn] {
        &self.fields
    }

    /// Case-insensitive field lookup.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)))
    }

    #[must_use]
    pub fn is_spatial(&self) -> bool {
        self.geometry.is_some()
    }

    #[must_use]
    pub fn geometry(&self) -> Option<&GeometryField> {
        self.geometry.as_ref()
    }

    #[must_use]
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref().map(|g| g.geometry_type)
    }

    #[must_use]
    pub fn fid_column(&self) -> Option<&str> {
        self.fid_column.as_deref()
    }

    pub(crate) fn field_indices(&self) -> &[usize] {
        &self.field_indices
    }

    pub(crate) fn geometry_index(&self) -> Option<usize> {
        self.geometry_index
    }

    /// Identifier of a raw row: the identifier column's value when there is
    /// one, otherwise the scan ordinal. `None` when the identifier column
    /// holds no integer.
    pub(crate) fn row_fid(&self, row: &Row, ordinal: i64) -> Option<i64> {
        match self.fid_index {
            Some(index) => row.get(index).and_then(RawValue::as_i64),
            None => Some(ordinal),
        }
    }

    pub(crate) fn fid_index(&self) -> Option<usize> {
        self.fid_index
    }

    /// Copy of this schema with the geometry kind replaced.
    pub(crate) fn with_geometry_kind(&self, kind: GeometryKind) -> Self {
        let mut schema = self.clone();
        if let Some(geometry) = schema.geometry.as_mut() {
            geometry.geometry_type = GeometryType::new(kind, geometry.geometry_type.dimension);
        }
        schema
    }
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    table: String,
    field: String,
    shape_type: i64,
    extent: Option<Envelope>,
    srid: Option<i64>,
    has_z: bool,
    has_m: bool,
}

#[allow(clippy::cast_precision_loss)]
fn raw_f64(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Integer(v) => Some(*v as f64),
        RawValue::Real(v) => Some(*v),
        RawValue::Text(s) => s.trim().parse().ok(),
        RawValue::Null | RawValue::Binary(_) => None,
    }
}

fn raw_text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

impl RegistryEntry {
    /// `row` holds the registry columns in [`REGISTRY_COLUMNS`] order.
    fn from_row(index: usize, row: &[RawValue]) -> Result<Self, SchemaError> {
        let invalid = |message: &str| SchemaError::InvalidRegistryRow {
            row: index,
            message: message.to_string(),
        };
        let table = raw_text(&row[0]).ok_or_else(|| invalid("TableName is empty"))?;
        let field = raw_text(&row[1]).ok_or_else(|| invalid("FieldName is empty"))?;
        let shape_type = row[2]
            .as_i64()
            .ok_or_else(|| invalid("ShapeType is not an integer"))?;

        let extent = match (
            raw_f64(&row[3]),
            raw_f64(&row[4]),
            raw_f64(&row[5]),
            raw_f64(&row[6]),
        ) {
            (Some(left), Some(right), Some(bottom), Some(top)) => {
                Some(Envelope::new(left, bottom, right, top))
            },
            _ => None,
        };

        Ok(Self {
            table,
            field,
            shape_type,
            extent,
            srid: row[7].as_i64(),
            has_z: row[8].as_i64().is_some_and(|v| v != 0),
            has_m: row[9].as_i64().is_some_and(|v| v != 0),
        })
    }

    fn geometry_kind(&self) -> Result<GeometryKind, SchemaError> {
        match self.shape_type {
            1 => Ok(GeometryKind::Point),
            2 => Ok(GeometryKind::MultiPoint),
            3 => Ok(GeometryKind::LineString.promoted()),
            4 => Ok(GeometryKind::Polygon.promoted()),
            code => Err(SchemaError::UnsupportedShapeType {
                table: self.table.clone(),
                code,
            }),
        }
    }

    fn resolve(&self, columns: &[ColumnDescriptor]) -> Result<GeometryField, SchemaError> {
        let kind = self.geometry_kind()?;
        let column = position(columns, &self.field)
            .map(|i| columns[i].name.clone())
            .ok_or_else(|| SchemaError::MissingColumn {
                table: self.table.clone(),
                column: self.field.clone(),
            })?;
        Ok(GeometryField {
            column,
            geometry_type: GeometryType::new(kind, Dimension::from_flags(self.has_z, self.has_m)),
            extent: self.extent,
            srid: self.srid,
        })
    }
}

fn read_registry(
    source: &dyn TabularSource,
    registry: &str,
) -> Result<(Vec<RegistryEntry>, Vec<SchemaError>), SourceError> {
    let sql = format!("SELECT {} FROM {registry}", REGISTRY_COLUMNS.join(", "));
    debug!("Reading geometry registry: {sql}");
    let mut result = source.query(&sql)?;

    let indices = REGISTRY_COLUMNS
        .iter()
        .map(|name| {
            position(&result.columns, name).ok_or_else(|| SourceError::NoSuchColumn {
                table: registry.to_string(),
                column: (*name).to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let mut index = 0;
    while let Some(row) = result.cursor.next_row()? {
        let ordered: Vec<RawValue> = indices
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(RawValue::Null))
            .collect();
        match RegistryEntry::from_row(index, &ordered) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                warn!("{err}");
                errors.push(err);
            },
        }
        index += 1;
    }
    Ok((entries, errors))
}

/// The tables of a container, described once at open time.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: Vec<Arc<LayerSchema>>,
    geometry_columns: Vec<String>,
    registered_types: Vec<(String, GeometryType)>,
    schema_errors: Vec<SchemaError>,
}

impl Catalog {
    /// Describes every visible table of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Enumeration`] if the table list or a table's
    /// columns cannot be read. Registry problems are not errors; see
    /// [`Catalog::schema_errors`].
    pub fn load(source: &dyn TabularSource, options: &OpenOptions) -> Result<Self, OpenError> {
        let enumeration = |err| OpenError::Enumeration { source: err };
        let all_tables = source.list_tables().map_err(enumeration)?;
        let mut catalog = Catalog::default();

        let registry = &options.geometry_registry;
        let entries = if all_tables.iter().any(|t| t.eq_ignore_ascii_case(registry)) {
            match read_registry(source, registry) {
                Ok((entries, errors)) => {
                    catalog.schema_errors.extend(errors);
                    entries
                },
                Err(cause) => {
                    let err = SchemaError::RegistryUnavailable {
                        registry: registry.clone(),
                        source: cause,
                    };
                    warn!("{err}; all tables are treated as non-spatial");
                    catalog.schema_errors.push(err);
                    Vec::new()
                },
            }
        } else {
            debug!("No '{registry}' table; all tables are non-spatial");
            Vec::new()
        };

        for entry in &entries {
            if !all_tables.iter().any(|t| t.eq_ignore_ascii_case(&entry.table)) {
                let err = SchemaError::MissingTable {
                    table: entry.table.clone(),
                };
                warn!("{err}");
                catalog.schema_errors.push(err);
            }
            if let Ok(kind) = entry.geometry_kind() {
                let dimension = Dimension::from_flags(entry.has_z, entry.has_m);
                catalog
                    .registered_types
                    .push((entry.field.clone(), GeometryType::new(kind, dimension)));
            }
            if !catalog
                .geometry_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&entry.field))
            {
                catalog.geometry_columns.push(entry.field.clone());
            }
        }

        for name in all_tables {
            if options.is_hidden_table(&name) {
                debug!("Skipping internal table '{name}'");
                continue;
            }
            let columns = source.columns(&name).map_err(enumeration)?;

            let geometry = match entries.iter().find(|e| e.table.eq_ignore_ascii_case(&name)) {
                Some(entry) => match entry.resolve(&columns) {
                    Ok(geometry) => {
                        debug!(
                            "Table '{name}' is spatial: {} in column '{}'",
                            geometry.geometry_type, geometry.column
                        );
                        Some(geometry)
                    },
                    Err(err) => {
                        warn!("{err}; exposing '{name}' as non-spatial");
                        catalog.schema_errors.push(err);
                        None
                    },
                },
                None => None,
            };

            let fid_column = columns
                .iter()
                .find(|c| c.primary_key)
                .or_else(|| {
                    columns
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(DEFAULT_FID_COLUMN))
                })
                .map(|c| c.name.clone());

            catalog.tables.push(Arc::new(LayerSchema::new(
                name,
                &columns,
                geometry,
                fid_column.as_deref(),
            )));
        }

        Ok(catalog)
    }

    /// Table descriptors in the engine's natural order.
    #[must_use]
    pub fn list_tables(&self) -> &[Arc<LayerSchema>] {
        &self.tables
    }

    /// Looks a table up by exact name, then case-insensitively.
    #[must_use]
    pub fn describe_table(&self, name: &str) -> Option<&LayerSchema> {
        self.tables
            .iter()
            .find(|t| t.name() == name)
            .or_else(|| self.tables.iter().find(|t| t.name().eq_ignore_ascii_case(name)))
            .map(|t| &**t)
    }

    /// Geometry column names listed in the registry.
    #[must_use]
    pub fn geometry_columns(&self) -> &[String] {
        &self.geometry_columns
    }

    /// Declared geometry type of a registry column name, when every registry
    /// entry naming that column agrees on the kind. Z and M are present if
    /// any of those entries has them.
    #[must_use]
    pub fn registered_geometry_type(&self, column: &str) -> Option<GeometryType> {
        let mut types = self
            .registered_types
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, geometry_type)| *geometry_type);
        let first = types.next()?;
        types.try_fold(first, |merged, next| {
            (merged.kind == next.kind).then(|| {
                let dimension = Dimension::from_flags(
                    merged.dimension.has_z() || next.dimension.has_z(),
                    merged.dimension.has_m() || next.dimension.has_m(),
                );
                GeometryType::new(merged.kind, dimension)
            })
        })
    }

    /// Registry problems found while loading.
    #[must_use]
    pub fn schema_errors(&self) -> &[SchemaError] {
        &self.schema_errors
    }
}
