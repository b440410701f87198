use std::rc::Rc;

use log::debug;
use pgeo_core_common::{
    ColumnDescriptor, QueryResult, RawValue, Row, RowCursor, SourceError, SourceResult, SqlType,
    TabularSource,
};

use crate::sql;

/// Name of the table that registers geometry columns.
pub const GEOMETRY_REGISTRY: &str = "GDB_GeomColumns";

/// A table held in memory.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Rc<Vec<Row>>,
}

impl MemoryTable {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Rc::new(Vec::new()),
        }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Other`] if the row width does not match the
    /// column count.
    pub fn push_row(&mut self, row: Row) -> SourceResult<()> {
        if row.len() != self.columns.len() {
            return Err(SourceError::Other(format!(
                "Row for '{}' has {} values, expected {}",
                self.name,
                row.len(),
                self.columns.len()
            )));
        }
        Rc::make_mut(&mut self.rows).push(row);
        Ok(())
    }

    /// Builder form of [`MemoryTable::push_row`].
    ///
    /// # Errors
    ///
    /// See [`MemoryTable::push_row`].
    pub fn with_row(mut self, row: Row) -> SourceResult<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }
}

/// One entry of the geometry registry table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryColumn {
    pub table: String,
    pub field: String,
    pub shape_type: i32,
    /// `(left, right, bottom, top)`
    pub extent: Option<(f64, f64, f64, f64)>,
    pub srid: Option<i64>,
    pub has_z: bool,
    pub has_m: bool,
}

impl GeometryColumn {
    #[must_use]
    pub fn new(table: impl Into<String>, field: impl Into<String>, shape_type: i32) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            shape_type,
            extent: None,
            srid: None,
            has_z: false,
            has_m: false,
        }
    }

    #[must_use]
    pub fn with_extent(mut self, left: f64, right: f64, bottom: f64, top: f64) -> Self {
        self.extent = Some((left, right, bottom, top));
        self
    }

    #[must_use]
    pub fn with_srid(mut self, srid: i64) -> Self {
        self.srid = Some(srid);
        self
    }

    #[must_use]
    pub fn with_z(mut self, has_z: bool) -> Self {
        self.has_z = has_z;
        self
    }

    #[must_use]
    pub fn with_m(mut self, has_m: bool) -> Self {
        self.has_m = has_m;
        self
    }

    fn registry_columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("TableName", SqlType::VarChar),
            ColumnDescriptor::new("FieldName", SqlType::VarChar),
            ColumnDescriptor::new("ShapeType", SqlType::Integer),
            ColumnDescriptor::new("ExtentLeft", SqlType::Double),
            ColumnDescriptor::new("ExtentRight", SqlType::Double),
            ColumnDescriptor::new("ExtentBottom", SqlType::Double),
            ColumnDescriptor::new("ExtentTop", SqlType::Double),
            ColumnDescriptor::new("SRID", SqlType::Integer),
            ColumnDescriptor::new("HasZ", SqlType::Bit),
            ColumnDescriptor::new("HasM", SqlType::Bit),
        ]
    }

    fn to_row(&self) -> Row {
        let (left, right, bottom, top) = match self.extent {
            Some((l, r, b, t)) => (l.into(), r.into(), b.into(), t.into()),
            None => (RawValue::Null, RawValue::Null, RawValue::Null, RawValue::Null),
        };
        vec![
            self.table.as_str().into(),
            self.field.as_str().into(),
            self.shape_type.into(),
            left,
            right,
            bottom,
            top,
            self.srid.into(),
            RawValue::Integer(if self.has_z { -1 } else { 0 }),
            RawValue::Integer(if self.has_m { -1 } else { 0 }),
        ]
    }
}

/// A [`TabularSource`] over in-memory tables.
///
/// Tables keep their insertion order, which is the order
/// [`TabularSource::list_tables`] reports. Names resolve case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: Vec<MemoryTable>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table of the same name.
    pub fn add_table(&mut self, table: MemoryTable) {
        match self.position(&table.name) {
            Some(index) => self.tables[index] = table,
            None => self.tables.push(table),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.add_table(table);
        self
    }

    /// Registers a geometry column, creating the registry table on first use.
    pub fn register_geometry(&mut self, column: &GeometryColumn) {
        let index = match self.position(GEOMETRY_REGISTRY) {
            Some(index) => index,
            None => {
                self.tables.push(MemoryTable::new(
                    GEOMETRY_REGISTRY,
                    GeometryColumn::registry_columns(),
                ));
                self.tables.len() - 1
            },
        };
        let table = &mut self.tables[index];
        Rc::make_mut(&mut table.rows).push(column.to_row());
    }

    #[must_use]
    pub fn tables(&self) -> &[MemoryTable] {
        &self.tables
    }

    pub(crate) fn table(&self, name: &str) -> SourceResult<&MemoryTable> {
        self.position(name)
            .map(|index| &self.tables[index])
            .ok_or_else(|| SourceError::NoSuchTable(name.to_string()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .or_else(|| {
                self.tables
                    .iter()
                    .position(|t| t.name.eq_ignore_ascii_case(name))
            })
    }
}

/// Cursor over a shared snapshot of a table's rows.
struct TableCursor {
    columns: Vec<ColumnDescriptor>,
    rows: Rc<Vec<Row>>,
    next: usize,
}

impl RowCursor for TableCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }
}

impl TabularSource for MemorySource {
    fn list_tables(&self) -> SourceResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn columns(&self, table: &str) -> SourceResult<Vec<ColumnDescriptor>> {
        Ok(self.table(table)?.columns.clone())
    }

    fn scan(&self, table: &str) -> SourceResult<Box<dyn RowCursor>> {
        let table = self.table(table)?;
        debug!("Scanning '{}' ({} rows)", table.name, table.rows.len());
        Ok(Box::new(TableCursor {
            columns: table.columns.clone(),
            rows: Rc::clone(&table.rows),
            next: 0,
        }))
    }

    fn fetch(&self, table: &str, key_column: &str, id: i64) -> SourceResult<Option<Row>> {
        let table = self.table(table)?;
        let index = table
            .column_index(key_column)
            .ok_or_else(|| SourceError::NoSuchColumn {
                table: table.name.clone(),
                column: key_column.to_string(),
            })?;
        Ok(table
            .rows
            .iter()
            .find(|row| row[index].as_i64() == Some(id))
            .cloned())
    }

    fn count_rows(&self, table: &str) -> SourceResult<Option<u64>> {
        let rows = self.table(table)?.rows.len();
        Ok(u64::try_from(rows).ok())
    }

    fn query(&self, sql: &str) -> SourceResult<QueryResult> {
        sql::execute(self, sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcels() -> MemoryTable {
        MemoryTable::new(
            "Parcels",
            vec![
                ColumnDescriptor::new("OBJECTID", SqlType::Integer).with_primary_key(true),
                ColumnDescriptor::new("OWNER", SqlType::VarChar),
            ],
        )
        .with_row(vec![1.into(), "Ann".into()])
        .unwrap()
        .with_row(vec![2.into(), RawValue::Null])
        .unwrap()
    }

    #[test]
    fn tables_keep_insertion_order() {
        let source = MemorySource::new()
            .with_table(MemoryTable::new("b", Vec::new()))
            .with_table(MemoryTable::new("a", Vec::new()));
        assert_eq!(source.list_tables().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn push_row_checks_width() {
        let mut table = parcels();
        let err = table.push_row(vec![1.into()]).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn scan_is_a_snapshot() {
        let mut source = MemorySource::new().with_table(parcels());
        let mut cursor = source.scan("parcels").unwrap();

        let mut replacement = parcels();
        replacement.push_row(vec![3.into(), "Cy".into()]).unwrap();
        source.add_table(replacement);

        let mut seen = 0;
        while cursor.next_row().unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert_eq!(source.count_rows("Parcels").unwrap(), Some(3));
    }

    #[test]
    fn fetch_by_key() {
        let source = MemorySource::new().with_table(parcels());
        let row = source.fetch("Parcels", "objectid", 2).unwrap().unwrap();
        assert_eq!(row[1], RawValue::Null);
        assert_eq!(source.fetch("Parcels", "OBJECTID", 9).unwrap(), None);
        assert!(matches!(
            source.fetch("Parcels", "missing", 1),
            Err(SourceError::NoSuchColumn { .. })
        ));
        assert!(matches!(
            source.fetch("nope", "OBJECTID", 1),
            Err(SourceError::NoSuchTable(_))
        ));
    }

    #[test]
    fn register_geometry_creates_registry() {
        let mut source = MemorySource::new().with_table(parcels());
        source.register_geometry(
            &GeometryColumn::new("Parcels", "SHAPE", 4)
                .with_extent(0.0, 10.0, 0.0, 5.0)
                .with_srid(4326)
                .with_z(true),
        );
        source.register_geometry(&GeometryColumn::new("Other", "SHAPE", 1));

        let registry = source.table(GEOMETRY_REGISTRY).unwrap();
        assert_eq!(registry.rows().len(), 2);
        assert_eq!(registry.rows()[0][2], RawValue::Integer(4));
        assert_eq!(registry.rows()[0][8], RawValue::Integer(-1));
        assert_eq!(registry.rows()[1][3], RawValue::Null);
    }
}
