//! Layers: one table or query result presented as a feature collection.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use pgeo_core_common::{RawValue, Row, RowCursor, TabularSource};
use pgeo_shape::{Envelope, Geometry, GeometryKind, GeometryType, ShapeDecodeError};

use crate::catalog::LayerSchema;
use crate::error::{FeatureError, PGeoError, Result};
use crate::feature::Feature;
use crate::filter::{AttributeFilter, FilterState};
use crate::mapper;
use crate::options::OpenOptions;
use crate::types::{FieldDefn, FieldType};

static NULL: RawValue = RawValue::Null;

/// Where a layer's rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOrigin {
    /// A table, scanned in natural order.
    Table,
    /// A query, re-run on every fresh pass.
    Query(String),
}

/// A table or query result exposed as features.
///
/// Reading is pull-based: [`Layer::next_feature`] advances a cursor that is
/// opened lazily and dropped by [`Layer::reset_reading`] or by any filter
/// change. Counting and random access use their own cursors and leave the
/// reading position alone.
pub struct Layer {
    source: Rc<dyn TabularSource>,
    schema: Arc<LayerSchema>,
    origin: LayerOrigin,
    filter: FilterState,
    cursor: Option<Box<dyn RowCursor>>,
    next_ordinal: i64,
    cached_count: Option<u64>,
    /// Set after an engine failure; the pass then reports its end.
    finished: bool,
    /// The declared type was sampled from a query result, so a `Point`
    /// layer may widen to `MultiPoint`.
    widen_points: bool,
    tolerate_decode_errors: bool,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.schema.name())
            .field("origin", &self.origin)
            .field("filter", &self.filter)
            .field("reading", &self.cursor.is_some())
            .field("cached_count", &self.cached_count)
            .finish_non_exhaustive()
    }
}

impl Layer {
    pub(crate) fn for_table(
        source: Rc<dyn TabularSource>,
        schema: Arc<LayerSchema>,
        options: &OpenOptions,
    ) -> Self {
        Self {
            source,
            schema,
            origin: LayerOrigin::Table,
            filter: FilterState::default(),
            cursor: None,
            next_ordinal: 0,
            cached_count: None,
            finished: false,
            widen_points: false,
            tolerate_decode_errors: options.tolerate_decode_errors,
        }
    }

    /// Creates a query layer whose first pass reads from `first_pass`.
    pub(crate) fn for_query(
        source: Rc<dyn TabularSource>,
        schema: Arc<LayerSchema>,
        sql: String,
        first_pass: Box<dyn RowCursor>,
        options: &OpenOptions,
    ) -> Self {
        Self {
            source,
            schema,
            origin: LayerOrigin::Query(sql),
            filter: FilterState::default(),
            cursor: Some(first_pass),
            next_ordinal: 0,
            cached_count: None,
            finished: false,
            widen_points: false,
            tolerate_decode_errors: options.tolerate_decode_errors,
        }
    }

    /// Lets a `Point` declared type widen to `MultiPoint` when a multipoint
    /// row turns up.
    #[must_use]
    pub(crate) fn with_point_widening(mut self) -> Self {
        self.widen_points = true;
        self
    }

    /// Applies a spatial filter without discarding the pending first pass.
    #[must_use]
    pub(crate) fn with_spatial_filter(mut self, rect: Option<Envelope>) -> Self {
        self.filter.set_spatial(rect);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[must_use]
    pub fn schema(&self) -> &LayerSchema {
        &self.schema
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDefn] {
        self.schema.fields()
    }

    /// Declared geometry type, `None` for non-spatial layers.
    #[must_use]
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.schema.geometry_type()
    }

    #[must_use]
    pub fn geometry_column(&self) -> Option<&str> {
        self.schema.geometry().map(|g| g.column.as_str())
    }

    /// Extent recorded in the geometry registry.
    #[must_use]
    pub fn extent(&self) -> Option<Envelope> {
        self.schema.geometry().and_then(|g| g.extent)
    }

    #[must_use]
    pub fn srid(&self) -> Option<i64> {
        self.schema.geometry().and_then(|g| g.srid)
    }

    #[must_use]
    pub fn fid_column(&self) -> Option<&str> {
        self.schema.fid_column()
    }

    #[must_use]
    pub fn origin(&self) -> &LayerOrigin {
        &self.origin
    }

    #[must_use]
    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    #[must_use]
    pub fn spatial_filter(&self) -> Option<&Envelope> {
        self.filter.spatial()
    }

    #[must_use]
    pub fn attribute_filter(&self) -> Option<&str> {
        self.filter.attribute().map(AttributeFilter::text)
    }

    /// Rewinds to the first qualifying row. The next read starts a fresh pass.
    pub fn reset_reading(&mut self) {
        self.cursor = None;
        self.next_ordinal = 0;
        self.finished = false;
    }

    /// Returns the next feature passing the current filters, or `None` at
    /// the end of the pass.
    ///
    /// # Errors
    ///
    /// Row-level failures are returned as [`crate::PGeoError::Feature`] after
    /// the cursor has moved past the row, so calling again continues with the
    /// next one. Engine failures are returned as [`crate::PGeoError::Source`]
    /// and end the pass: later calls return `None` until
    /// [`Layer::reset_reading`].
    pub fn next_feature(&mut self) -> Result<Option<Feature>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let row = match self.read_row() {
                Ok(Some(row)) => row,
                Ok(None) => return Ok(None),
                Err(err) => {
                    self.finished = true;
                    return Err(err);
                },
            };

            let ordinal = self.next_ordinal;
            self.next_ordinal += 1;
            let mut feature = self.build_feature(&row, ordinal)?;
            if self.widens_for(&feature) {
                self.widen_to_multipoint();
                feature = self.build_feature(&row, ordinal)?;
            }
            if self.filter.passes(&feature) {
                return Ok(Some(feature));
            }
        }
    }

    /// Iterates over the remaining features of the current pass.
    pub fn features(&mut self) -> Features<'_> {
        Features { layer: self }
    }

    /// Looks a feature up by identifier, ignoring filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails or the matching row cannot be
    /// turned into a feature. An absent identifier is `Ok(None)`.
    pub fn get_feature(&self, fid: i64) -> Result<Option<Feature>> {
        if let (LayerOrigin::Table, Some(column)) = (&self.origin, self.schema.fid_column()) {
            return match self.source.fetch(self.name(), column, fid)? {
                Some(row) => self.build_feature(&row, fid).map(Some),
                None => Ok(None),
            };
        }

        let mut cursor = self.open_cursor()?;
        let mut ordinal = 0;
        while let Some(row) = cursor.next_row()? {
            if self.schema.row_fid(&row, ordinal) == Some(fid) {
                return self.build_feature(&row, ordinal).map(Some);
            }
            ordinal += 1;
        }
        Ok(None)
    }

    /// Number of features passing the current filters.
    ///
    /// Without filters this is the row count. With filters every row is
    /// decoded and tested; rows that fail to convert are not counted. The
    /// result is cached until a filter changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn feature_count(&mut self) -> Result<u64> {
        if let Some(count) = self.cached_count {
            return Ok(count);
        }
        let count = if self.filter.is_empty() {
            self.row_count()?
        } else {
            self.filtered_count()?
        };
        debug!("Layer '{}' has {count} matching features", self.name());
        self.cached_count = Some(count);
        Ok(count)
    }

    /// Sets or clears the spatial filter.
    pub fn set_spatial_filter(&mut self, rect: Option<Envelope>) {
        self.filter.set_spatial(rect);
        self.invalidate();
    }

    pub fn set_spatial_filter_rect(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        self.set_spatial_filter(Some(Envelope::new(min_x, min_y, max_x, max_y)));
    }

    /// Sets or clears (`None` or blank text) the attribute filter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::FilterParse`] if the expression is invalid;
    /// the previous filter then stays in effect.
    pub fn set_attribute_filter(&mut self, expression: Option<&str>) -> Result<()> {
        let filter = match expression.map(str::trim).filter(|e| !e.is_empty()) {
            Some(text) => Some(AttributeFilter::parse(text, &self.schema)?),
            None => None,
        };
        self.filter.set_attribute(filter);
        self.invalidate();
        Ok(())
    }

    /// Computes the bounding box of every decodable geometry, ignoring
    /// filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn compute_extent(&self) -> Result<Option<Envelope>> {
        let (Some(geometry), Some(index)) = (self.schema.geometry(), self.schema.geometry_index())
        else {
            return Ok(None);
        };
        let kind = geometry.geometry_type.kind;
        let mut cursor = self.open_cursor()?;
        let mut extent: Option<Envelope> = None;
        let mut ordinal = 0;
        while let Some(row) = cursor.next_row()? {
            let fid = self.schema.row_fid(&row, ordinal).unwrap_or(ordinal);
            ordinal += 1;
            let Ok(Some(geometry)) = self.decode_geometry(row.get(index), kind, fid) else {
                continue;
            };
            if let Some(bbox) = geometry.envelope() {
                extent = Some(extent.map_or(bbox, |e| e.merge(&bbox)));
            }
        }
        Ok(extent)
    }

    fn invalidate(&mut self) {
        self.reset_reading();
        self.cached_count = None;
    }

    /// Next raw row of the current pass, opening the cursor if needed.
    fn read_row(&mut self) -> Result<Option<Row>> {
        if self.cursor.is_none() {
            let cursor = self.open_cursor()?;
            self.cursor = Some(cursor);
            self.next_ordinal = 0;
        }
        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor.next_row()?),
            None => Ok(None),
        }
    }

    fn widens_for(&self, feature: &Feature) -> bool {
        self.widen_points
            && self.geometry_type().map(|t| t.kind) == Some(GeometryKind::Point)
            && feature.geometry().map(Geometry::kind) == Some(GeometryKind::MultiPoint)
    }

    fn widen_to_multipoint(&mut self) {
        debug!(
            "Layer '{}' holds multipoints; widening its type to MultiPoint",
            self.name()
        );
        self.schema = Arc::new(self.schema.with_geometry_kind(GeometryKind::MultiPoint));
    }

    fn open_cursor(&self) -> Result<Box<dyn RowCursor>> {
        match &self.origin {
            LayerOrigin::Table => Ok(self.source.scan(self.name())?),
            LayerOrigin::Query(sql) => {
                debug!("Re-running query for layer '{}': {sql}", self.name());
                Ok(self.source.query(sql)?.cursor)
            },
        }
    }

    fn row_count(&self) -> Result<u64> {
        if self.origin == LayerOrigin::Table {
            if let Some(count) = self.source.count_rows(self.name())? {
                return Ok(count);
            }
        }
        let mut cursor = self.open_cursor()?;
        let mut count = 0;
        while cursor.next_row()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn filtered_count(&self) -> Result<u64> {
        let mut cursor = self.open_cursor()?;
        let mut count = 0;
        let mut ordinal = 0;
        while let Some(row) = cursor.next_row()? {
            match self.build_feature(&row, ordinal) {
                Ok(feature) if self.filter.passes(&feature) => count += 1,
                Ok(_) => {},
                Err(err) if err.is_feature_level() => debug!("Not counted: {err}"),
                Err(err) => return Err(err),
            }
            ordinal += 1;
        }
        Ok(count)
    }

    fn build_feature(&self, row: &Row, ordinal: i64) -> Result<Feature> {
        let fid = self
            .schema
            .row_fid(row, ordinal)
            .ok_or_else(|| self.invalid_fid(row, ordinal))?;

        let mut values = Vec::with_capacity(self.schema.fields().len());
        for (field, &index) in self.schema.fields().iter().zip(self.schema.field_indices()) {
            let raw = row.get(index).unwrap_or(&NULL);
            let value = mapper::coerce(raw, field.sql_type).ok_or_else(|| {
                FeatureError::InvalidValue {
                    layer: self.name().to_string(),
                    fid,
                    field: field.name.clone(),
                    value: mapper::describe(raw),
                    expected: field.field_type,
                }
            })?;
            values.push(value);
        }

        let geometry = match (self.schema.geometry(), self.schema.geometry_index()) {
            (Some(geometry), Some(index)) => {
                self.decode_geometry(row.get(index), geometry.geometry_type.kind, fid)?
            },
            _ => None,
        };

        Ok(Feature::new(fid, Arc::clone(&self.schema), values, geometry))
    }

    /// Error for a row whose identifier column holds no integer.
    fn invalid_fid(&self, row: &Row, ordinal: i64) -> PGeoError {
        let column = self.fid_column().unwrap_or_default();
        let raw = self
            .schema
            .fid_index()
            .and_then(|i| row.get(i))
            .unwrap_or(&NULL);
        let expected = self
            .schema
            .field_index(column)
            .map_or(FieldType::Integer64, |i| self.fields()[i].field_type);
        FeatureError::InvalidValue {
            layer: self.name().to_string(),
            fid: ordinal,
            field: column.to_string(),
            value: mapper::describe(raw),
            expected,
        }
        .into()
    }

    fn decode_geometry(
        &self,
        raw: Option<&RawValue>,
        kind: GeometryKind,
        fid: i64,
    ) -> Result<Option<Geometry>> {
        match raw {
            None | Some(RawValue::Null) => Ok(None),
            Some(RawValue::Binary(bytes)) => match pgeo_shape::decode(bytes, Some(kind)) {
                Ok(geometry) => Ok(geometry),
                Err(ShapeDecodeError::TypeMismatch {
                    declared: GeometryKind::Point,
                    found: GeometryKind::MultiPoint,
                }) if self.widen_points => {
                    self.decode_geometry(raw, GeometryKind::MultiPoint, fid)
                },
                Err(source) if self.tolerate_decode_errors => {
                    warn!(
                        "Feature {fid} in '{}' has an undecodable geometry: {source}",
                        self.name()
                    );
                    Ok(None)
                },
                Err(source) => Err(FeatureError::Decode {
                    layer: self.name().to_string(),
                    fid,
                    source,
                }
                .into()),
            },
            Some(other) => Err(FeatureError::InvalidValue {
                layer: self.name().to_string(),
                fid,
                field: self.geometry_column().unwrap_or_default().to_string(),
                value: mapper::describe(other),
                expected: FieldType::Binary,
            }
            .into()),
        }
    }
}

/// Iterator over a layer's features; see [`Layer::features`].
pub struct Features<'a> {
    layer: &'a mut Layer,
}

impl Iterator for Features<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        self.layer.next_feature().transpose()
    }
}

#[cfg(test)]
mod tests {
    use pgeo_core_common::{ColumnDescriptor, SqlType};
    use pgeo_memory::{GeometryColumn, MemorySource, MemoryTable};
    use pgeo_shape::{Coord, LineString, MultiLineString, encode};

    use super::*;
    use crate::catalog::{Catalog, LayerSchema};
    use crate::types::FieldValue;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<u8> {
        encode(&Geometry::MultiLineString(MultiLineString(vec![LineString(vec![
            Coord::xy(x0, y0),
            Coord::xy(x1, y1),
        ])])))
    }

    fn source(with_objectid: bool) -> MemorySource {
        let mut columns = vec![
            ColumnDescriptor::new("NAME", SqlType::VarChar),
            ColumnDescriptor::new("SHAPE", SqlType::LongVarBinary),
        ];
        if with_objectid {
            columns.insert(0, ColumnDescriptor::new("OBJECTID", SqlType::Integer));
        }
        let mut table = MemoryTable::new("roads", columns);
        let rows: Vec<(i64, &str, RawValue)> = vec![
            (10, "a", line(0.0, 0.0, 1.0, 1.0).into()),
            (11, "b", line(5.0, 5.0, 6.0, 6.0).into()),
            (12, "c", RawValue::Null),
            (13, "d", vec![99u8, 0, 0, 0].into()),
        ];
        for (id, name, shape) in rows {
            let mut row = vec![name.into(), shape];
            if with_objectid {
                row.insert(0, id.into());
            }
            table.push_row(row).unwrap();
        }
        let mut source = MemorySource::new().with_table(table);
        source.register_geometry(&GeometryColumn::new("roads", "SHAPE", 3));
        source
    }

    fn layer(source: MemorySource, options: &OpenOptions) -> Layer {
        let catalog = Catalog::load(&source, options).unwrap();
        let schema = Arc::clone(&catalog.list_tables()[0]);
        Layer::for_table(Rc::new(source), schema, options)
    }

    #[test]
    fn decode_failure_is_row_level_and_scan_continues() {
        let mut layer = layer(source(true), &OpenOptions::default());
        let mut ok = Vec::new();
        let mut failed = Vec::new();
        while let Some(result) = layer.features().next() {
            match result {
                Ok(feature) => ok.push(feature.fid()),
                Err(PGeoError::Feature(FeatureError::Decode { fid, .. })) => failed.push(fid),
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert_eq!(ok, vec![10, 11, 12]);
        assert_eq!(failed, vec![13]);
    }

    #[test]
    fn tolerated_decode_failure_yields_no_geometry() {
        let options = OpenOptions::default().with_tolerate_decode_errors(true);
        let mut layer = layer(source(true), &options);
        let features: Vec<Feature> = layer.features().collect::<Result<_>>().unwrap();
        assert_eq!(features.len(), 4);
        assert!(features[3].geometry().is_none());
    }

    #[test]
    fn counts_exclude_undecodable_rows_only_when_filtering() {
        let mut layer = layer(source(true), &OpenOptions::default());
        assert_eq!(layer.feature_count().unwrap(), 4);

        layer.set_attribute_filter(Some("NAME <> 'zzz'")).unwrap();
        assert_eq!(layer.feature_count().unwrap(), 3);

        layer.set_spatial_filter_rect(-1.0, -1.0, 2.0, 2.0);
        assert_eq!(layer.feature_count().unwrap(), 1);

        layer.set_attribute_filter(None).unwrap();
        layer.set_spatial_filter(None);
        assert_eq!(layer.feature_count().unwrap(), 4);
    }

    #[test]
    fn bad_attribute_filter_keeps_previous_one() {
        let mut layer = layer(source(true), &OpenOptions::default());
        layer.set_attribute_filter(Some("OBJECTID = 11")).unwrap();
        let err = layer.set_attribute_filter(Some("OBJECTID = = 1")).unwrap_err();
        assert!(matches!(err, PGeoError::FilterParse(_)));
        assert_eq!(layer.attribute_filter(), Some("OBJECTID = 11"));
        assert_eq!(layer.feature_count().unwrap(), 1);
    }

    #[test]
    fn get_feature_ignores_filters() {
        let mut layer = layer(source(true), &OpenOptions::default());
        layer.set_attribute_filter(Some("OBJECTID = 10")).unwrap();
        let feature = layer.get_feature(12).unwrap().unwrap();
        assert_eq!(feature.field("name"), Some(&FieldValue::String("c".into())));
        assert!(feature.geometry().is_none());
        assert!(layer.get_feature(14).unwrap().is_none());
    }

    #[test]
    fn ordinal_identifiers_without_objectid() {
        let options = OpenOptions::default().with_tolerate_decode_errors(true);
        let mut layer = layer(source(false), &options);
        assert_eq!(layer.fid_column(), None);
        let fids: Vec<i64> = layer.features().map(|f| f.unwrap().fid()).collect();
        assert_eq!(fids, vec![0, 1, 2, 3]);

        let feature = layer.get_feature(1).unwrap().unwrap();
        assert_eq!(feature.field("NAME"), Some(&FieldValue::String("b".into())));
        assert!(layer.get_feature(4).unwrap().is_none());
        assert!(layer.get_feature(-1).unwrap().is_none());
    }

    #[test]
    fn reset_and_filter_changes_restart_the_pass() {
        let mut layer = layer(source(true), &OpenOptions::default());
        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 10);
        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 11);
        layer.reset_reading();
        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 10);

        layer.set_spatial_filter_rect(4.0, 4.0, 5.0, 5.0);
        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 11);
        // Row 12 has no geometry and row 13 fails to decode.
        assert!(layer.next_feature().is_err());
        assert!(layer.next_feature().unwrap().is_none());
        assert!(layer.next_feature().unwrap().is_none());
    }

    #[test]
    fn computed_extent_skips_bad_rows() {
        let layer = layer(source(true), &OpenOptions::default());
        assert_eq!(layer.extent(), None);
        assert_eq!(
            layer.compute_extent().unwrap(),
            Some(Envelope::new(0.0, 0.0, 6.0, 6.0))
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        let table = MemoryTable::new(
            "numbers",
            vec![ColumnDescriptor::new("n", SqlType::Integer)],
        )
        .with_row(vec!["twelve".into()])
        .unwrap();
        let mut layer = layer(MemorySource::new().with_table(table), &OpenOptions::default());
        let err = layer.next_feature().unwrap_err();
        assert!(matches!(
            err,
            PGeoError::Feature(FeatureError::InvalidValue { expected: FieldType::Integer, .. })
        ));
    }

    #[test]
    fn rows_without_an_identifier_are_invalid() {
        let table = MemoryTable::new(
            "parcels",
            vec![
                ColumnDescriptor::new("OBJECTID", SqlType::Integer).with_primary_key(true),
                ColumnDescriptor::new("NAME", SqlType::VarChar),
            ],
        )
        .with_row(vec![1i64.into(), "a".into()])
        .unwrap()
        .with_row(vec![RawValue::Null, "b".into()])
        .unwrap()
        .with_row(vec![2i64.into(), "c".into()])
        .unwrap();
        let mut layer = layer(MemorySource::new().with_table(table), &OpenOptions::default());

        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 1);
        let err = layer.next_feature().unwrap_err();
        assert!(matches!(
            &err,
            PGeoError::Feature(FeatureError::InvalidValue { fid: 1, field, .. }) if field == "OBJECTID"
        ));
        assert_eq!(layer.next_feature().unwrap().unwrap().fid(), 2);

        // Identifier 1 names the keyed row only.
        let feature = layer.get_feature(1).unwrap().unwrap();
        assert_eq!(feature.field("NAME"), Some(&FieldValue::String("a".into())));
    }

    #[test]
    fn engine_failure_ends_the_pass() {
        let schema = Arc::new(LayerSchema::new(
            "ghost",
            &[ColumnDescriptor::new("n", SqlType::Integer)],
            None,
            None,
        ));
        let mut layer = Layer::for_table(
            Rc::new(MemorySource::new()),
            schema,
            &OpenOptions::default(),
        );

        let mut features = layer.features();
        assert!(matches!(features.next(), Some(Err(PGeoError::Source(_)))));
        assert!(features.next().is_none());

        layer.reset_reading();
        assert!(matches!(layer.next_feature(), Err(PGeoError::Source(_))));
        assert!(layer.next_feature().unwrap().is_none());
    }
}
