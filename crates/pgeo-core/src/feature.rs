use std::sync::Arc;

use pgeo_shape::Geometry;

use crate::catalog::LayerSchema;
use crate::types::FieldValue;

/// One row of a layer: identifier, typed field values and optional geometry.
///
/// Features are produced fresh on every fetch and never change afterwards.
#[derive(Debug, Clone)]
pub struct Feature {
    fid: i64,
    schema: Arc<LayerSchema>,
    values: Vec<FieldValue>,
    geometry: Option<Geometry>,
}

impl Feature {
    pub(crate) fn new(
        fid: i64,
        schema: Arc<LayerSchema>,
        values: Vec<FieldValue>,
        geometry: Option<Geometry>,
    ) -> Self {
        Self {
            fid,
            schema,
            values,
            geometry,
        }
    }

    #[must_use]
    pub fn fid(&self) -> i64 {
        self.fid
    }

    #[must_use]
    pub fn schema(&self) -> &LayerSchema {
        &self.schema
    }

    /// Values in field order.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.schema.field_index(name)
    }

    /// Value of the named field (case-insensitive).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.field_index(name).and_then(|i| self.values.get(i))
    }

    #[must_use]
    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    #[must_use]
    pub fn into_geometry(self) -> Option<Geometry> {
        self.geometry
    }
}
