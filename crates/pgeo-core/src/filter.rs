//! Spatial and attribute filters.
//!
//! A feature passes when it passes both: its geometry's bounding box must
//! intersect the filter rectangle (boundaries inclusive) and the attribute
//! predicate must evaluate to true. Unknown and NULL results reject.

use std::borrow::Cow;

use pgeo_core_common::{ColumnResolver, Expr, Operand, expr};
use pgeo_shape::Envelope;

use crate::catalog::LayerSchema;
use crate::error::FilterParseError;
use crate::feature::Feature;
use crate::types::{DATETIME_FORMAT, FieldValue};

/// A parsed attribute predicate together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    text: String,
    expr: Expr,
}

impl AttributeFilter {
    /// Parses `text` and checks every referenced column against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterParseError::Syntax`] for malformed expressions and
    /// [`FilterParseError::UnknownColumn`] for columns the layer lacks.
    pub fn parse(text: &str, schema: &LayerSchema) -> Result<Self, FilterParseError> {
        let expr = expr::parse(text).map_err(|source| FilterParseError::Syntax {
            expression: text.to_string(),
            source,
        })?;
        if let Some(column) = expr
            .columns()
            .into_iter()
            .find(|c| schema.field_index(c).is_none())
        {
            return Err(FilterParseError::UnknownColumn {
                expression: text.to_string(),
                column: column.to_string(),
            });
        }
        Ok(Self {
            text: text.to_string(),
            expr,
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        self.expr.matches(&FeatureResolver(feature))
    }
}

struct FeatureResolver<'a>(&'a Feature);

impl ColumnResolver for FeatureResolver<'_> {
    fn resolve(&self, column: &str) -> Option<Operand<'_>> {
        Some(match self.0.field(column)? {
            FieldValue::Null => Operand::Null,
            FieldValue::Integer(v) => Operand::Integer(i64::from(*v)),
            FieldValue::Integer64(v) => Operand::Integer(*v),
            FieldValue::Float(v) => Operand::Real(f64::from(*v)),
            FieldValue::Double(v) => Operand::Real(*v),
            FieldValue::String(s) => Operand::Text(Cow::Borrowed(s)),
            FieldValue::DateTime(dt) => {
                Operand::Text(Cow::Owned(dt.format(DATETIME_FORMAT).to_string()))
            },
            FieldValue::Binary(_) => Operand::Binary,
        })
    }
}

/// The filter state of a layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    spatial: Option<Envelope>,
    attribute: Option<AttributeFilter>,
}

impl FilterState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spatial.is_none() && self.attribute.is_none()
    }

    #[must_use]
    pub fn spatial(&self) -> Option<&Envelope> {
        self.spatial.as_ref()
    }

    #[must_use]
    pub fn attribute(&self) -> Option<&AttributeFilter> {
        self.attribute.as_ref()
    }

    pub fn set_spatial(&mut self, rect: Option<Envelope>) {
        self.spatial = rect;
    }

    pub fn set_attribute(&mut self, filter: Option<AttributeFilter>) {
        self.attribute = filter;
    }

    /// Spatial test: no filter passes everything; otherwise the feature needs
    /// a geometry whose bounding box intersects the rectangle.
    #[must_use]
    pub fn passes_spatial(&self, feature: &Feature) -> bool {
        match &self.spatial {
            None => true,
            Some(rect) => feature
                .geometry()
                .and_then(pgeo_shape::Geometry::envelope)
                .is_some_and(|bbox| bbox.intersects(rect)),
        }
    }

    #[must_use]
    pub fn passes_attribute(&self, feature: &Feature) -> bool {
        self.attribute.as_ref().is_none_or(|f| f.matches(feature))
    }

    #[must_use]
    pub fn passes(&self, feature: &Feature) -> bool {
        self.passes_spatial(feature) && self.passes_attribute(feature)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pgeo_core_common::{ColumnDescriptor, SqlType};
    use pgeo_shape::{Coord, Geometry, Point};

    use super::*;
    use crate::types::parse_datetime;

    fn schema() -> Arc<LayerSchema> {
        Arc::new(LayerSchema::new(
            "t",
            &[
                ColumnDescriptor::new("OBJECTID", SqlType::Integer),
                ColumnDescriptor::new("OWNER", SqlType::VarChar),
                ColumnDescriptor::new("BUILT", SqlType::Timestamp),
            ],
            None,
            Some("OBJECTID"),
        ))
    }

    fn feature(id: i32, owner: Option<&str>, at: Option<(f64, f64)>) -> Feature {
        Feature::new(
            i64::from(id),
            schema(),
            vec![
                FieldValue::Integer(id),
                owner.map_or(FieldValue::Null, |o| FieldValue::String(o.into())),
                FieldValue::DateTime(parse_datetime("2020-01-30").unwrap()),
            ],
            at.map(|(x, y)| Geometry::Point(Point(Coord::xy(x, y)))),
        )
    }

    #[test]
    fn attribute_filter_matches_fields() {
        let filter = AttributeFilter::parse("OBJECTID=1", &schema()).unwrap();
        assert!(filter.matches(&feature(1, Some("City"), None)));
        assert!(!filter.matches(&feature(2, Some("City"), None)));

        let filter = AttributeFilter::parse("owner = 'City' OR owner IS NULL", &schema()).unwrap();
        assert!(filter.matches(&feature(3, None, None)));
        assert!(!filter.matches(&feature(3, Some("County"), None)));
    }

    #[test]
    fn dates_compare_as_canonical_text() {
        let filter =
            AttributeFilter::parse("BUILT = '2020/01/30 00:00:00'", &schema()).unwrap();
        assert!(filter.matches(&feature(1, None, None)));
        let filter = AttributeFilter::parse("BUILT < '2020/01/01 00:00:00'", &schema()).unwrap();
        assert!(!filter.matches(&feature(1, None, None)));
    }

    #[test]
    fn type_mismatch_fails_instead_of_raising() {
        let filter = AttributeFilter::parse("OWNER = 5", &schema()).unwrap();
        assert!(!filter.matches(&feature(1, Some("5"), None)));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            AttributeFilter::parse("OBJECTID = ", &schema()),
            Err(FilterParseError::Syntax { .. })
        ));
        assert!(matches!(
            AttributeFilter::parse("NOPE = 1", &schema()),
            Err(FilterParseError::UnknownColumn { column, .. }) if column == "NOPE"
        ));
    }

    #[test]
    fn spatial_test_is_inclusive_and_needs_geometry() {
        let mut state = FilterState::default();
        assert!(state.passes(&feature(1, None, None)));

        state.set_spatial(Some(Envelope::new(0.0, 0.0, 1.0, 1.0)));
        assert!(state.passes(&feature(1, None, Some((1.0, 1.0)))));
        assert!(!state.passes(&feature(1, None, Some((1.5, 1.0)))));
        assert!(!state.passes(&feature(1, None, None)));
    }

    #[test]
    fn combined_result_is_a_conjunction() {
        let mut state = FilterState::default();
        state.set_spatial(Some(Envelope::new(0.0, 0.0, 10.0, 10.0)));
        state.set_attribute(Some(AttributeFilter::parse("OBJECTID > 1", &schema()).unwrap()));
        assert!(!state.passes(&feature(1, None, Some((5.0, 5.0)))));
        assert!(state.passes(&feature(2, None, Some((5.0, 5.0)))));
        assert!(!state.passes(&feature(2, None, Some((50.0, 5.0)))));

        state.set_spatial(None);
        state.set_attribute(None);
        assert!(state.is_empty());
    }
}
