//! Canonical vector geometry model.
//!
//! A closed set of variants, each carrying optional Z and M ordinates per
//! vertex. Decoded geometries always have uniform dimensionality: either every
//! vertex has a Z (resp. M) or none has.

use std::fmt;

/// A single vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    /// Creates a planar vertex.
    #[must_use]
    pub const fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    #[must_use]
    pub const fn new(x: f64, y: f64, z: Option<f64>, m: Option<f64>) -> Self {
        Self { x, y, z, m }
    }

    fn dimension(&self) -> Dimension {
        Dimension::from_flags(self.z.is_some(), self.m.is_some())
    }
}

/// Coordinate dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    #[default]
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

impl Dimension {
    #[must_use]
    pub const fn from_flags(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Dimension::Xy,
            (true, false) => Dimension::Xyz,
            (false, true) => Dimension::Xym,
            (true, true) => Dimension::Xyzm,
        }
    }

    #[must_use]
    pub const fn has_z(self) -> bool {
        matches!(self, Dimension::Xyz | Dimension::Xyzm)
    }

    #[must_use]
    pub const fn has_m(self) -> bool {
        matches!(self, Dimension::Xym | Dimension::Xyzm)
    }

    fn suffix(self) -> &'static str {
        match self {
            Dimension::Xy => "",
            Dimension::Xyz => " Z",
            Dimension::Xym => " M",
            Dimension::Xyzm => " ZM",
        }
    }
}

/// Geometry variant without dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    #[must_use]
    pub const fn is_multi(self) -> bool {
        matches!(
            self,
            GeometryKind::MultiPoint | GeometryKind::MultiLineString | GeometryKind::MultiPolygon
        )
    }

    /// Returns the multi-part form for line and polygon kinds.
    ///
    /// Points stay points: a point layer is never promoted.
    #[must_use]
    pub const fn promoted(self) -> Self {
        match self {
            GeometryKind::LineString => GeometryKind::MultiLineString,
            GeometryKind::Polygon => GeometryKind::MultiPolygon,
            other => other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared geometry type: variant plus dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryType {
    pub kind: GeometryKind,
    pub dimension: Dimension,
}

impl GeometryType {
    #[must_use]
    pub const fn new(kind: GeometryKind, dimension: Dimension) -> Self {
        Self { kind, dimension }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.dimension.suffix())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Creates an envelope, ordering each axis so that min <= max.
    #[must_use]
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    #[must_use]
    pub const fn from_coord(coord: &Coord) -> Self {
        Self {
            min_x: coord.x,
            min_y: coord.y,
            max_x: coord.x,
            max_y: coord.y,
        }
    }

    pub fn expand_to_include(&mut self, coord: &Coord) {
        self.min_x = self.min_x.min(coord.x);
        self.min_y = self.min_y.min(coord.y);
        self.max_x = self.max_x.max(coord.x);
        self.max_y = self.max_y.max(coord.y);
    }

    #[must_use]
    pub fn merge(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Intersection test with inclusive boundaries: touching boxes intersect.
    #[must_use]
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    #[must_use]
    pub fn contains_coord(&self, coord: &Coord) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x && coord.y >= self.min_y && coord.y <= self.max_y
    }

    #[must_use]
    pub fn contains(&self, other: &Envelope) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

impl From<Envelope> for geo_types::Rect<f64> {
    fn from(envelope: Envelope) -> Self {
        geo_types::Rect::new(
            geo_types::coord! { x: envelope.min_x, y: envelope.min_y },
            geo_types::coord! { x: envelope.max_x, y: envelope.max_y },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point(pub Coord);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineString(pub Vec<Coord>);

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: LineString,
    interiors: Vec<LineString>,
}

impl Polygon {
    #[must_use]
    pub fn new(exterior: LineString, interiors: Vec<LineString>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    #[must_use]
    pub fn exterior(&self) -> &LineString {
        &self.exterior
    }

    #[must_use]
    pub fn interiors(&self) -> &[LineString] {
        &self.interiors
    }

    pub(crate) fn push_interior(&mut self, ring: LineString) {
        self.interiors.push(ring);
    }

    fn rings(&self) -> impl Iterator<Item = &LineString> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPoint(pub Vec<Point>);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiLineString(pub Vec<LineString>);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPolygon(pub Vec<Polygon>);

/// A decoded geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    MultiLineString(MultiLineString),
    MultiPolygon(MultiPolygon),
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Dimensionality of the vertices; empty geometries report [`Dimension::Xy`].
    #[must_use]
    pub fn dimension(&self) -> Dimension {
        let mut dimension = Dimension::Xy;
        self.visit_coords(&mut |coord| dimension = coord.dimension(), true);
        dimension
    }

    #[must_use]
    pub fn geometry_type(&self) -> GeometryType {
        GeometryType::new(self.kind(), self.dimension())
    }

    #[must_use]
    pub fn num_coords(&self) -> usize {
        let mut count = 0;
        self.visit_coords(&mut |_| count += 1, false);
        count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_coords() == 0
    }

    /// Bounding box of every vertex, `None` for an empty geometry.
    #[must_use]
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        self.visit_coords(
            &mut |coord| match envelope.as_mut() {
                Some(env) => env.expand_to_include(coord),
                None => envelope = Some(Envelope::from_coord(coord)),
            },
            false,
        );
        envelope
    }

    /// Calls `f` for every vertex in storage order.
    pub fn for_each_coord(&self, mut f: impl FnMut(&Coord)) {
        self.visit_coords(&mut f, false);
    }

    fn visit_coords(&self, f: &mut dyn FnMut(&Coord), first_only: bool) {
        let mut visit_line = |line: &LineString, f: &mut dyn FnMut(&Coord)| -> bool {
            for coord in &line.0 {
                f(coord);
                if first_only {
                    return true;
                }
            }
            false
        };
        match self {
            Geometry::Point(p) => f(&p.0),
            Geometry::LineString(line) => {
                visit_line(line, f);
            },
            Geometry::Polygon(poly) => {
                for ring in poly.rings() {
                    if visit_line(ring, f) {
                        return;
                    }
                }
            },
            Geometry::MultiPoint(points) => {
                for point in &points.0 {
                    f(&point.0);
                    if first_only {
                        return;
                    }
                }
            },
            Geometry::MultiLineString(lines) => {
                for line in &lines.0 {
                    if visit_line(line, f) {
                        return;
                    }
                }
            },
            Geometry::MultiPolygon(polys) => {
                for ring in polys.0.iter().flat_map(Polygon::rings) {
                    if visit_line(ring, f) {
                        return;
                    }
                }
            },
        }
    }
}

fn to_geo_coord(coord: &Coord) -> geo_types::Coord<f64> {
    geo_types::coord! { x: coord.x, y: coord.y }
}

fn to_geo_line(line: &LineString) -> geo_types::LineString<f64> {
    line.0.iter().map(to_geo_coord).collect()
}

fn to_geo_polygon(poly: &Polygon) -> geo_types::Polygon<f64> {
    geo_types::Polygon::new(
        to_geo_line(&poly.exterior),
        poly.interiors.iter().map(to_geo_line).collect(),
    )
}

/// Planar conversion; Z and M ordinates are dropped.
impl From<&Geometry> for geo_types::Geometry<f64> {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(p) => geo_types::Point::from(to_geo_coord(&p.0)).into(),
            Geometry::LineString(line) => to_geo_line(line).into(),
            Geometry::Polygon(poly) => to_geo_polygon(poly).into(),
            Geometry::MultiPoint(points) => geo_types::MultiPoint::new(
                points
                    .0
                    .iter()
                    .map(|p| geo_types::Point::from(to_geo_coord(&p.0)))
                    .collect(),
            )
            .into(),
            Geometry::MultiLineString(lines) => {
                geo_types::MultiLineString::new(lines.0.iter().map(to_geo_line).collect()).into()
            },
            Geometry::MultiPolygon(polys) => {
                geo_types::MultiPolygon::new(polys.0.iter().map(to_geo_polygon).collect()).into()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> LineString {
        LineString(vec![
            Coord::xy(x0, y0),
            Coord::xy(x0, y0 + size),
            Coord::xy(x0 + size, y0 + size),
            Coord::xy(x0 + size, y0),
            Coord::xy(x0, y0),
        ])
    }

    #[test]
    fn envelope_covers_every_vertex() {
        let geometry = Geometry::MultiPolygon(MultiPolygon(vec![
            Polygon::new(square(0.0, 0.0, 10.0), vec![square(2.0, 2.0, 1.0)]),
            Polygon::new(square(-5.0, 20.0, 2.0), vec![]),
        ]));

        let envelope = geometry.envelope().unwrap();
        assert_eq!(envelope, Envelope::new(-5.0, 0.0, 10.0, 22.0));
        geometry.for_each_coord(|c| assert!(envelope.contains_coord(c)));
    }

    #[test]
    fn empty_geometry_has_no_envelope() {
        let geometry = Geometry::MultiLineString(MultiLineString::default());
        assert!(geometry.envelope().is_none());
        assert!(geometry.is_empty());
        assert_eq!(geometry.dimension(), Dimension::Xy);
    }

    #[test]
    fn envelope_intersection_is_inclusive() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let touching = Envelope::new(1.0, 1.0, 2.0, 2.0);
        let apart = Envelope::new(1.5, 0.0, 2.0, 1.0);
        assert!(a.intersects(&touching));
        assert!(touching.intersects(&a));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn envelope_new_normalizes_axis_order() {
        let env = Envelope::new(5.0, 1.0, -5.0, -1.0);
        assert_eq!(env.min_x, -5.0);
        assert_eq!(env.max_y, 1.0);
    }

    #[test]
    fn dimension_follows_vertices() {
        let z = Geometry::Point(Point(Coord::new(1.0, 2.0, Some(3.0), None)));
        let m = Geometry::Point(Point(Coord::new(1.0, 2.0, None, Some(4.0))));
        let zm = Geometry::Point(Point(Coord::new(1.0, 2.0, Some(3.0), Some(4.0))));
        assert_eq!(z.dimension(), Dimension::Xyz);
        assert_eq!(m.dimension(), Dimension::Xym);
        assert_eq!(zm.dimension(), Dimension::Xyzm);
        assert_eq!(zm.geometry_type().to_string(), "Point ZM");
    }

    #[test]
    fn kind_promotion() {
        assert_eq!(GeometryKind::LineString.promoted(), GeometryKind::MultiLineString);
        assert_eq!(GeometryKind::Polygon.promoted(), GeometryKind::MultiPolygon);
        assert_eq!(GeometryKind::Point.promoted(), GeometryKind::Point);
        assert!(GeometryKind::MultiPoint.is_multi());
    }

    #[test]
    fn converts_to_geo_types() {
        let geometry = Geometry::MultiPolygon(MultiPolygon(vec![Polygon::new(
            square(0.0, 0.0, 1.0),
            vec![],
        )]));
        let converted: geo_types::Geometry<f64> = (&geometry).into();
        match converted {
            geo_types::Geometry::MultiPolygon(mp) => {
                assert_eq!(mp.0.len(), 1);
                assert_eq!(mp.0[0].exterior().0.len(), 5);
            },
            other => panic!("expected multipolygon, got {other:?}"),
        }

        let rect: geo_types::Rect<f64> = geometry.envelope().unwrap().into();
        assert_eq!(rect.max().x, 1.0);
    }
}
