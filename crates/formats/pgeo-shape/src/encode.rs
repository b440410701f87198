//! Shape blob encoding using the classic type codes.

use bytes::BufMut;

use crate::geometry::{Coord, Dimension, Geometry, LineString, Polygon};

const fn point_code(dimension: Dimension) -> u32 {
    match dimension {
        Dimension::Xy => 1,
        Dimension::Xyz => 9,
        Dimension::Xym => 21,
        Dimension::Xyzm => 11,
    }
}

const fn multipoint_code(dimension: Dimension) -> u32 {
    match dimension {
        Dimension::Xy => 8,
        Dimension::Xyz => 20,
        Dimension::Xym => 28,
        Dimension::Xyzm => 18,
    }
}

const fn arc_code(dimension: Dimension) -> u32 {
    match dimension {
        Dimension::Xy => 3,
        Dimension::Xyz => 10,
        Dimension::Xym => 23,
        Dimension::Xyzm => 13,
    }
}

const fn polygon_code(dimension: Dimension) -> u32 {
    match dimension {
        Dimension::Xy => 5,
        Dimension::Xyz => 19,
        Dimension::Xym => 25,
        Dimension::Xyzm => 15,
    }
}

fn range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn put_bbox(buf: &mut Vec<u8>, geometry: &Geometry) {
    let (min_x, min_y, max_x, max_y) = geometry
        .envelope()
        .map_or((0.0, 0.0, 0.0, 0.0), |e| (e.min_x, e.min_y, e.max_x, e.max_y));
    buf.put_f64_le(min_x);
    buf.put_f64_le(min_y);
    buf.put_f64_le(max_x);
    buf.put_f64_le(max_y);
}

fn put_vertices(buf: &mut Vec<u8>, coords: &[&Coord], dimension: Dimension) {
    for c in coords {
        buf.put_f64_le(c.x);
        buf.put_f64_le(c.y);
    }
    if dimension.has_z() {
        let zs: Vec<f64> = coords.iter().map(|c| c.z.unwrap_or(0.0)).collect();
        put_ordinates(buf, &zs);
    }
    if dimension.has_m() {
        let ms: Vec<f64> = coords.iter().map(|c| c.m.unwrap_or(0.0)).collect();
        put_ordinates(buf, &ms);
    }
}

fn put_ordinates(buf: &mut Vec<u8>, values: &[f64]) {
    let (lo, hi) = if values.is_empty() {
        (0.0, 0.0)
    } else {
        range(values.iter().copied())
    };
    buf.put_f64_le(lo);
    buf.put_f64_le(hi);
    values.iter().for_each(|v| buf.put_f64_le(*v));
}

fn put_parts(buf: &mut Vec<u8>, code: u32, geometry: &Geometry, parts: &[&LineString]) {
    let dimension = geometry.dimension();
    buf.put_u32_le(code);
    put_bbox(buf, geometry);
    let coords: Vec<&Coord> = parts.iter().flat_map(|p| p.0.iter()).collect();
    buf.put_i32_le(count(parts.len()));
    buf.put_i32_le(count(coords.len()));
    let mut start = 0;
    for part in parts {
        buf.put_i32_le(count(start));
        start += part.0.len();
    }
    put_vertices(buf, &coords, dimension);
}

fn polygon_rings(polygon: &Polygon) -> impl Iterator<Item = &LineString> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

/// Encodes a geometry as a shape blob.
///
/// Rings are written as given, so exteriors should be clockwise and holes
/// counter-clockwise for the blob to decode to the same polygons.
#[must_use]
pub fn encode(geometry: &Geometry) -> Vec<u8> {
    let dimension = geometry.dimension();
    let mut buf = Vec::new();
    match geometry {
        Geometry::Point(point) => {
            buf.put_u32_le(point_code(dimension));
            buf.put_f64_le(point.0.x);
            buf.put_f64_le(point.0.y);
            if let Some(z) = point.0.z {
                buf.put_f64_le(z);
            }
            if let Some(m) = point.0.m {
                buf.put_f64_le(m);
            }
        },
        Geometry::MultiPoint(points) => {
            buf.put_u32_le(multipoint_code(dimension));
            put_bbox(&mut buf, geometry);
            buf.put_i32_le(count(points.0.len()));
            let coords: Vec<&Coord> = points.0.iter().map(|p| &p.0).collect();
            put_vertices(&mut buf, &coords, dimension);
        },
        Geometry::LineString(line) => {
            put_parts(&mut buf, arc_code(dimension), geometry, &[line]);
        },
        Geometry::MultiLineString(lines) => {
            let parts: Vec<&LineString> = lines.0.iter().collect();
            put_parts(&mut buf, arc_code(dimension), geometry, &parts);
        },
        Geometry::Polygon(polygon) => {
            let parts: Vec<&LineString> = polygon_rings(polygon).collect();
            put_parts(&mut buf, polygon_code(dimension), geometry, &parts);
        },
        Geometry::MultiPolygon(polygons) => {
            let parts: Vec<&LineString> = polygons.0.iter().flat_map(polygon_rings).collect();
            put_parts(&mut buf, polygon_code(dimension), geometry, &parts);
        },
    }
    buf
}
