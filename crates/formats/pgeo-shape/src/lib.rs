//! Binary shape decoding for personal geodatabase containers.
//!
//! Geometry columns in these containers hold ESRI shape buffers: a shape-type
//! tag followed by bounding box, part and vertex arrays, and optional Z and M
//! blocks. This crate decodes such buffers into a canonical, closed geometry
//! model and applies the normalisation rules every consumer relies on:
//!
//! - polylines always decode to [`Geometry::MultiLineString`] and polygons to
//!   [`Geometry::MultiPolygon`], whatever their part count;
//! - polygon rings are grouped into polygons by orientation and nesting;
//! - Z and M ordinates are carried independently.
//!
//! The model implements [`geozero::GeozeroGeometry`], so WKT and WKB export
//! come from `geozero`. [`encode`] writes the classic shape layout back out,
//! which is what fixture containers are built from.

mod decoder;
mod encode;
mod error;
mod geometry;
mod processor;
mod rings;
mod shape_type;

pub use decoder::{MAX_PARTS, MAX_POINTS, decode};
pub use encode::encode;
pub use error::{ShapeDecodeError, ShapeResult};
pub use geometry::{
    Coord, Dimension, Envelope, Geometry, GeometryKind, GeometryType, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
pub use shape_type::{ShapeFamily, ShapeType};
