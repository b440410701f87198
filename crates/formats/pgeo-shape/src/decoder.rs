//! Binary shape blob decoding.
//!
//! All values are little-endian. A blob starts with a 32-bit type code,
//! followed by a layout determined by the code's family:
//!
//! - point: `x, y, [z], [m]`
//! - multipoint: `bbox, n, xy * n, [zrange, z * n], [mrange, m * n]`
//! - arc / polygon: `bbox, nparts, npoints, starts * nparts, xy * npoints, [zrange, z * npoints], [mrange, m * npoints]`

use bytes::Buf;

use crate::error::{ShapeDecodeError, ShapeResult};
use crate::geometry::{
    Coord, Geometry, GeometryKind, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
};
use crate::rings::organize_rings;
use crate::shape_type::{ShapeFamily, ShapeType};

/// Upper bound on the point count of a single shape.
pub const MAX_POINTS: usize = 50_000_000;
/// Upper bound on the part count of a single shape.
pub const MAX_PARTS: usize = 10_000_000;

const BBOX_BYTES: usize = 32;
const RANGE_BYTES: usize = 16;

struct ShapeReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> ShapeReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            buf: bytes,
            len: bytes.len(),
        }
    }

    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, needed: usize) -> ShapeResult<()> {
        if self.buf.remaining() < needed {
            return Err(ShapeDecodeError::Truncated {
                offset: self.offset(),
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn read_u32(&mut self) -> ShapeResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn read_f64(&mut self) -> ShapeResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn skip(&mut self, n: usize) -> ShapeResult<()> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    /// Reads a signed count and checks it against `max`.
    fn count(&mut self, what: &str, max: usize) -> ShapeResult<usize> {
        let offset = self.offset();
        self.need(4)?;
        let raw = self.buf.get_i32_le();
        let value = usize::try_from(raw)
            .map_err(|_| ShapeDecodeError::corrupt(offset, format!("negative {what} count {raw}")))?;
        if value > max {
            return Err(ShapeDecodeError::corrupt(
                offset,
                format!("{what} count {value} exceeds limit {max}"),
            ));
        }
        Ok(value)
    }

    fn xy_block(&mut self, n: usize) -> ShapeResult<Vec<Coord>> {
        self.need(block_size(self.offset(), n, 16, 0)?)?;
        let mut coords = Vec::with_capacity(n);
        for _ in 0..n {
            let x = self.buf.get_f64_le();
            let y = self.buf.get_f64_le();
            coords.push(Coord::xy(x, y));
        }
        Ok(coords)
    }

    /// Reads a range header plus one ordinate per vertex.
    fn ordinate_block(&mut self, n: usize) -> ShapeResult<Vec<f64>> {
        self.need(block_size(self.offset(), n, 8, RANGE_BYTES)?)?;
        self.buf.advance(RANGE_BYTES);
        Ok((0..n).map(|_| self.buf.get_f64_le()).collect())
    }

    /// Reads the Z and M blocks that follow the XY block.
    fn measures(&mut self, shape_type: &ShapeType, coords: &mut [Coord]) -> ShapeResult<()> {
        if shape_type.has_z {
            let zs = self.ordinate_block(coords.len())?;
            coords.iter_mut().zip(zs).for_each(|(c, z)| c.z = Some(z));
        }
        if shape_type.has_m && !(shape_type.m_optional() && self.remaining() == 0) {
            let ms = self.ordinate_block(coords.len())?;
            coords.iter_mut().zip(ms).for_each(|(c, m)| c.m = Some(m));
        }
        Ok(())
    }
}

fn block_size(offset: usize, n: usize, per_item: usize, header: usize) -> ShapeResult<usize> {
    n.checked_mul(per_item)
        .and_then(|bytes| bytes.checked_add(header))
        .ok_or_else(|| ShapeDecodeError::corrupt(offset, "coordinate block size overflows"))
}

/// Decodes a shape blob into a geometry.
///
/// Returns `Ok(None)` for an empty blob or the null shape type. Line and
/// polygon shapes always decode to their multi-part forms. When `declared`
/// is given, the result is conformed to it: a single point under a
/// `MultiPoint` declaration is wrapped, and any other disagreement fails.
///
/// # Errors
///
/// Returns a [`ShapeDecodeError`] for truncated, corrupt, unknown or
/// unsupported blobs, and for a family that contradicts `declared`.
pub fn decode(bytes: &[u8], declared: Option<GeometryKind>) -> ShapeResult<Option<Geometry>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut reader = ShapeReader::new(bytes);
    let shape_type = ShapeType::from_code(reader.read_u32()?)?;

    if shape_type.has_curves {
        return Err(ShapeDecodeError::unsupported("curve geometry"));
    }

    let geometry = match shape_type.family {
        ShapeFamily::Null => return Ok(None),
        ShapeFamily::MultiPatch => return Err(ShapeDecodeError::unsupported("multipatch")),
        ShapeFamily::Point => decode_point(&mut reader, &shape_type)?,
        ShapeFamily::MultiPoint => decode_multipoint(&mut reader, &shape_type)?,
        ShapeFamily::Arc | ShapeFamily::Polygon => decode_parts(&mut reader, &shape_type)?,
    };

    conform(geometry, declared).map(Some)
}

fn decode_point(reader: &mut ShapeReader<'_>, shape_type: &ShapeType) -> ShapeResult<Geometry> {
    let x = reader.read_f64()?;
    let y = reader.read_f64()?;
    let z = if shape_type.has_z {
        Some(reader.read_f64()?)
    } else {
        None
    };
    let m = if shape_type.has_m && !(shape_type.m_optional() && reader.remaining() == 0) {
        Some(reader.read_f64()?)
    } else {
        None
    };
    Ok(Geometry::Point(Point(Coord::new(x, y, z, m))))
}

fn decode_multipoint(
    reader: &mut ShapeReader<'_>,
    shape_type: &ShapeType,
) -> ShapeResult<Geometry> {
    reader.skip(BBOX_BYTES)?;
    let n = reader.count("point", MAX_POINTS)?;
    let mut coords = reader.xy_block(n)?;
    reader.measures(shape_type, &mut coords)?;
    Ok(Geometry::MultiPoint(MultiPoint(
        coords.into_iter().map(Point).collect(),
    )))
}

fn decode_parts(reader: &mut ShapeReader<'_>, shape_type: &ShapeType) -> ShapeResult<Geometry> {
    reader.skip(BBOX_BYTES)?;
    let nparts = reader.count("part", MAX_PARTS)?;
    let npoints = reader.count("point", MAX_POINTS)?;
    if npoints > 0 && nparts == 0 {
        return Err(ShapeDecodeError::corrupt(
            reader.offset(),
            format!("{npoints} points but no parts"),
        ));
    }

    let starts_offset = reader.offset();
    reader.need(block_size(starts_offset, nparts, 4, 0)?)?;
    let mut starts = Vec::with_capacity(nparts);
    for index in 0..nparts {
        let raw = reader.buf.get_i32_le();
        let start = usize::try_from(raw).ok().filter(|&s| s < npoints).ok_or_else(|| {
            ShapeDecodeError::corrupt(
                starts_offset + index * 4,
                format!("part {index} starts at {raw}, outside 0..{npoints}"),
            )
        })?;
        if starts.last().is_some_and(|&previous| start < previous) {
            return Err(ShapeDecodeError::corrupt(
                starts_offset + index * 4,
                format!("part {index} starts before the previous part"),
            ));
        }
        starts.push(start);
    }

    let mut coords = reader.xy_block(npoints)?;
    reader.measures(shape_type, &mut coords)?;

    let mut parts = Vec::with_capacity(nparts);
    for &start in starts.iter().rev() {
        parts.push(LineString(coords.split_off(start)));
    }
    parts.reverse();

    Ok(match shape_type.family {
        ShapeFamily::Polygon => Geometry::MultiPolygon(MultiPolygon(organize_rings(parts))),
        _ => Geometry::MultiLineString(MultiLineString(parts)),
    })
}

fn conform(geometry: Geometry, declared: Option<GeometryKind>) -> ShapeResult<Geometry> {
    let Some(declared) = declared else {
        return Ok(geometry);
    };
    let found = geometry.kind();
    match (declared, geometry) {
        (GeometryKind::MultiPoint, Geometry::Point(point)) => {
            Ok(Geometry::MultiPoint(MultiPoint(vec![point])))
        },
        (declared, geometry) if declared.promoted() == found => Ok(geometry),
        (declared, _) => Err(ShapeDecodeError::TypeMismatch { declared, found }),
    }
}
