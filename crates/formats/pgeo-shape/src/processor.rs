//! `geozero` integration: feeds decoded geometries to any [`GeomProcessor`].

use geozero::error::Result;
use geozero::{CoordDimensions, GeomProcessor, GeozeroGeometry};

use crate::geometry::{Coord, Geometry, LineString, Polygon};

impl GeozeroGeometry for Geometry {
    fn process_geom<P: GeomProcessor>(&self, processor: &mut P) -> Result<()> {
        process_geometry(self, 0, processor)
    }

    fn dims(&self) -> CoordDimensions {
        let dimension = self.dimension();
        CoordDimensions {
            z: dimension.has_z(),
            m: dimension.has_m(),
            t: false,
            tm: false,
        }
    }
}

fn process_coord<P: GeomProcessor>(coord: &Coord, idx: usize, processor: &mut P) -> Result<()> {
    if processor.multi_dim() {
        processor.coordinate(coord.x, coord.y, coord.z, coord.m, None, None, idx)
    } else {
        processor.xy(coord.x, coord.y, idx)
    }
}

fn process_linestring<P: GeomProcessor>(
    line: &LineString,
    tagged: bool,
    idx: usize,
    processor: &mut P,
) -> Result<()> {
    processor.linestring_begin(tagged, line.0.len(), idx)?;
    for (i, coord) in line.0.iter().enumerate() {
        process_coord(coord, i, processor)?;
    }
    processor.linestring_end(tagged, idx)
}

fn process_polygon<P: GeomProcessor>(
    polygon: &Polygon,
    tagged: bool,
    idx: usize,
    processor: &mut P,
) -> Result<()> {
    processor.polygon_begin(tagged, polygon.interiors().len() + 1, idx)?;
    process_linestring(polygon.exterior(), false, 0, processor)?;
    for (i, ring) in polygon.interiors().iter().enumerate() {
        process_linestring(ring, false, i + 1, processor)?;
    }
    processor.polygon_end(tagged, idx)
}

fn process_geometry<P: GeomProcessor>(
    geometry: &Geometry,
    idx: usize,
    processor: &mut P,
) -> Result<()> {
    match geometry {
        Geometry::Point(point) => {
            processor.point_begin(idx)?;
            process_coord(&point.0, 0, processor)?;
            processor.point_end(idx)
        },
        Geometry::LineString(line) => process_linestring(line, true, idx, processor),
        Geometry::Polygon(polygon) => process_polygon(polygon, true, idx, processor),
        Geometry::MultiPoint(points) => {
            processor.multipoint_begin(points.0.len(), idx)?;
            for (i, point) in points.0.iter().enumerate() {
                process_coord(&point.0, i, processor)?;
            }
            processor.multipoint_end(idx)
        },
        Geometry::MultiLineString(lines) => {
            processor.multilinestring_begin(lines.0.len(), idx)?;
            for (i, line) in lines.0.iter().enumerate() {
                process_linestring(line, false, i, processor)?;
            }
            processor.multilinestring_end(idx)
        },
        Geometry::MultiPolygon(polygons) => {
            processor.multipolygon_begin(polygons.0.len(), idx)?;
            for (i, polygon) in polygons.0.iter().enumerate() {
                process_polygon(polygon, false, i, processor)?;
            }
            processor.multipolygon_end(idx)
        },
    }
}

#[cfg(test)]
mod tests {
    use geozero::ToWkt;

    use super::*;
    use crate::geometry::{MultiLineString, MultiPolygon, Point};

    #[derive(Default)]
    struct Collector {
        coords: Vec<(f64, f64, Option<f64>, Option<f64>)>,
        rings: usize,
    }

    impl GeomProcessor for Collector {
        fn dimensions(&self) -> CoordDimensions {
            CoordDimensions::xyzm()
        }

        fn coordinate(
            &mut self,
            x: f64,
            y: f64,
            z: Option<f64>,
            m: Option<f64>,
            _t: Option<f64>,
            _tm: Option<u64>,
            _idx: usize,
        ) -> Result<()> {
            self.coords.push((x, y, z, m));
            Ok(())
        }

        fn linestring_begin(&mut self, tagged: bool, _size: usize, _idx: usize) -> Result<()> {
            if !tagged {
                self.rings += 1;
            }
            Ok(())
        }
    }

    fn square() -> LineString {
        LineString(vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(0.0, 1.0),
            Coord::xy(1.0, 1.0),
            Coord::xy(1.0, 0.0),
            Coord::xy(0.0, 0.0),
        ])
    }

    #[test]
    fn multilinestring_to_wkt() {
        let geometry = Geometry::MultiLineString(MultiLineString(vec![LineString(vec![
            Coord::xy(10.0, 20.0),
            Coord::xy(30.0, 40.0),
        ])]));
        let wkt = geometry.to_wkt().unwrap();
        assert!(wkt.starts_with("MULTILINESTRING"), "{wkt}");
        assert!(wkt.contains("10 20"), "{wkt}");
        assert!(wkt.contains("30 40"), "{wkt}");
    }

    #[test]
    fn multipolygon_to_wkt() {
        let geometry =
            Geometry::MultiPolygon(MultiPolygon(vec![Polygon::new(square(), Vec::new())]));
        let wkt = geometry.to_wkt().unwrap();
        assert!(wkt.starts_with("MULTIPOLYGON"), "{wkt}");
    }

    #[test]
    fn measures_reach_multi_dim_processors() {
        let geometry = Geometry::Point(Point(Coord::new(-2.0, -1.0, Some(4.0), Some(13.0))));
        let mut collector = Collector::default();
        geometry.process_geom(&mut collector).unwrap();
        assert_eq!(collector.coords, vec![(-2.0, -1.0, Some(4.0), Some(13.0))]);

        let dims = geometry.dims();
        assert!(dims.z && dims.m);
    }

    #[test]
    fn polygon_rings_are_untagged() {
        let geometry = Geometry::MultiPolygon(MultiPolygon(vec![Polygon::new(
            square(),
            vec![square()],
        )]));
        let mut collector = Collector::default();
        geometry.process_geom(&mut collector).unwrap();
        assert_eq!(collector.rings, 2);
        assert_eq!(collector.coords.len(), 10);
    }
}
