//! Shape type codes and their decoding properties.

use crate::error::{ShapeDecodeError, ShapeResult};
use crate::geometry::Dimension;

const SHPT_NULL: u32 = 0;
const SHPT_POINT: u32 = 1;
const SHPT_ARC: u32 = 3;
const SHPT_POLYGON: u32 = 5;
const SHPT_MULTIPOINT: u32 = 8;
const SHPT_POINTZ: u32 = 9;
const SHPT_ARCZ: u32 = 10;
const SHPT_POINTZM: u32 = 11;
const SHPT_ARCZM: u32 = 13;
const SHPT_POLYGONZM: u32 = 15;
const SHPT_MULTIPOINTZM: u32 = 18;
const SHPT_POLYGONZ: u32 = 19;
const SHPT_MULTIPOINTZ: u32 = 20;
const SHPT_POINTM: u32 = 21;
const SHPT_ARCM: u32 = 23;
const SHPT_POLYGONM: u32 = 25;
const SHPT_MULTIPOINTM: u32 = 28;
const SHPT_MULTIPATCHM: u32 = 31;
const SHPT_MULTIPATCH: u32 = 32;

const SHPT_GENERALPOLYLINE: u32 = 50;
const SHPT_GENERALPOLYGON: u32 = 51;
const SHPT_GENERALPOINT: u32 = 52;
const SHPT_GENERALMULTIPOINT: u32 = 53;
const SHPT_GENERALMULTIPATCH: u32 = 54;

const EXT_SHAPE_Z_FLAG: u32 = 0x8000_0000;
const EXT_SHAPE_M_FLAG: u32 = 0x4000_0000;
const EXT_SHAPE_CURVE_FLAG: u32 = 0x2000_0000;
const GENERAL_TYPE_MASK: u32 = 0xff;

/// Structural family of a shape, independent of Z/M.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeFamily {
    Null,
    Point,
    MultiPoint,
    Arc,
    Polygon,
    MultiPatch,
}

/// A decoded shape type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeType {
    pub code: u32,
    pub family: ShapeFamily,
    pub has_z: bool,
    pub has_m: bool,
    /// Code uses the extended form with flag bits in the high byte.
    pub general: bool,
    pub has_curves: bool,
}

impl ShapeType {
    const fn plain(code: u32, family: ShapeFamily, has_z: bool, has_m: bool) -> Self {
        Self {
            code,
            family,
            has_z,
            has_m,
            general: false,
            has_curves: false,
        }
    }

    /// Classifies a raw type code.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeDecodeError::UnknownShapeType`] when the code is neither
    /// a classic nor an extended shape type.
    pub fn from_code(code: u32) -> ShapeResult<Self> {
        use ShapeFamily as F;

        let plain = match code {
            SHPT_NULL => Some(Self::plain(code, F::Null, false, false)),
            SHPT_POINT => Some(Self::plain(code, F::Point, false, false)),
            SHPT_POINTZ => Some(Self::plain(code, F::Point, true, false)),
            SHPT_POINTM => Some(Self::plain(code, F::Point, false, true)),
            SHPT_POINTZM => Some(Self::plain(code, F::Point, true, true)),
            SHPT_MULTIPOINT => Some(Self::plain(code, F::MultiPoint, false, false)),
            SHPT_MULTIPOINTZ => Some(Self::plain(code, F::MultiPoint, true, false)),
            SHPT_MULTIPOINTM => Some(Self::plain(code, F::MultiPoint, false, true)),
            SHPT_MULTIPOINTZM => Some(Self::plain(code, F::MultiPoint, true, true)),
            SHPT_ARC => Some(Self::plain(code, F::Arc, false, false)),
            SHPT_ARCZ => Some(Self::plain(code, F::Arc, true, false)),
            SHPT_ARCM => Some(Self::plain(code, F::Arc, false, true)),
            SHPT_ARCZM => Some(Self::plain(code, F::Arc, true, true)),
            SHPT_POLYGON => Some(Self::plain(code, F::Polygon, false, false)),
            SHPT_POLYGONZ => Some(Self::plain(code, F::Polygon, true, false)),
            SHPT_POLYGONM => Some(Self::plain(code, F::Polygon, false, true)),
            SHPT_POLYGONZM => Some(Self::plain(code, F::Polygon, true, true)),
            SHPT_MULTIPATCH => Some(Self::plain(code, F::MultiPatch, true, false)),
            SHPT_MULTIPATCHM => Some(Self::plain(code, F::MultiPatch, true, true)),
            _ => None,
        };
        if let Some(shape_type) = plain {
            return Ok(shape_type);
        }

        let family = match code & GENERAL_TYPE_MASK {
            SHPT_GENERALPOLYLINE => F::Arc,
            SHPT_GENERALPOLYGON => F::Polygon,
            SHPT_GENERALPOINT => F::Point,
            SHPT_GENERALMULTIPOINT => F::MultiPoint,
            SHPT_GENERALMULTIPATCH => F::MultiPatch,
            _ => return Err(ShapeDecodeError::UnknownShapeType { code }),
        };
        Ok(Self {
            code,
            family,
            has_z: code & EXT_SHAPE_Z_FLAG != 0,
            has_m: code & EXT_SHAPE_M_FLAG != 0,
            general: true,
            has_curves: code & EXT_SHAPE_CURVE_FLAG != 0,
        })
    }

    /// Whether a missing M block is tolerated. Classic codes may omit it;
    /// extended codes that set the M flag must carry it.
    #[must_use]
    pub const fn m_optional(&self) -> bool {
        !self.general
    }

    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        Dimension::from_flags(self.has_z, self.has_m)
    }
}
