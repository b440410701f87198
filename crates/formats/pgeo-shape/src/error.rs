//! Error types for shape blob decoding.

use thiserror::Error;

use crate::geometry::GeometryKind;

/// Result alias for shape decoding.
pub type ShapeResult<T> = Result<T, ShapeDecodeError>;

/// Errors raised while decoding a shape blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeDecodeError {
    #[error("shape blob truncated at byte {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown shape type code {code}")]
    UnknownShapeType { code: u32 },

    #[error("unsupported shape type: {name}")]
    UnsupportedShapeType { name: String },

    #[error("corrupt shape blob at byte {offset}: {message}")]
    Corrupt { offset: usize, message: String },

    #[error("shape of type {found} does not match declared type {declared}")]
    TypeMismatch {
        declared: GeometryKind,
        found: GeometryKind,
    },
}

impl ShapeDecodeError {
    pub(crate) fn corrupt(offset: usize, message: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(name: impl Into<String>) -> Self {
        Self::UnsupportedShapeType { name: name.into() }
    }
}
