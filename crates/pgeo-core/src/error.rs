//! Error types for personal geodatabase access.
//!
//! [`PGeoError`] is the root type returned by every fallible operation. It
//! delegates display formatting to one domain enum per failure class, so
//! callers can match on the class (for example to skip a row that failed at
//! the feature level) while still getting precise messages.

use std::path::PathBuf;

use pgeo_core_common::{ExprError, SourceError};
use pgeo_shape::ShapeDecodeError;
use thiserror::Error;

use crate::query::ResultSetId;
use crate::types::FieldType;

/// Main error type for geodatabase operations.
#[derive(Debug, Error)]
pub enum PGeoError {
    /// The container could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// A table's geometry metadata was unusable.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A single row could not be turned into a feature.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// An attribute filter was rejected.
    #[error(transparent)]
    FilterParse(#[from] FilterParseError),

    /// A result-set handle was used after release or was never issued.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// The backing engine failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Failures to open a container. No partial dataset is ever returned.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The container file does not exist.
    #[error("Container not found: '{path}'")]
    NotFound {
        /// The requested path
        path: PathBuf,
    },

    /// The container exists but could not be read.
    #[error("Failed to read container '{path}': {source}")]
    Unreadable {
        /// The container path
        path: PathBuf,
        /// The underlying engine error
        #[source]
        source: SourceError,
    },

    /// The file is not a container the engine understands.
    #[error("'{path}' is not a personal geodatabase container: {reason}")]
    NotRecognized {
        /// The container path
        path: PathBuf,
        /// Why the engine rejected it
        reason: String,
    },

    /// The table list or a table's columns could not be enumerated.
    #[error("Failed to enumerate tables: {source}")]
    Enumeration {
        /// The underlying engine error
        #[source]
        source: SourceError,
    },
}

/// Problems with geometry metadata. These degrade a table to non-spatial
/// instead of failing the open.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The geometry registry table could not be read.
    #[error("Geometry registry '{registry}' is unavailable: {source}")]
    RegistryUnavailable {
        /// The registry table name
        registry: String,
        /// The underlying engine error
        #[source]
        source: SourceError,
    },

    /// A registry row could not be interpreted.
    #[error("Invalid geometry registry row {row}: {message}")]
    InvalidRegistryRow {
        /// 0-based registry row number
        row: usize,
        /// What was wrong with it
        message: String,
    },

    /// The registry names a table the container does not have.
    #[error("Geometry registry references missing table '{table}'")]
    MissingTable {
        /// The table name from the registry
        table: String,
    },

    /// The registry names a geometry column the table does not have.
    #[error("Table '{table}' has no geometry column '{column}'")]
    MissingColumn {
        /// The table name
        table: String,
        /// The column name from the registry
        column: String,
    },

    /// The registry declares a shape type this engine does not expose.
    #[error("Table '{table}' has unsupported shape type {code}")]
    UnsupportedShapeType {
        /// The table name
        table: String,
        /// The registry shape type code
        code: i64,
    },
}

/// Row-level failures. A scan may continue with the next row.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The geometry blob could not be decoded.
    #[error("Failed to decode geometry of feature {fid} in '{layer}': {source}")]
    Decode {
        /// The layer name
        layer: String,
        /// The feature identifier
        fid: i64,
        /// The decoder error
        #[source]
        source: ShapeDecodeError,
    },

    /// A column value could not be converted to its field type.
    #[error("Feature {fid} in '{layer}': field '{field}' value {value} is not a valid {expected}")]
    InvalidValue {
        /// The layer name
        layer: String,
        /// The feature identifier
        fid: i64,
        /// The field name
        field: String,
        /// The offending value, rendered for display
        value: String,
        /// The declared field type
        expected: FieldType,
    },
}

/// Attribute filter rejections. The previous filter stays in effect.
#[derive(Debug, Error)]
pub enum FilterParseError {
    /// The expression is not valid syntax.
    #[error("Invalid attribute filter '{expression}': {source}")]
    Syntax {
        /// The expression as given
        expression: String,
        /// The parser error
        #[source]
        source: ExprError,
    },

    /// The expression references a column the layer does not have.
    #[error("Invalid attribute filter '{expression}': unknown column '{column}'")]
    UnknownColumn {
        /// The expression as given
        expression: String,
        /// The unresolved column
        column: String,
    },
}

/// Invalid result-set handles.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The handle was already released.
    #[error("Result set {id} has already been released")]
    Released {
        /// The handle
        id: ResultSetId,
    },

    /// The handle was never issued by this dataset.
    #[error("Result set {id} was not issued by this dataset")]
    Unknown {
        /// The handle
        id: ResultSetId,
    },
}

/// Result type alias that uses [`PGeoError`].
pub type Result<T> = std::result::Result<T, PGeoError>;

impl PGeoError {
    /// Returns a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Open(e) => e.user_message(),
            Self::Schema(e) => format!("Schema problem: {e}"),
            Self::Feature(e) => e.to_string(),
            Self::FilterParse(e) => e.to_string(),
            Self::Handle(e) => format!("Invalid handle: {e}"),
            Self::Source(e) => format!("Database error: {e}"),
        }
    }

    /// Returns a suggestion for how to fix the problem, if one applies.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Open(e) => e.recovery_suggestion(),
            Self::Feature(FeatureError::Decode { .. }) => Some(
                "Use --tolerate-decode-errors to read the row without its geometry.".to_string(),
            ),
            Self::FilterParse(FilterParseError::UnknownColumn { .. }) => {
                Some("Run 'pgeo info' to list the layer's fields.".to_string())
            },
            Self::FilterParse(FilterParseError::Syntax { .. }) => Some(
                "Filters use SQL-like syntax, for example: OWNER = 'City' AND OBJECTID < 10"
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Returns `true` for errors confined to a single row, after which a
    /// scan can continue.
    #[must_use]
    pub fn is_feature_level(&self) -> bool {
        matches!(self, Self::Feature(_))
    }
}

impl OpenError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { path } => format!("File not found: {}", path.display()),
            Self::NotRecognized { path, reason } => {
                format!("{} is not a recognized container ({reason})", path.display())
            },
            Self::Unreadable { .. } | Self::Enumeration { .. } => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => {
                Some("Check that the file path is correct and the file exists.".to_string())
            },
            Self::Unreadable { .. } => {
                Some("Check file permissions and ensure you have access.".to_string())
            },
            Self::NotRecognized { .. } | Self::Enumeration { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_level_classification() {
        let err: PGeoError = FeatureError::Decode {
            layer: "lines".into(),
            fid: 3,
            source: ShapeDecodeError::UnknownShapeType { code: 77 },
        }
        .into();
        assert!(err.is_feature_level());
        assert!(err.recovery_suggestion().is_some());
        assert_eq!(
            err.to_string(),
            "Failed to decode geometry of feature 3 in 'lines': unknown shape type code 77"
        );

        let err: PGeoError = HandleError::Released {
            id: ResultSetId::new(1),
        }
        .into();
        assert!(!err.is_feature_level());
    }

    #[test]
    fn open_errors_have_suggestions() {
        let err: PGeoError = OpenError::NotFound {
            path: PathBuf::from("missing.json"),
        }
        .into();
        assert_eq!(err.user_message(), "File not found: missing.json");
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn invalid_value_message() {
        let err = FeatureError::InvalidValue {
            layer: "t".into(),
            fid: 0,
            field: "n".into(),
            value: "'abc'".into(),
            expected: FieldType::Integer,
        };
        assert_eq!(
            err.to_string(),
            "Feature 0 in 't': field 'n' value 'abc' is not a valid Integer"
        );
    }
}
