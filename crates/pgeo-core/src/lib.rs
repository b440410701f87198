//! `pgeo-core` is the read-only engine for personal geodatabases: Access-style
//! containers whose tables carry ESRI shape blobs described by a geometry
//! registry table.
//!
//! This crate includes:
//! - **Dataset**: opens a container through a [`Connector`] and owns its layers
//!   and query result sets.
//! - **Schema Catalog**: reads the geometry registry and describes each table.
//! - **Layer**: pull-based feature reading with spatial and attribute filters.
//! - **Type Mapper**: engine column types to typed field values.
//!
//! Geometry decoding lives in `pgeo-shape`; the engine seam lives in
//! `pgeo-core-common`.

pub mod catalog;
pub mod dataset;
pub mod error;
pub mod feature;
pub mod filter;
pub mod layer;
pub mod mapper;
pub mod options;
pub mod query;
pub mod types;

pub use catalog::{Catalog, GeometryField, LayerSchema};
pub use dataset::Dataset;
pub use error::{
    FeatureError, FilterParseError, HandleError, OpenError, PGeoError, Result, SchemaError,
};
pub use feature::Feature;
pub use filter::{AttributeFilter, FilterState};
pub use layer::{Features, Layer, LayerOrigin};
pub use options::OpenOptions;
pub use pgeo_core_common::{Connector, SourceError, SqlType, TabularSource};
pub use pgeo_shape::{Coord, Dimension, Envelope, Geometry, GeometryKind, GeometryType};
pub use query::{RESULT_LAYER_NAME, ResultSetId};
pub use types::{DATETIME_FORMAT, FieldDefn, FieldType, FieldValue, parse_datetime};
