//! In-memory tabular engine and JSON container format.
//!
//! [`MemorySource`] implements [`pgeo_core_common::TabularSource`] over
//! tables held in memory, including a small `SELECT` dialect for ad-hoc
//! queries. [`JsonContainerConnector`] loads such a source from a
//! `pgeo-json` container file, which is how containers are exchanged when no
//! native database engine is available.

mod container;
mod source;
mod sql;

pub use container::{CONTAINER_FORMAT, CONTAINER_VERSION, JsonContainerConnector};
pub use source::{GEOMETRY_REGISTRY, GeometryColumn, MemorySource, MemoryTable};
