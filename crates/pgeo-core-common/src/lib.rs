//! Common types and traits shared across `pgeo` crates.
//!
//! This crate provides the seams that are shared between `pgeo-core` and the
//! tabular engine implementations, preventing circular dependencies:
//!
//! - [`source`]: the narrow row/column interface every backing engine presents.
//! - [`expr`]: the attribute predicate language used by layer filters and by
//!   engines that evaluate `WHERE` clauses.

pub mod expr;
pub mod source;

// Re-export commonly used types
pub use expr::{ColumnResolver, Expr, ExprError, Literal, Operand};
pub use source::{
    ColumnDescriptor, Connector, QueryResult, RawValue, Row, RowCursor, SourceError,
    SourceResult, SqlType, TabularSource, VecCursor,
};
