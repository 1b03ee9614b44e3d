//! Array schema kernel for a tiled multidimensional array storage engine.
//!
//! The schema describes the logical shape of one array: its dimensions and
//! attributes, the coordinate domain, the tiling (regular extents or a
//! sparse cell capacity), the tile and cell traversal orders, and the
//! per-cell byte layout derived from them. On top of the schema sit the
//! positional primitives the engine layers use to translate between
//! coordinates, cell positions, tile coordinates and Hilbert ids, plus a
//! self-describing binary form for storing the schema on disk.
//!
//! A schema is built once from a [`SchemaDescriptor`] and immutable
//! afterwards; all read operations are plain `&self` computations.

pub mod consts;
pub mod coords;
pub mod dtype;
pub mod hilbert;
pub mod schema;

pub use crate::coords::{CoordRange, CoordValue, Domain};
pub use crate::dtype::DataType;
pub use crate::hilbert::HilbertCurve;
pub use crate::schema::builder::SchemaDescriptor;
pub use crate::schema::error::{AttributeNotFound, FormatError, TypeMismatch, ValidationError};
pub use crate::schema::geometry::Overlap;
pub use crate::schema::{ArraySchema, Compression, Layout, ValNum};
