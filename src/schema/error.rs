use thiserror::Error;

use crate::dtype::DataType;

/// Errors rejecting a schema description before construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("array name is empty")]
    EmptyName,
    #[error("no attributes given")]
    EmptyAttributes,
    #[error("no dimensions given")]
    EmptyDimensions,
    #[error("duplicate attribute name '{0}'")]
    DuplicateAttribute(String),
    #[error("duplicate dimension name '{0}'")]
    DuplicateDimension(String),
    #[error("'{0}' is both an attribute and a dimension name")]
    NameCollision(String),
    #[error("'{0}' is a reserved name")]
    ReservedName(String),
    #[error("expected {expected} {field} entries, got {actual}")]
    FieldCount {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid attribute type '{0}'")]
    UnknownAttributeType(String),
    #[error("the number of values per cell in '{0}' must be a positive integer")]
    InvalidValNum(String),
    #[error("redundant tokens in type '{0}'")]
    RedundantTypeSuffix(String),
    #[error("invalid coordinates type '{0}'")]
    UnknownCoordType(String),
    #[error("dense arrays may only have int32 or int64 coordinates")]
    DenseFloatCoords,
    #[error("key-value arrays must declare exactly one dimension")]
    KeyValueDimensions,
    #[error("dense arrays must have tile extents")]
    MissingTileExtents,
    #[error("hilbert order does not support tile extents")]
    HilbertWithExtents,
    #[error("hilbert cell order requires domain widths under 2^32")]
    HilbertDomainTooWide,
    #[error("invalid cell order '{0}'")]
    UnknownCellOrder(String),
    #[error("invalid tile order '{0}'")]
    UnknownTileOrder(String),
    #[error("invalid compression type '{0}'")]
    UnknownCompression(String),
    #[error("domain blob is {actual} bytes, expected {expected}")]
    DomainSize { expected: usize, actual: usize },
    #[error("tile extents blob is {actual} bytes, expected {expected}")]
    TileExtentsSize { expected: usize, actual: usize },
    #[error("lower domain bound exceeds upper bound in dimension {dim}")]
    DomainInverted { dim: usize },
    #[error("tile extent in dimension {dim} must be positive")]
    NonPositiveExtent { dim: usize },
    #[error("cell count per tile overflows")]
    CellCountOverflow,
    #[error("tile count overflows")]
    TileCountOverflow,
    #[error("tile size overflows")]
    TileSizeOverflow,
}

/// Errors rejecting a serialized schema buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("schema buffer truncated at offset {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("negative length prefix at offset {offset}")]
    NegativeLength { offset: usize },
    #[error("name field is not valid utf-8")]
    InvalidName,
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("unknown type code {0}")]
    UnknownTypeCode(u8),
    #[error("unknown layout code {0}")]
    UnknownLayoutCode(u8),
    #[error("unknown compression code {0}")]
    UnknownCompressionCode(u8),
    #[error("invalid values-per-cell entry {0}")]
    InvalidValNum(i32),
    #[error("capacity {0} is not positive")]
    InvalidCapacity(i64),
    #[error("consolidation step {0} is not positive")]
    InvalidConsolidationStep(i32),
    #[error("{0} trailing bytes after schema")]
    TrailingBytes(usize),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Lookup of an attribute name that the schema does not define.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("attribute '{0}' does not exist")]
pub struct AttributeNotFound(pub String);

/// A typed geometry operation was invoked with the wrong coordinate type.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("coordinate type mismatch: schema is {schema}, requested {requested}")]
pub struct TypeMismatch {
    pub schema: DataType,
    pub requested: DataType,
}
