//! Schema construction and validation.
//!
//! [`SchemaDescriptor`] is the caller-facing bundle of raw inputs;
//! [`ArraySchema::from_descriptor`] validates it and produces the immutable
//! schema in one step. Validation runs in dependency order: attribute and
//! dimension names first, then per-attribute settings, then types (which fix
//! the coordinate width), then tiling and orders, then the domain blobs that
//! the coordinate width sizes.

use std::collections::HashSet;

use compact_str::{format_compact, CompactString};
use smallvec::SmallVec;

use crate::consts;
use crate::coords::Domain;
use crate::dtype::DataType;
use crate::schema::error::ValidationError;
use crate::schema::{ArraySchema, Compression, Layout, ValNum};

/// Raw description of an array schema, as provided by the layer above.
///
/// Strings are tokens: types are `"int32"`, `"float64:3"`, `"char:var"`;
/// orders are `"row-major"`, `"column-major"`, `"hilbert"`; compressors are
/// `"NONE"`, `"GZIP"`, … . The domain and tile extents are little-endian
/// blobs in the declared coordinate type, `[lo_0, hi_0, lo_1, hi_1, ..]` and
/// `[extent_0, extent_1, ..]` respectively.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub attributes: Vec<String>,
    pub dimensions: Vec<String>,
    /// One token per attribute, plus a trailing coordinates token.
    pub types: Vec<String>,
    /// One token per attribute plus one for the coordinates; absent means
    /// no compression anywhere.
    pub compression: Option<Vec<String>>,
    pub domain: Vec<u8>,
    pub tile_extents: Option<Vec<u8>>,
    /// Absent means row-major.
    pub cell_order: Option<String>,
    /// Absent means row-major.
    pub tile_order: Option<String>,
    /// Non-positive means the default.
    pub capacity: i64,
    /// Non-positive means the default.
    pub consolidation_step: i64,
    pub dense: bool,
}

impl ArraySchema {
    /// Validate `desc` and construct the schema, computing every derived
    /// field.
    pub fn from_descriptor(desc: &SchemaDescriptor) -> Result<Self, ValidationError> {
        let name = canonical_name(&desc.name)?;

        let attributes = desc.attributes.clone();
        validate_attribute_names(&attributes)?;
        let attribute_num = attributes.len();

        let capacity = if desc.capacity > 0 {
            desc.capacity as u64
        } else {
            consts::DEFAULT_CAPACITY
        };

        let mut dimensions: SmallVec<[CompactString; 4]> = desc
            .dimensions
            .iter()
            .map(|name| CompactString::from(name.as_str()))
            .collect();
        validate_dimension_names(&dimensions, &attributes)?;

        let compression = parse_compression(desc.compression.as_deref(), attribute_num)?;

        let consolidation_step = if desc.consolidation_step > 0 {
            desc.consolidation_step as u32
        } else {
            consts::DEFAULT_CONSOLIDATION_STEP
        };

        let dense = desc.dense;

        if desc.types.len() != attribute_num + 1 {
            return Err(ValidationError::FieldCount {
                field: "type token",
                expected: attribute_num + 1,
                actual: desc.types.len(),
            });
        }
        let mut types = Vec::with_capacity(attribute_num);
        let mut val_num = Vec::with_capacity(attribute_num);
        for token in &desc.types[..attribute_num] {
            let (dtype, vn) = parse_attribute_type(token)?;
            types.push(dtype);
            val_num.push(vn);
        }

        let coords_token = &desc.types[attribute_num];
        let (coord_type, key_value) = if coords_token == "char:var" {
            // Key-value mode: the single user dimension becomes four 32-bit
            // hash dimensions.
            if dimensions.len() != 1 {
                return Err(ValidationError::KeyValueDimensions);
            }
            let base = dimensions[0].clone();
            dimensions = (1..=4).map(|i| format_compact!("{base}_{i}")).collect();
            validate_dimension_names(&dimensions, &attributes)?;
            (DataType::Int32, true)
        } else {
            let coord_type = DataType::from_token(coords_token)
                .filter(|dtype| dtype.is_valid_coord())
                .ok_or_else(|| ValidationError::UnknownCoordType(coords_token.clone()))?;
            if dense && !coord_type.is_valid_dense_coord() {
                return Err(ValidationError::DenseFloatCoords);
            }
            (coord_type, false)
        };

        if dense && desc.tile_extents.is_none() {
            return Err(ValidationError::MissingTileExtents);
        }

        let cell_order = parse_order(desc.cell_order.as_deref(), OrderKind::Cell)?;
        let tile_order = parse_order(desc.tile_order.as_deref(), OrderKind::Tile)?;
        if (cell_order == Layout::Hilbert || tile_order == Layout::Hilbert)
            && desc.tile_extents.is_some()
        {
            return Err(ValidationError::HilbertWithExtents);
        }

        let domain = Domain::decode(
            coord_type,
            dimensions.len(),
            &desc.domain,
            desc.tile_extents.as_deref(),
        )?;

        ArraySchema::assemble(
            name,
            dense,
            key_value,
            dimensions,
            attributes,
            types,
            coord_type,
            val_num,
            compression,
            tile_order,
            cell_order,
            capacity,
            consolidation_step,
            domain,
        )
    }
}

/// Lexically canonicalize the array name: collapse slash runs, resolve `.`
/// and `..`, trim any trailing slash.
pub(crate) fn canonical_name(raw: &str) -> Result<String, ValidationError> {
    let absolute = raw.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut name = segments.join("/");
    if absolute {
        name.insert(0, '/');
    }
    if name.is_empty() || name == "/" {
        return Err(ValidationError::EmptyName);
    }
    Ok(name)
}

pub(crate) fn validate_attribute_names(attributes: &[String]) -> Result<(), ValidationError> {
    if attributes.is_empty() {
        return Err(ValidationError::EmptyAttributes);
    }
    let mut seen = HashSet::new();
    for name in attributes {
        if name == consts::COORDS_NAME {
            return Err(ValidationError::ReservedName(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::DuplicateAttribute(name.clone()));
        }
    }
    Ok(())
}

pub(crate) fn validate_dimension_names(
    dimensions: &[CompactString],
    attributes: &[String],
) -> Result<(), ValidationError> {
    if dimensions.is_empty() {
        return Err(ValidationError::EmptyDimensions);
    }
    let mut seen = HashSet::new();
    for name in dimensions {
        if name == consts::COORDS_NAME {
            return Err(ValidationError::ReservedName(name.to_string()));
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::DuplicateDimension(name.to_string()));
        }
        if attributes.iter().any(|attr| attr.as_str() == name.as_str()) {
            return Err(ValidationError::NameCollision(name.to_string()));
        }
    }
    Ok(())
}

/// Parse an attribute type token: `base`, `base:N` or `base:var`.
fn parse_attribute_type(token: &str) -> Result<(DataType, ValNum), ValidationError> {
    let mut parts = token.split(':');
    let base = parts.next().unwrap_or("");
    let dtype = DataType::from_token(base)
        .ok_or_else(|| ValidationError::UnknownAttributeType(token.to_string()))?;

    let val_num = match parts.next() {
        None => ValNum::Fixed(1),
        Some("var") => ValNum::Var,
        Some(count) => {
            let count: u32 = count
                .parse()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| ValidationError::InvalidValNum(token.to_string()))?;
            ValNum::Fixed(count)
        }
    };

    if parts.next().is_some() {
        return Err(ValidationError::RedundantTypeSuffix(token.to_string()));
    }
    Ok((dtype, val_num))
}

enum OrderKind {
    Cell,
    Tile,
}

fn parse_order(token: Option<&str>, kind: OrderKind) -> Result<Layout, ValidationError> {
    match token {
        None => Ok(Layout::RowMajor),
        Some(token) => Layout::from_token(token).ok_or_else(|| match kind {
            OrderKind::Cell => ValidationError::UnknownCellOrder(token.to_string()),
            OrderKind::Tile => ValidationError::UnknownTileOrder(token.to_string()),
        }),
    }
}

fn parse_compression(
    tokens: Option<&[String]>,
    attribute_num: usize,
) -> Result<Vec<Compression>, ValidationError> {
    match tokens {
        None => Ok(vec![Compression::None; attribute_num + 1]),
        Some(tokens) => {
            if tokens.len() != attribute_num + 1 {
                return Err(ValidationError::FieldCount {
                    field: "compression",
                    expected: attribute_num + 1,
                    actual: tokens.len(),
                });
            }
            tokens
                .iter()
                .map(|token| {
                    Compression::from_token(token)
                        .ok_or_else(|| ValidationError::UnknownCompression(token.clone()))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::encode_blob;

    fn dense_2d() -> SchemaDescriptor {
        SchemaDescriptor {
            name: "A".to_string(),
            attributes: vec!["v".to_string()],
            dimensions: vec!["x".to_string(), "y".to_string()],
            types: vec!["int64".to_string(), "int64".to_string()],
            compression: None,
            domain: encode_blob(&[0i64, 9, 0, 9]),
            tile_extents: Some(encode_blob(&[5i64, 5])),
            cell_order: Some("row-major".to_string()),
            tile_order: Some("row-major".to_string()),
            capacity: 0,
            consolidation_step: 0,
            dense: true,
        }
    }

    #[test]
    fn dense_2d_builds_with_defaults() {
        let schema = ArraySchema::from_descriptor(&dense_2d()).unwrap();
        assert_eq!(schema.name(), "A");
        assert!(schema.dense());
        assert!(!schema.key_value());
        assert_eq!(schema.capacity(), crate::consts::DEFAULT_CAPACITY);
        assert_eq!(
            schema.consolidation_step(),
            crate::consts::DEFAULT_CONSOLIDATION_STEP
        );
        assert_eq!(schema.coords_size(), 16);
        assert_eq!(schema.cell_size(0), Some(8));
        assert_eq!(schema.cell_size(1), Some(16));
        assert_eq!(schema.cell_num_per_tile(), Some(25));
        assert_eq!(schema.tile_num(), Some(4));
        assert_eq!(schema.tile_size(0), Some(200));
        assert_eq!(schema.tile_size(1), Some(400));
        assert_eq!(schema.compression(0), Compression::None);
        assert_eq!(schema.compression(1), Compression::None);
    }

    #[test]
    fn name_is_canonicalized() {
        let mut desc = dense_2d();
        desc.name = "arrays//dense/./A/".to_string();
        let schema = ArraySchema::from_descriptor(&desc).unwrap();
        assert_eq!(schema.name(), "arrays/dense/A");

        desc.name = "/data/../".to_string();
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn rejects_empty_attribute_list() {
        let mut desc = dense_2d();
        desc.attributes.clear();
        desc.types = vec!["int64".to_string()];
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::EmptyAttributes);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut desc = dense_2d();
        desc.attributes = vec!["v".to_string(), "v".to_string()];
        desc.types = vec![
            "int64".to_string(),
            "int64".to_string(),
            "int64".to_string(),
        ];
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateAttribute("v".to_string()));

        let mut desc = dense_2d();
        desc.dimensions = vec!["x".to_string(), "x".to_string()];
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateDimension("x".to_string()));
    }

    #[test]
    fn rejects_attribute_dimension_collision() {
        let mut desc = dense_2d();
        desc.dimensions = vec!["x".to_string(), "v".to_string()];
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::NameCollision("v".to_string()));
    }

    #[test]
    fn rejects_reserved_coords_name() {
        let mut desc = dense_2d();
        desc.attributes = vec![crate::consts::COORDS_NAME.to_string()];
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert!(matches!(err, ValidationError::ReservedName(_)));
    }

    #[test]
    fn rejects_dense_float_coordinates() {
        let mut desc = dense_2d();
        desc.types[1] = "float64".to_string();
        desc.domain = encode_blob(&[0.0f64, 9.0, 0.0, 9.0]);
        desc.tile_extents = Some(encode_blob(&[5.0f64, 5.0]));
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::DenseFloatCoords);
    }

    #[test]
    fn rejects_dense_without_extents() {
        let mut desc = dense_2d();
        desc.tile_extents = None;
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::MissingTileExtents);
    }

    #[test]
    fn rejects_hilbert_order_with_extents() {
        let mut desc = dense_2d();
        desc.dense = false;
        desc.cell_order = Some("hilbert".to_string());
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::HilbertWithExtents);

        let mut desc = dense_2d();
        desc.dense = false;
        desc.tile_order = Some("hilbert".to_string());
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::HilbertWithExtents);
    }

    #[test]
    fn rejects_inverted_domain() {
        let mut desc = dense_2d();
        desc.domain = encode_blob(&[5i64, 0, 0, 9]);
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::DomainInverted { dim: 0 });
    }

    #[test]
    fn rejects_unknown_tokens() {
        let mut desc = dense_2d();
        desc.compression = Some(vec!["SNAPPY".to_string(), "NONE".to_string()]);
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::UnknownCompression("SNAPPY".to_string()));

        let mut desc = dense_2d();
        desc.cell_order = Some("diagonal".to_string());
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::UnknownCellOrder("diagonal".to_string()));

        let mut desc = dense_2d();
        desc.types[0] = "uint32".to_string();
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownAttributeType("uint32".to_string())
        );

        let mut desc = dense_2d();
        desc.types[1] = "int64:2".to_string();
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::UnknownCoordType("int64:2".to_string()));
    }

    #[test]
    fn type_token_suffixes() {
        assert_eq!(
            parse_attribute_type("int32").unwrap(),
            (DataType::Int32, ValNum::Fixed(1))
        );
        assert_eq!(
            parse_attribute_type("float64:3").unwrap(),
            (DataType::Float64, ValNum::Fixed(3))
        );
        assert_eq!(
            parse_attribute_type("char:var").unwrap(),
            (DataType::Char, ValNum::Var)
        );
        assert_eq!(
            parse_attribute_type("int32:0").unwrap_err(),
            ValidationError::InvalidValNum("int32:0".to_string())
        );
        assert_eq!(
            parse_attribute_type("int32:-2").unwrap_err(),
            ValidationError::InvalidValNum("int32:-2".to_string())
        );
        assert_eq!(
            parse_attribute_type("int32:2:4").unwrap_err(),
            ValidationError::RedundantTypeSuffix("int32:2:4".to_string())
        );
    }

    #[test]
    fn var_attributes_are_counted() {
        let mut desc = dense_2d();
        desc.attributes = vec!["v".to_string(), "w".to_string()];
        desc.types = vec![
            "char:var".to_string(),
            "int32:2".to_string(),
            "int64".to_string(),
        ];
        let schema = ArraySchema::from_descriptor(&desc).unwrap();
        assert_eq!(schema.var_attribute_num(), 1);
        assert!(schema.var_size(0));
        assert_eq!(schema.cell_size(0), None);
        assert_eq!(schema.cell_size(1), Some(8));
        assert_eq!(schema.val_num(0), ValNum::Var);
        assert_eq!(schema.val_num(1), ValNum::Fixed(2));
    }

    #[test]
    fn key_value_mode_synthesizes_dimensions() {
        let desc = SchemaDescriptor {
            name: "kv".to_string(),
            attributes: vec!["value".to_string()],
            dimensions: vec!["key".to_string()],
            types: vec!["char:var".to_string(), "char:var".to_string()],
            compression: None,
            domain: encode_blob(&[0i32, i32::MAX, 0, i32::MAX, 0, i32::MAX, 0, i32::MAX]),
            tile_extents: None,
            cell_order: None,
            tile_order: None,
            capacity: 1000,
            consolidation_step: 1,
            dense: false,
        };
        let schema = ArraySchema::from_descriptor(&desc).unwrap();
        assert!(schema.key_value());
        assert_eq!(schema.dim_num(), 4);
        assert_eq!(
            schema.dimensions(),
            &["key_1", "key_2", "key_3", "key_4"][..]
        );
        assert_eq!(schema.coord_type(), DataType::Int32);
        assert_eq!(schema.coords_size(), 16);

        let mut desc = desc;
        desc.dimensions = vec!["a".to_string(), "b".to_string()];
        desc.domain = encode_blob(&[0i32; 16]);
        let err = ArraySchema::from_descriptor(&desc).unwrap_err();
        assert_eq!(err, ValidationError::KeyValueDimensions);
    }

    #[test]
    fn sparse_irregular_uses_capacity() {
        let mut desc = dense_2d();
        desc.dense = false;
        desc.tile_extents = None;
        desc.capacity = 42;
        let schema = ArraySchema::from_descriptor(&desc).unwrap();
        assert_eq!(schema.cell_num_per_tile(), Some(42));
        assert_eq!(schema.tile_num(), None);
        // One 8-byte attribute cell and one 16-byte coordinates tuple.
        assert_eq!(schema.tile_size(0), Some(42 * 8));
        assert_eq!(schema.tile_size(1), Some(42 * 16));
    }

    #[test]
    fn sparse_regular_has_undefined_cell_count() {
        let mut desc = dense_2d();
        desc.dense = false;
        let schema = ArraySchema::from_descriptor(&desc).unwrap();
        assert_eq!(schema.cell_num_per_tile(), None);
        assert_eq!(schema.tile_size(0), None);
        assert_eq!(schema.tile_num(), Some(4));
    }

    #[test]
    fn attribute_lookup() {
        let schema = ArraySchema::from_descriptor(&dense_2d()).unwrap();
        assert_eq!(schema.attribute_id("v").unwrap(), 0);
        assert_eq!(schema.attribute_id(crate::consts::COORDS_NAME).unwrap(), 1);
        assert_eq!(
            schema.attribute_id("missing").unwrap_err(),
            crate::schema::error::AttributeNotFound("missing".to_string())
        );
        assert_eq!(
            schema
                .get_attribute_ids(&["v", crate::consts::COORDS_NAME])
                .unwrap(),
            vec![0, 1]
        );
        assert!(schema.get_attribute_ids(&["v", "missing"]).is_err());
        assert_eq!(schema.attribute(1), crate::consts::COORDS_NAME);
        assert_eq!(schema.dtype(1), DataType::Int64);
    }

    #[test]
    fn display_dump_mentions_the_essentials() {
        let schema = ArraySchema::from_descriptor(&dense_2d()).unwrap();
        let dump = schema.to_string();
        assert!(dump.contains("Array name:"));
        assert!(dump.contains("x: [0,9]"));
        assert!(dump.contains("v: int64[1]"));
        assert!(dump.contains("regular"));
        assert!(dump.contains("row-major"));
    }
}
