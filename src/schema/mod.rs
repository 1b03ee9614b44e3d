//! Array schema: the logical shape of a tiled multidimensional array.
//!
//! An [`ArraySchema`] is assembled by [`ArraySchema::from_descriptor`],
//! validated, and immutable from then on. Every read operation takes
//! `&self` and touches no interior state, so a schema can be shared across
//! any number of reader threads without synchronization.

pub mod builder;
pub mod codec;
pub mod error;
pub mod geometry;

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::consts;
use crate::coords::{CoordValue, Domain, DomainData};
use crate::dtype::DataType;
use crate::hilbert::HilbertCurve;
use crate::match_each_domain;
use crate::schema::error::{AttributeNotFound, TypeMismatch, ValidationError};

/// Traversal order of tiles in the array, and of cells within a tile.
///
/// Wire codes are stable: `RowMajor = 0`, `ColMajor = 1`, `Hilbert = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Layout {
    RowMajor,
    ColMajor,
    Hilbert,
}

impl Layout {
    pub const fn to_code(self) -> u8 {
        match self {
            Layout::RowMajor => 0,
            Layout::ColMajor => 1,
            Layout::Hilbert => 2,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Layout::RowMajor),
            1 => Some(Layout::ColMajor),
            2 => Some(Layout::Hilbert),
            _ => None,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "row-major" => Some(Layout::RowMajor),
            "column-major" => Some(Layout::ColMajor),
            "hilbert" => Some(Layout::Hilbert),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Layout::RowMajor => "row-major",
            Layout::ColMajor => "column-major",
            Layout::Hilbert => "hilbert",
        };
        f.write_str(token)
    }
}

/// Compressor applied to one attribute (or to the coordinates).
///
/// The schema only records the compressor identity; running codecs is an
/// external concern. `None` and `Gzip` are written; the remaining codes are
/// reserved and accepted on read.
///
/// Wire codes are stable: `None = 0`, `Gzip = 1`, `Zstd = 2`, `Lz4 = 3`,
/// `Rle = 4`, `Bzip2 = 5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
    Lz4,
    Rle,
    Bzip2,
}

impl Compression {
    pub const fn to_code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Zstd => 2,
            Compression::Lz4 => 3,
            Compression::Rle => 4,
            Compression::Bzip2 => 5,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Compression::None),
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zstd),
            3 => Some(Compression::Lz4),
            4 => Some(Compression::Rle),
            5 => Some(Compression::Bzip2),
            _ => None,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "NONE" => Some(Compression::None),
            "GZIP" => Some(Compression::Gzip),
            "ZSTD" => Some(Compression::Zstd),
            "LZ4" => Some(Compression::Lz4),
            "RLE" => Some(Compression::Rle),
            "BZIP2" => Some(Compression::Bzip2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Compression::None => "NONE",
            Compression::Gzip => "GZIP",
            Compression::Zstd => "ZSTD",
            Compression::Lz4 => "LZ4",
            Compression::Rle => "RLE",
            Compression::Bzip2 => "BZIP2",
        };
        f.write_str(token)
    }
}

/// Number of values stored per cell of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValNum {
    Fixed(u32),
    Var,
}

impl ValNum {
    pub const fn is_var(&self) -> bool {
        matches!(self, ValNum::Var)
    }

    pub const fn to_wire(self) -> i32 {
        match self {
            ValNum::Fixed(n) => n as i32,
            ValNum::Var => consts::VAR_NUM,
        }
    }

    pub const fn from_wire(raw: i32) -> Option<Self> {
        if raw == consts::VAR_NUM {
            Some(ValNum::Var)
        } else if raw > 0 {
            Some(ValNum::Fixed(raw as u32))
        } else {
            None
        }
    }
}

/// The schema of one array: dimensions, attributes, types, tiling, orders
/// and the per-cell layout derived from them.
///
/// The coordinates behave as a synthetic trailing attribute in every indexed
/// accessor: ids `0..attribute_num` address the user attributes and id
/// `attribute_num` addresses the coordinates. The reserved name
/// [`consts::COORDS_NAME`] resolves to that id.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub(crate) name: String,
    pub(crate) dense: bool,
    pub(crate) key_value: bool,
    pub(crate) dimensions: SmallVec<[CompactString; 4]>,
    pub(crate) attributes: Vec<String>,
    pub(crate) types: Vec<DataType>,
    pub(crate) coord_type: DataType,
    pub(crate) val_num: Vec<ValNum>,
    pub(crate) compression: Vec<Compression>,
    pub(crate) tile_order: Layout,
    pub(crate) cell_order: Layout,
    pub(crate) capacity: u64,
    pub(crate) consolidation_step: u32,
    pub(crate) domain: Domain,

    // Derived at construction.
    pub(crate) type_sizes: Vec<usize>,
    pub(crate) cell_sizes: Vec<Option<usize>>,
    pub(crate) var_attribute_num: usize,
    pub(crate) cell_num_per_tile: Option<u64>,
    pub(crate) tile_sizes: Option<Vec<u64>>,
    pub(crate) tile_num: Option<u64>,
    pub(crate) hilbert: Option<HilbertCurve>,
}

impl ArraySchema {
    /// Canonical array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dense(&self) -> bool {
        self.dense
    }

    pub fn key_value(&self) -> bool {
        self.key_value
    }

    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension(&self, i: usize) -> &str {
        &self.dimensions[i]
    }

    pub fn dimensions(&self) -> &[CompactString] {
        &self.dimensions
    }

    /// Number of user attributes; the coordinates occupy id `attribute_num`.
    pub fn attribute_num(&self) -> usize {
        self.attributes.len()
    }

    /// Name of attribute `id`; id `attribute_num` is the coordinates.
    pub fn attribute(&self, id: usize) -> &str {
        if id == self.attribute_num() {
            consts::COORDS_NAME
        } else {
            &self.attributes[id]
        }
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Dense id of `name`. The reserved name [`consts::COORDS_NAME`] maps to
    /// `attribute_num`.
    pub fn attribute_id(&self, name: &str) -> Result<usize, AttributeNotFound> {
        if name == consts::COORDS_NAME {
            return Ok(self.attribute_num());
        }
        self.attributes
            .iter()
            .position(|attr| attr == name)
            .ok_or_else(|| AttributeNotFound(name.to_string()))
    }

    /// Resolve every name or fail on the first miss.
    pub fn get_attribute_ids(&self, names: &[&str]) -> Result<Vec<usize>, AttributeNotFound> {
        names.iter().map(|name| self.attribute_id(name)).collect()
    }

    /// Scalar type of attribute `id`; id `attribute_num` is the coordinates.
    pub fn dtype(&self, id: usize) -> DataType {
        if id == self.attribute_num() {
            self.coord_type
        } else {
            self.types[id]
        }
    }

    pub fn coord_type(&self) -> DataType {
        self.coord_type
    }

    pub fn type_size(&self, id: usize) -> usize {
        self.type_sizes[id]
    }

    /// Fixed byte width of one cell of attribute `id`, or `None` for a
    /// variable-sized attribute. The coordinates entry is always fixed.
    pub fn cell_size(&self, id: usize) -> Option<usize> {
        self.cell_sizes[id]
    }

    /// Byte width of one coordinates tuple: `dim_num * coord type size`.
    pub fn coords_size(&self) -> usize {
        self.cell_sizes[self.attribute_num()].expect("coordinates are fixed-size")
    }

    pub fn val_num(&self, id: usize) -> ValNum {
        self.val_num[id]
    }

    pub fn var_size(&self, id: usize) -> bool {
        self.cell_sizes[id].is_none()
    }

    pub fn var_attribute_num(&self) -> usize {
        self.var_attribute_num
    }

    pub fn compression(&self, id: usize) -> Compression {
        self.compression[id]
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn consolidation_step(&self) -> u32 {
        self.consolidation_step
    }

    pub fn cell_order(&self) -> Layout {
        self.cell_order
    }

    pub fn tile_order(&self) -> Layout {
        self.tile_order
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn has_tile_extents(&self) -> bool {
        self.domain.has_tile_extents()
    }

    /// Cells per tile: the extent product for dense arrays, the capacity for
    /// sparse arrays with irregular tiles, undefined for sparse arrays with
    /// regular tiles.
    pub fn cell_num_per_tile(&self) -> Option<u64> {
        self.cell_num_per_tile
    }

    /// On-disk tile size of attribute `id` in bytes; variable-sized
    /// attributes count their per-cell offset slot. `None` whenever
    /// [`Self::cell_num_per_tile`] is undefined.
    pub fn tile_size(&self, id: usize) -> Option<u64> {
        self.tile_sizes.as_ref().map(|sizes| sizes[id])
    }

    /// Total number of tiles in the domain; regular tiling with integral
    /// coordinates only.
    pub fn tile_num(&self) -> Option<u64> {
        self.tile_num
    }

    pub(crate) fn hilbert_curve(&self) -> Option<&HilbertCurve> {
        self.hilbert.as_ref()
    }

    /// Bits per dimension of the Hilbert curve; present iff the cell order
    /// is [`Layout::Hilbert`].
    pub fn hilbert_bits(&self) -> Option<u32> {
        self.hilbert.as_ref().map(|curve| curve.bits())
    }

    /// Typed view of the domain, or the [`TypeMismatch`] the caller asked for.
    pub(crate) fn domain_data<T: CoordValue>(&self) -> Result<&DomainData<T>, TypeMismatch> {
        T::domain_data(&self.domain).ok_or(TypeMismatch {
            schema: self.coord_type,
            requested: T::DTYPE,
        })
    }

    /// Shared invariant checks and derived-field computation for every
    /// construction path (builder and codec).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        name: String,
        dense: bool,
        key_value: bool,
        dimensions: SmallVec<[CompactString; 4]>,
        attributes: Vec<String>,
        types: Vec<DataType>,
        coord_type: DataType,
        val_num: Vec<ValNum>,
        compression: Vec<Compression>,
        tile_order: Layout,
        cell_order: Layout,
        capacity: u64,
        consolidation_step: u32,
        domain: Domain,
    ) -> Result<Self, ValidationError> {
        let attribute_num = attributes.len();
        let dim_num = dimensions.len();

        if types.len() != attribute_num {
            return Err(ValidationError::FieldCount {
                field: "type",
                expected: attribute_num,
                actual: types.len(),
            });
        }
        if val_num.len() != attribute_num {
            return Err(ValidationError::FieldCount {
                field: "values-per-cell",
                expected: attribute_num,
                actual: val_num.len(),
            });
        }
        if compression.len() != attribute_num + 1 {
            return Err(ValidationError::FieldCount {
                field: "compression",
                expected: attribute_num + 1,
                actual: compression.len(),
            });
        }
        debug_assert_eq!(domain.dtype(), coord_type);
        debug_assert_eq!(domain.dim_num(), dim_num);

        if dense && !coord_type.is_valid_dense_coord() {
            return Err(ValidationError::DenseFloatCoords);
        }
        if dense && !domain.has_tile_extents() {
            return Err(ValidationError::MissingTileExtents);
        }
        if (cell_order == Layout::Hilbert || tile_order == Layout::Hilbert)
            && domain.has_tile_extents()
        {
            return Err(ValidationError::HilbertWithExtents);
        }

        let mut type_sizes: Vec<usize> = types.iter().map(|t| t.size()).collect();
        type_sizes.push(coord_type.size());

        let mut cell_sizes: Vec<Option<usize>> = types
            .iter()
            .zip(val_num.iter())
            .map(|(dtype, vn)| match vn {
                ValNum::Fixed(n) => Some(*n as usize * dtype.size()),
                ValNum::Var => None,
            })
            .collect();
        cell_sizes.push(Some(dim_num * coord_type.size()));

        let var_attribute_num = val_num.iter().filter(|vn| vn.is_var()).count();

        let cell_num_per_tile = if domain.has_tile_extents() {
            if dense {
                Some(domain.tile_cell_num()?)
            } else {
                None
            }
        } else {
            Some(capacity)
        };

        let tile_sizes = match cell_num_per_tile {
            None => None,
            Some(cell_num) => {
                let mut sizes = Vec::with_capacity(attribute_num + 1);
                for cell_size in &cell_sizes {
                    let per_cell = match cell_size {
                        None => consts::CELL_VAR_OFFSET_SIZE,
                        Some(size) => *size as u64,
                    };
                    let size = cell_num
                        .checked_mul(per_cell)
                        .ok_or(ValidationError::TileSizeOverflow)?;
                    sizes.push(size);
                }
                Some(sizes)
            }
        };

        let tile_num = domain.tile_num()?;

        let hilbert = if cell_order == Layout::Hilbert {
            let bits = domain.hilbert_bits();
            if bits > 32 {
                return Err(ValidationError::HilbertDomainTooWide);
            }
            Some(HilbertCurve::new(bits, dim_num))
        } else {
            None
        };

        Ok(Self {
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
            type_sizes,
            cell_sizes,
            var_attribute_num,
            cell_num_per_tile,
            tile_sizes,
            tile_num,
            hilbert,
        })
    }
}

impl std::fmt::Display for ArraySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Array name:\n\t{}", self.name)?;

        writeln!(f, "Dimensions:")?;
        match_each_domain!(&self.domain, data => {
            for (name, range) in self.dimensions.iter().zip(data.bounds()) {
                writeln!(f, "\t{}: [{},{}]", name, range.lo, range.hi)?;
            }
        });

        writeln!(f, "Attributes:")?;
        for (i, name) in self.attributes.iter().enumerate() {
            match self.val_num[i] {
                ValNum::Fixed(n) => writeln!(f, "\t{}: {}[{}]", name, self.types[i], n)?,
                ValNum::Var => writeln!(f, "\t{}: {}[var]", name, self.types[i])?,
            }
        }
        if self.key_value {
            writeln!(f, "\tCoordinates: char:var")?;
        } else {
            writeln!(f, "\tCoordinates: {}", self.coord_type)?;
        }

        writeln!(f, "Cell sizes (in bytes):")?;
        for id in 0..=self.attribute_num() {
            match self.cell_sizes[id] {
                Some(size) => writeln!(f, "\t{}: {}", self.attribute(id), size)?,
                None => writeln!(f, "\t{}: var", self.attribute(id))?,
            }
        }

        writeln!(f, "Dense:\n\t{}", self.dense)?;
        writeln!(f, "Key-value:\n\t{}", self.key_value)?;
        writeln!(
            f,
            "Tile types:\n\t{}",
            if self.has_tile_extents() {
                "regular"
            } else {
                "irregular"
            }
        )?;
        if self.has_tile_extents() {
            writeln!(f, "Tile order:\n\t{}", self.tile_order)?;
        } else {
            writeln!(f, "Tile order:\n\t-")?;
        }
        writeln!(f, "Cell order:\n\t{}", self.cell_order)?;
        if self.has_tile_extents() {
            writeln!(f, "Capacity:\n\t-")?;
            writeln!(f, "Tile extents:")?;
            match_each_domain!(&self.domain, data => {
                let extents = data.tile_extents().expect("regular tiling");
                for (name, extent) in self.dimensions.iter().zip(extents) {
                    writeln!(f, "\t{}: {}", name, extent)?;
                }
            });
        } else {
            writeln!(f, "Capacity:\n\t{}", self.capacity)?;
            writeln!(f, "Tile extents:\n\t-")?;
        }
        writeln!(f, "Consolidation step:\n\t{}", self.consolidation_step)?;

        writeln!(f, "Compression:")?;
        for id in 0..=self.attribute_num() {
            writeln!(f, "\t{}: {}", self.attribute(id), self.compression[id])?;
        }
        Ok(())
    }
}
