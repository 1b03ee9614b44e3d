//! Positional and tiling math on a schema.
//!
//! Every operation is parameterized by the coordinate scalar type `T` and
//! fails with [`TypeMismatch`] when `T` is not the schema's coordinate type.
//! Coordinates are absolute domain values unless an operation says
//! otherwise.
//!
//! Tile counting differs by coordinate type: integral types divide the
//! domain span by the extent (whole tiles only), float types enumerate
//! tiles by index and count a fractional trailing tile.
//! [`ArraySchema::tile_pos`] and [`ArraySchema::tile_num`] therefore apply
//! to integral coordinates; float tile grids are walked with
//! [`ArraySchema::next_tile_coords`] instead.

use smallvec::SmallVec;

use crate::coords::{CoordRange, CoordValue};
use crate::schema::error::TypeMismatch;
use crate::schema::{ArraySchema, Layout};

/// Classification of the intersection produced by the overlap operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Empty intersection.
    None,
    /// The overlap covers the mbr (or the tile) entirely.
    Full,
    /// Proper sub-rectangle.
    Partial,
    /// Proper sub-rectangle whose cells form one contiguous run in the cell
    /// order: the overlap spans the whole mbr (or tile) on every dimension
    /// except the most significant one of the order.
    PartialContig,
}

impl ArraySchema {
    /// Position of a cell inside its tile, with `coords` zero-based within
    /// the tile.
    ///
    /// # Panics
    /// Panics if the schema has no tile extents or the cell order is
    /// hilbert.
    pub fn cell_pos_in_tile<T: CoordValue>(&self, coords: &[T]) -> Result<u64, TypeMismatch> {
        let data = self.domain_data::<T>()?;
        let extents = data
            .tile_extents()
            .expect("cell_pos_in_tile requires tile extents");
        assert_eq!(coords.len(), self.dim_num());

        let strides = match self.cell_order {
            Layout::RowMajor => row_major_strides(extents.iter().map(|e| e.as_index())),
            Layout::ColMajor => col_major_strides(extents.iter().map(|e| e.as_index())),
            Layout::Hilbert => panic!("cell_pos_in_tile is not defined under hilbert cell order"),
        };
        Ok(dot(coords, &strides))
    }

    /// Position of a tile in the tile grid under the tile order, with
    /// `tile_coords` zero-based.
    ///
    /// # Panics
    /// Panics if the schema has no tile extents or the tile order is
    /// hilbert.
    pub fn tile_pos<T: CoordValue>(&self, tile_coords: &[T]) -> Result<u64, TypeMismatch> {
        let data = self.domain_data::<T>()?;
        let extents = data.tile_extents().expect("tile_pos requires tile extents");
        assert_eq!(tile_coords.len(), self.dim_num());

        let counts = data
            .bounds()
            .iter()
            .zip(extents)
            .map(|(range, &extent)| T::tiles_across(range.lo, range.hi, extent).as_index());
        let strides = match self.tile_order {
            Layout::RowMajor => row_major_strides(counts),
            Layout::ColMajor => col_major_strides(counts),
            Layout::Hilbert => panic!("tile_pos is not defined under hilbert tile order"),
        };
        Ok(dot(tile_coords, &strides))
    }

    /// Advance `tile_coords` to the next tile of `domain` under the tile
    /// order. On carry a dimension resets to its lower bound and the next
    /// more significant one is bumped; the caller detects termination by
    /// comparing the most significant dimension against `domain`.
    pub fn next_tile_coords<T: CoordValue>(
        &self,
        domain: &[CoordRange<T>],
        tile_coords: &mut [T],
    ) -> Result<(), TypeMismatch> {
        self.domain_data::<T>()?;
        assert_eq!(domain.len(), self.dim_num());
        assert_eq!(tile_coords.len(), self.dim_num());

        match self.tile_order {
            Layout::RowMajor => {
                let mut i = self.dim_num() - 1;
                tile_coords[i] = tile_coords[i].incr();
                while i > 0 && tile_coords[i] > domain[i].hi {
                    tile_coords[i] = domain[i].lo;
                    i -= 1;
                    tile_coords[i] = tile_coords[i].incr();
                }
            }
            Layout::ColMajor => {
                let mut i = 0;
                tile_coords[i] = tile_coords[i].incr();
                while i < self.dim_num() - 1 && tile_coords[i] > domain[i].hi {
                    tile_coords[i] = domain[i].lo;
                    i += 1;
                    tile_coords[i] = tile_coords[i].incr();
                }
            }
            Layout::Hilbert => panic!("next_tile_coords is not defined under hilbert tile order"),
        }
        Ok(())
    }

    /// Cells in one slab of a tile: the extent of the fastest-varying
    /// dimension of the cell order.
    ///
    /// # Panics
    /// Panics if the schema has no tile extents or the cell order is
    /// hilbert.
    pub fn cell_num_in_tile_slab<T: CoordValue>(&self) -> Result<T, TypeMismatch> {
        let data = self.domain_data::<T>()?;
        let extents = data
            .tile_extents()
            .expect("cell_num_in_tile_slab requires tile extents");
        match self.cell_order {
            Layout::RowMajor => Ok(extents[extents.len() - 1]),
            Layout::ColMajor => Ok(extents[0]),
            Layout::Hilbert => {
                panic!("cell_num_in_tile_slab is not defined under hilbert cell order")
            }
        }
    }

    /// Cells in one slab of `range`: the length of the fastest-varying
    /// dimension of the cell order.
    ///
    /// # Panics
    /// Panics if the cell order is hilbert.
    pub fn cell_num_in_range_slab<T: CoordValue>(
        &self,
        range: &[CoordRange<T>],
    ) -> Result<T, TypeMismatch> {
        self.domain_data::<T>()?;
        assert_eq!(range.len(), self.dim_num());
        match self.cell_order {
            Layout::RowMajor => {
                let last = &range[range.len() - 1];
                Ok(T::span(last.lo, last.hi))
            }
            Layout::ColMajor => Ok(T::span(range[0].lo, range[0].hi)),
            Layout::Hilbert => {
                panic!("cell_num_in_range_slab is not defined under hilbert cell order")
            }
        }
    }

    /// Intersect `range` with `mbr` and classify the relation.
    pub fn mbr_range_overlap<T: CoordValue>(
        &self,
        range: &[CoordRange<T>],
        mbr: &[CoordRange<T>],
    ) -> Result<(SmallVec<[CoordRange<T>; 4]>, Overlap), TypeMismatch> {
        self.domain_data::<T>()?;
        let dim_num = self.dim_num();
        assert_eq!(range.len(), dim_num);
        assert_eq!(mbr.len(), dim_num);

        let overlap_range: SmallVec<[CoordRange<T>; 4]> = mbr
            .iter()
            .zip(range)
            .map(|(m, r)| CoordRange::new(max(m.lo, r.lo), min(m.hi, r.hi)))
            .collect();

        let mut overlap = Overlap::Full;
        for (o, m) in overlap_range.iter().zip(mbr) {
            if o.lo > m.hi || o.hi < m.lo {
                overlap = Overlap::None;
                break;
            }
        }

        if overlap == Overlap::Full {
            for (o, m) in overlap_range.iter().zip(mbr) {
                if o.lo != m.lo || o.hi != m.hi {
                    overlap = Overlap::Partial;
                    break;
                }
            }
        }

        if overlap == Overlap::Partial && self.cell_order != Layout::Hilbert {
            overlap = Overlap::PartialContig;
            for i in contig_checked_dims(self.cell_order, dim_num) {
                let (o, m) = (&overlap_range[i], &mbr[i]);
                if o.lo != m.lo || o.hi != m.hi {
                    overlap = Overlap::Partial;
                    break;
                }
            }
        }

        Ok((overlap_range, overlap))
    }

    /// Intersect `range` with the tile at `tile_coords` and classify the
    /// relation. The overlap is expressed in tile-local zero-based
    /// coordinates, within `[0, extent - 1]` whenever it is non-empty.
    ///
    /// # Panics
    /// Panics if the schema has no tile extents.
    pub fn tile_range_overlap<T: CoordValue>(
        &self,
        range: &[CoordRange<T>],
        tile_coords: &[T],
    ) -> Result<(SmallVec<[CoordRange<T>; 4]>, Overlap), TypeMismatch> {
        let data = self.domain_data::<T>()?;
        let extents = data
            .tile_extents()
            .expect("tile_range_overlap requires tile extents");
        let dim_num = self.dim_num();
        assert_eq!(range.len(), dim_num);
        assert_eq!(tile_coords.len(), dim_num);

        let mut overlap_range: SmallVec<[CoordRange<T>; 4]> = SmallVec::with_capacity(dim_num);
        for i in 0..dim_num {
            let tile_lo = T::tile_low(data.bounds()[i].lo, tile_coords[i], extents[i]);
            let tile_hi = T::tile_high(tile_lo, extents[i]);
            overlap_range.push(CoordRange::new(
                max(tile_lo, range[i].lo).sub(tile_lo),
                min(tile_hi, range[i].hi).sub(tile_lo),
            ));
        }

        let mut overlap = Overlap::Full;
        for (o, &extent) in overlap_range.iter().zip(extents) {
            if o.lo >= extent || o.hi < T::zero() {
                overlap = Overlap::None;
                break;
            }
        }

        if overlap == Overlap::Full {
            for (o, &extent) in overlap_range.iter().zip(extents) {
                if o.lo != T::zero() || o.hi != extent.decr() {
                    overlap = Overlap::Partial;
                    break;
                }
            }
        }

        if overlap == Overlap::Partial && self.cell_order != Layout::Hilbert {
            overlap = Overlap::PartialContig;
            for i in contig_checked_dims(self.cell_order, dim_num) {
                let o = &overlap_range[i];
                if o.lo != T::zero() || o.hi != extents[i].decr() {
                    overlap = Overlap::Partial;
                    break;
                }
            }
        }

        Ok((overlap_range, overlap))
    }

    /// Hilbert id of `coords`: each coordinate is zero-based against the
    /// domain lower bound and handed to the curve. Domain widths must fit
    /// 32 bits for the ids to be faithful.
    ///
    /// # Panics
    /// Panics if the cell order is not hilbert.
    pub fn hilbert_id<T: CoordValue>(&self, coords: &[T]) -> Result<u64, TypeMismatch> {
        let data = self.domain_data::<T>()?;
        let curve = self
            .hilbert_curve()
            .expect("hilbert_id requires hilbert cell order");
        assert_eq!(coords.len(), self.dim_num());

        let mut zero_based: SmallVec<[u32; 8]> = SmallVec::with_capacity(coords.len());
        for (coord, range) in coords.iter().zip(data.bounds()) {
            zero_based.push(coord.zero_based(range.lo));
        }
        Ok(curve.coords_to_id(&zero_based))
    }
}

/// Dimensions that must span the whole rectangle for the overlap to be one
/// contiguous run: all but the most significant dimension of the order.
fn contig_checked_dims(cell_order: Layout, dim_num: usize) -> std::ops::Range<usize> {
    match cell_order {
        Layout::RowMajor => 1..dim_num,
        Layout::ColMajor => 0..dim_num - 1,
        Layout::Hilbert => unreachable!("hilbert order has no contiguous overlap"),
    }
}

/// Strides with the last dimension varying fastest.
fn row_major_strides(counts: impl ExactSizeIterator<Item = i64>) -> SmallVec<[i64; 4]> {
    let counts: SmallVec<[i64; 4]> = counts.collect();
    let mut strides: SmallVec<[i64; 4]> = smallvec::smallvec![1; counts.len()];
    for i in (0..counts.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * counts[i + 1];
    }
    strides
}

/// Strides with the first dimension varying fastest.
fn col_major_strides(counts: impl ExactSizeIterator<Item = i64>) -> SmallVec<[i64; 4]> {
    let counts: SmallVec<[i64; 4]> = counts.collect();
    let mut strides: SmallVec<[i64; 4]> = smallvec::smallvec![1; counts.len()];
    for i in 1..counts.len() {
        strides[i] = strides[i - 1] * counts[i - 1];
    }
    strides
}

fn dot<T: CoordValue>(coords: &[T], strides: &[i64]) -> u64 {
    coords
        .iter()
        .zip(strides)
        .map(|(coord, stride)| coord.as_index() * stride)
        .sum::<i64>() as u64
}

fn min<T: PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

fn max<T: PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}
