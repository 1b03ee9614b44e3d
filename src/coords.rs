//! Typed coordinate domain.
//!
//! The domain and tile extents arrive from callers (and from the wire) as
//! little-endian byte blobs discriminated by the coordinate [`DataType`].
//! Decoding turns them into a [`Domain`]: a tagged variant over the four
//! coordinate scalar types, each carrying typed per-dimension vectors.
//! Geometry code matches on the tag once (through [`CoordValue::domain_data`])
//! and proceeds in a monomorphized body.

use bytes::{BufMut, BytesMut};
use smallvec::SmallVec;

use crate::dtype::DataType;
use crate::schema::error::ValidationError;

/// Inclusive per-dimension interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordRange<T> {
    pub lo: T,
    pub hi: T,
}

impl<T> CoordRange<T> {
    pub fn new(lo: T, hi: T) -> Self {
        Self { lo, hi }
    }
}

/// A coordinate scalar: exactly `i32`, `i64`, `f32` or `f64`.
///
/// The trait carries the little arithmetic vocabulary the geometry kernel
/// needs, so each operation can be written once and monomorphized per type.
/// Integer and float types disagree on tile counting: integers divide the
/// domain span by the extent (whole tiles only), floats take the ceiling of
/// the ratio (a fractional trailing tile still counts).
pub trait CoordValue:
    Copy + PartialEq + PartialOrd + Send + Sync + std::fmt::Debug + std::fmt::Display + 'static
{
    const DTYPE: DataType;
    const WIDTH: usize;

    /// Decode one value from exactly [`Self::WIDTH`] little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut BytesMut);

    fn zero() -> Self;
    /// `self + 1` in the coordinate type.
    fn incr(self) -> Self;
    /// `self - 1` in the coordinate type.
    fn decr(self) -> Self;
    /// `self - other`.
    fn sub(self, other: Self) -> Self;
    /// `hi - lo + 1`.
    fn span(lo: Self, hi: Self) -> Self;
    /// `hi - lo + 1`, widened for Hilbert bit computation.
    fn span_f64(lo: Self, hi: Self) -> f64;
    /// Number of tiles of width `extent` covering `[lo, hi]`.
    fn tiles_across(lo: Self, hi: Self, extent: Self) -> Self;
    /// Absolute low bound of tile `tile_coord` along a dimension starting at `lo`.
    fn tile_low(lo: Self, tile_coord: Self, extent: Self) -> Self;
    /// Inclusive high bound of a tile starting at `tile_lo`.
    fn tile_high(tile_lo: Self, extent: Self) -> Self;
    fn is_positive(self) -> bool;
    /// Lossy cast used for position arithmetic.
    fn as_index(self) -> i64;
    /// Zero-base against `lo` for the Hilbert adapter.
    fn zero_based(self, lo: Self) -> u32;

    /// Typed view of `domain` when the tags agree.
    fn domain_data(domain: &Domain) -> Option<&DomainData<Self>>;
}

macro_rules! impl_coord_int {
    ($ty:ty, $variant:ident, $put:ident) => {
        impl CoordValue for $ty {
            const DTYPE: DataType = DataType::$variant;
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn read_le(bytes: &[u8]) -> Self {
                <$ty>::from_le_bytes(bytes.try_into().expect("coordinate width mismatch"))
            }

            fn write_le(self, out: &mut BytesMut) {
                out.$put(self);
            }

            fn zero() -> Self {
                0
            }

            fn incr(self) -> Self {
                self + 1
            }

            fn decr(self) -> Self {
                self - 1
            }

            fn sub(self, other: Self) -> Self {
                self - other
            }

            fn span(lo: Self, hi: Self) -> Self {
                hi - lo + 1
            }

            fn span_f64(lo: Self, hi: Self) -> f64 {
                (hi - lo + 1) as f64
            }

            fn tiles_across(lo: Self, hi: Self, extent: Self) -> Self {
                (hi - lo + 1) / extent
            }

            fn tile_low(lo: Self, tile_coord: Self, extent: Self) -> Self {
                lo + tile_coord * extent
            }

            fn tile_high(tile_lo: Self, extent: Self) -> Self {
                tile_lo + extent - 1
            }

            fn is_positive(self) -> bool {
                self > 0
            }

            fn as_index(self) -> i64 {
                self as i64
            }

            fn zero_based(self, lo: Self) -> u32 {
                (self - lo) as u32
            }

            fn domain_data(domain: &Domain) -> Option<&DomainData<Self>> {
                match domain {
                    Domain::$variant(data) => Some(data),
                    _ => None,
                }
            }
        }
    };
}

macro_rules! impl_coord_float {
    ($ty:ty, $variant:ident, $put:ident) => {
        impl CoordValue for $ty {
            const DTYPE: DataType = DataType::$variant;
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn read_le(bytes: &[u8]) -> Self {
                <$ty>::from_le_bytes(bytes.try_into().expect("coordinate width mismatch"))
            }

            fn write_le(self, out: &mut BytesMut) {
                out.$put(self);
            }

            fn zero() -> Self {
                0.0
            }

            fn incr(self) -> Self {
                self + 1.0
            }

            fn decr(self) -> Self {
                self - 1.0
            }

            fn sub(self, other: Self) -> Self {
                self - other
            }

            fn span(lo: Self, hi: Self) -> Self {
                hi - lo + 1.0
            }

            fn span_f64(lo: Self, hi: Self) -> f64 {
                (hi - lo + 1.0) as f64
            }

            fn tiles_across(lo: Self, hi: Self, extent: Self) -> Self {
                ((hi - lo + 1.0) / extent).ceil()
            }

            fn tile_low(lo: Self, tile_coord: Self, extent: Self) -> Self {
                lo + tile_coord * extent
            }

            fn tile_high(tile_lo: Self, extent: Self) -> Self {
                tile_lo + extent - 1.0
            }

            fn is_positive(self) -> bool {
                self > 0.0
            }

            fn as_index(self) -> i64 {
                self as i64
            }

            fn zero_based(self, lo: Self) -> u32 {
                (self - lo) as u32
            }

            fn domain_data(domain: &Domain) -> Option<&DomainData<Self>> {
                match domain {
                    Domain::$variant(data) => Some(data),
                    _ => None,
                }
            }
        }
    };
}

impl_coord_int!(i32, Int32, put_i32_le);
impl_coord_int!(i64, Int64, put_i64_le);
impl_coord_float!(f32, Float32, put_f32_le);
impl_coord_float!(f64, Float64, put_f64_le);

/// Per-dimension bounds, optional tile extents, and the derived tile grid
/// for one concrete coordinate type.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainData<T> {
    bounds: SmallVec<[CoordRange<T>; 4]>,
    tile_extents: Option<SmallVec<[T; 4]>>,
    tile_domain: Option<SmallVec<[CoordRange<T>; 4]>>,
}

impl<T: CoordValue> DomainData<T> {
    fn decode(
        dim_num: usize,
        domain: &[u8],
        tile_extents: Option<&[u8]>,
    ) -> Result<Self, ValidationError> {
        let width = T::WIDTH;

        let expected = 2 * dim_num * width;
        if domain.len() != expected {
            return Err(ValidationError::DomainSize {
                expected,
                actual: domain.len(),
            });
        }
        let mut bounds: SmallVec<[CoordRange<T>; 4]> = SmallVec::with_capacity(dim_num);
        for (dim, pair) in domain.chunks_exact(2 * width).enumerate() {
            let lo = T::read_le(&pair[..width]);
            let hi = T::read_le(&pair[width..]);
            if !(lo <= hi) {
                return Err(ValidationError::DomainInverted { dim });
            }
            bounds.push(CoordRange::new(lo, hi));
        }

        let tile_extents = match tile_extents {
            None => None,
            Some(blob) => {
                let expected = dim_num * width;
                if blob.len() != expected {
                    return Err(ValidationError::TileExtentsSize {
                        expected,
                        actual: blob.len(),
                    });
                }
                let mut extents: SmallVec<[T; 4]> = SmallVec::with_capacity(dim_num);
                for (dim, raw) in blob.chunks_exact(width).enumerate() {
                    let extent = T::read_le(raw);
                    if !extent.is_positive() {
                        return Err(ValidationError::NonPositiveExtent { dim });
                    }
                    extents.push(extent);
                }
                Some(extents)
            }
        };

        let tile_domain = tile_extents.as_ref().map(|extents| {
            bounds
                .iter()
                .zip(extents.iter())
                .map(|(range, &extent)| {
                    let count = T::tiles_across(range.lo, range.hi, extent);
                    CoordRange::new(T::zero(), count.decr())
                })
                .collect()
        });

        Ok(Self {
            bounds,
            tile_extents,
            tile_domain,
        })
    }

    pub fn dim_num(&self) -> usize {
        self.bounds.len()
    }

    pub fn bounds(&self) -> &[CoordRange<T>] {
        &self.bounds
    }

    pub fn tile_extents(&self) -> Option<&[T]> {
        self.tile_extents.as_deref()
    }

    /// Zero-based per-dimension tile ranges `[0, count - 1]`; present iff
    /// tile extents are.
    pub fn tile_domain(&self) -> Option<&[CoordRange<T>]> {
        self.tile_domain.as_deref()
    }

    fn write_domain(&self, out: &mut BytesMut) {
        for range in &self.bounds {
            range.lo.write_le(out);
            range.hi.write_le(out);
        }
    }

    fn write_tile_extents(&self, out: &mut BytesMut) {
        if let Some(extents) = &self.tile_extents {
            for extent in extents {
                extent.write_le(out);
            }
        }
    }

    fn hilbert_bits(&self) -> u32 {
        let mut max_span = 0.0f64;
        for range in &self.bounds {
            let span = T::span_f64(range.lo, range.hi);
            if span > max_span {
                max_span = span;
            }
        }
        let width = (max_span + 0.5) as i64;
        if width <= 1 {
            return 0;
        }
        (width as f64).log2().ceil() as u32
    }

    fn tile_cell_num(&self) -> Result<u64, ValidationError> {
        let extents = self
            .tile_extents
            .as_ref()
            .expect("cell count requires tile extents");
        extents
            .iter()
            .try_fold(1u64, |acc, extent| {
                acc.checked_mul(extent.as_index() as u64)
            })
            .ok_or(ValidationError::CellCountOverflow)
    }

    fn tile_num(&self) -> Result<u64, ValidationError> {
        let extents = self
            .tile_extents
            .as_ref()
            .expect("tile count requires tile extents");
        self.bounds
            .iter()
            .zip(extents.iter())
            .try_fold(1u64, |acc, (range, &extent)| {
                let count = T::tiles_across(range.lo, range.hi, extent).as_index() as u64;
                acc.checked_mul(count)
            })
            .ok_or(ValidationError::TileCountOverflow)
    }
}

/// The coordinate domain of a schema: a tagged variant over the four legal
/// coordinate types.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    Int32(DomainData<i32>),
    Int64(DomainData<i64>),
    Float32(DomainData<f32>),
    Float64(DomainData<f64>),
}

/// Match on a [`Domain`], binding the typed [`DomainData`] in every arm.
#[macro_export]
macro_rules! match_each_domain {
    ($domain:expr, $data:ident => $body:expr) => {
        match $domain {
            $crate::coords::Domain::Int32($data) => $body,
            $crate::coords::Domain::Int64($data) => $body,
            $crate::coords::Domain::Float32($data) => $body,
            $crate::coords::Domain::Float64($data) => $body,
        }
    };
}

impl Domain {
    /// Decode the domain blob `[lo_0, hi_0, lo_1, hi_1, ..]` and the optional
    /// tile extents blob, both little-endian in `dtype`.
    pub fn decode(
        dtype: DataType,
        dim_num: usize,
        domain: &[u8],
        tile_extents: Option<&[u8]>,
    ) -> Result<Self, ValidationError> {
        match dtype {
            DataType::Int32 => Ok(Domain::Int32(DomainData::decode(
                dim_num,
                domain,
                tile_extents,
            )?)),
            DataType::Int64 => Ok(Domain::Int64(DomainData::decode(
                dim_num,
                domain,
                tile_extents,
            )?)),
            DataType::Float32 => Ok(Domain::Float32(DomainData::decode(
                dim_num,
                domain,
                tile_extents,
            )?)),
            DataType::Float64 => Ok(Domain::Float64(DomainData::decode(
                dim_num,
                domain,
                tile_extents,
            )?)),
            DataType::Char => Err(ValidationError::UnknownCoordType("char".to_string())),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Domain::Int32(_) => DataType::Int32,
            Domain::Int64(_) => DataType::Int64,
            Domain::Float32(_) => DataType::Float32,
            Domain::Float64(_) => DataType::Float64,
        }
    }

    pub fn dim_num(&self) -> usize {
        match_each_domain!(self, data => data.dim_num())
    }

    pub fn has_tile_extents(&self) -> bool {
        match_each_domain!(self, data => data.tile_extents.is_some())
    }

    /// Byte length of the encoded domain blob: `2 * coords_size`.
    pub fn domain_blob_size(&self) -> usize {
        2 * self.dim_num() * self.dtype().size()
    }

    /// Byte length of the encoded tile extents blob: `coords_size`, or 0 when absent.
    pub fn extents_blob_size(&self) -> usize {
        if self.has_tile_extents() {
            self.dim_num() * self.dtype().size()
        } else {
            0
        }
    }

    pub(crate) fn write_domain(&self, out: &mut BytesMut) {
        match_each_domain!(self, data => data.write_domain(out))
    }

    pub(crate) fn write_tile_extents(&self, out: &mut BytesMut) {
        match_each_domain!(self, data => data.write_tile_extents(out))
    }

    /// `ceil(log2(max_i(hi_i - lo_i + 1)))`.
    pub(crate) fn hilbert_bits(&self) -> u32 {
        match_each_domain!(self, data => data.hilbert_bits())
    }

    /// Product of the tile extents, checked.
    pub(crate) fn tile_cell_num(&self) -> Result<u64, ValidationError> {
        match_each_domain!(self, data => data.tile_cell_num())
    }

    /// Product of the per-dimension tile counts; integral coordinate types
    /// with tile extents only.
    pub(crate) fn tile_num(&self) -> Result<Option<u64>, ValidationError> {
        if !self.has_tile_extents() {
            return Ok(None);
        }
        match self {
            Domain::Int32(data) => data.tile_num().map(Some),
            Domain::Int64(data) => data.tile_num().map(Some),
            Domain::Float32(_) | Domain::Float64(_) => Ok(None),
        }
    }
}

/// Encode a typed slice as the little-endian blob the builder consumes.
pub fn encode_blob<T: CoordValue>(values: &[T]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(values.len() * T::WIDTH);
    for value in values {
        value.write_le(&mut out);
    }
    out.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_int64_domain_with_extents() {
        let domain = encode_blob(&[0i64, 9, 0, 9]);
        let extents = encode_blob(&[5i64, 5]);
        let decoded = Domain::decode(DataType::Int64, 2, &domain, Some(&extents)).unwrap();

        let data = <i64 as CoordValue>::domain_data(&decoded).unwrap();
        assert_eq!(data.bounds(), &[CoordRange::new(0, 9), CoordRange::new(0, 9)]);
        assert_eq!(data.tile_extents(), Some(&[5i64, 5][..]));
        assert_eq!(
            data.tile_domain(),
            Some(&[CoordRange::new(0, 1), CoordRange::new(0, 1)][..])
        );
        assert_eq!(decoded.tile_num().unwrap(), Some(4));
        assert_eq!(decoded.tile_cell_num().unwrap(), 25);
    }

    #[test]
    fn decode_rejects_inverted_bounds() {
        let domain = encode_blob(&[0i32, 9, 5, 0]);
        let err = Domain::decode(DataType::Int32, 2, &domain, None).unwrap_err();
        assert_eq!(err, ValidationError::DomainInverted { dim: 1 });
    }

    #[test]
    fn decode_rejects_wrong_blob_size() {
        let domain = encode_blob(&[0i32, 9, 0]);
        let err = Domain::decode(DataType::Int32, 2, &domain, None).unwrap_err();
        match err {
            ValidationError::DomainSize {
                expected: 16,
                actual: 12,
            } => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_non_positive_extent() {
        let domain = encode_blob(&[0i32, 9, 0, 9]);
        let extents = encode_blob(&[5i32, 0]);
        let err = Domain::decode(DataType::Int32, 2, &domain, Some(&extents)).unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveExtent { dim: 1 });
    }

    #[test]
    fn float_tile_domain_rounds_up() {
        // Span 10.0 with extent 4.0 covers 2.5 tiles; floats count the
        // fractional trailing tile, integers do not.
        let domain = encode_blob(&[0.0f64, 9.0, 0.0, 9.0]);
        let extents = encode_blob(&[4.0f64, 5.0]);
        let decoded = Domain::decode(DataType::Float64, 2, &domain, Some(&extents)).unwrap();
        let data = <f64 as CoordValue>::domain_data(&decoded).unwrap();
        assert_eq!(
            data.tile_domain(),
            Some(&[CoordRange::new(0.0, 2.0), CoordRange::new(0.0, 1.0)][..])
        );

        let domain = encode_blob(&[0i64, 9, 0, 9]);
        let extents = encode_blob(&[4i64, 5]);
        let decoded = Domain::decode(DataType::Int64, 2, &domain, Some(&extents)).unwrap();
        let data = <i64 as CoordValue>::domain_data(&decoded).unwrap();
        assert_eq!(
            data.tile_domain(),
            Some(&[CoordRange::new(0, 1), CoordRange::new(0, 1)][..])
        );
    }

    #[test]
    fn typed_downcast_refuses_other_tags() {
        let domain = encode_blob(&[0i32, 9]);
        let decoded = Domain::decode(DataType::Int32, 1, &domain, None).unwrap();
        assert!(<i32 as CoordValue>::domain_data(&decoded).is_some());
        assert!(<i64 as CoordValue>::domain_data(&decoded).is_none());
        assert!(<f64 as CoordValue>::domain_data(&decoded).is_none());
    }

    #[test]
    fn hilbert_bits_from_widest_dimension() {
        let domain = encode_blob(&[0i32, 1023, 0, 511]);
        let decoded = Domain::decode(DataType::Int32, 2, &domain, None).unwrap();
        assert_eq!(decoded.hilbert_bits(), 10);

        let domain = encode_blob(&[0i32, 999]);
        let decoded = Domain::decode(DataType::Int32, 1, &domain, None).unwrap();
        assert_eq!(decoded.hilbert_bits(), 10);

        let domain = encode_blob(&[7i32, 7]);
        let decoded = Domain::decode(DataType::Int32, 1, &domain, None).unwrap();
        assert_eq!(decoded.hilbert_bits(), 0);
    }

    #[test]
    fn blob_round_trips_through_writers() {
        let domain = encode_blob(&[-4i32, 11, 2, 99]);
        let extents = encode_blob(&[8i32, 14]);
        let decoded = Domain::decode(DataType::Int32, 2, &domain, Some(&extents)).unwrap();

        let mut out = BytesMut::new();
        decoded.write_domain(&mut out);
        assert_eq!(&out[..], &domain[..]);

        let mut out = BytesMut::new();
        decoded.write_tile_extents(&mut out);
        assert_eq!(&out[..], &extents[..]);
    }
}
