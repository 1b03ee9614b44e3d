//! Byte-exact binary form of a schema.
//!
//! Single-version little-endian layout:
//!
//! ```text
//! i32  name_len;      bytes name[name_len]
//! u8   dense
//! u8   key_value
//! u8   tile_order              // stable layout code
//! u8   cell_order              // stable layout code
//! i64  capacity
//! i32  consolidation_step
//! i32  attribute_num
//!   repeat attribute_num:  i32 len; bytes name[len]
//! i32  dim_num
//!   repeat dim_num:        i32 len; bytes name[len]
//! i32  domain_size             // = 2 * coords_size
//! bytes domain[domain_size]
//! i32  tile_extents_size       // 0 or coords_size
//! bytes tile_extents[tile_extents_size]
//! u8   type[attribute_num + 1]       // stable type codes, coordinates last
//! i32  val_num[attribute_num]        // -1 marks a variable-sized attribute
//! u8   compression[attribute_num + 1]
//! ```
//!
//! The coordinates pseudo-attribute is never serialized; deserialization
//! re-validates the primaries and recomputes every derived field through the
//! same finalization the builder uses.

use bytes::{BufMut, Bytes, BytesMut};
use compact_str::CompactString;
use smallvec::SmallVec;

use crate::coords::Domain;
use crate::dtype::DataType;
use crate::schema::builder::{validate_attribute_names, validate_dimension_names};
use crate::schema::error::{FormatError, ValidationError};
use crate::schema::{ArraySchema, Compression, Layout, ValNum};

impl ArraySchema {
    /// Exact byte length of [`Self::serialize`]'s output.
    pub fn bin_size(&self) -> usize {
        let mut size = 0usize;
        size += 4 + self.name.len();
        size += 2; // dense, key_value
        size += 2; // tile order, cell order
        size += 8; // capacity
        size += 4; // consolidation step
        size += 4;
        for attribute in &self.attributes {
            size += 4 + attribute.len();
        }
        size += 4;
        for dimension in &self.dimensions {
            size += 4 + dimension.len();
        }
        size += 4 + self.domain.domain_blob_size();
        size += 4 + self.domain.extents_blob_size();
        size += self.attribute_num() + 1; // types
        size += 4 * self.attribute_num(); // val_num
        size += self.attribute_num() + 1; // compression
        size
    }

    /// Serialize into one contiguous buffer of exactly [`Self::bin_size`]
    /// bytes.
    pub fn serialize(&self) -> Bytes {
        let bin_size = self.bin_size();
        let mut buf = BytesMut::with_capacity(bin_size);

        buf.put_i32_le(self.name.len() as i32);
        buf.put_slice(self.name.as_bytes());
        buf.put_u8(self.dense as u8);
        buf.put_u8(self.key_value as u8);
        buf.put_u8(self.tile_order.to_code());
        buf.put_u8(self.cell_order.to_code());
        buf.put_i64_le(self.capacity as i64);
        buf.put_i32_le(self.consolidation_step as i32);

        buf.put_i32_le(self.attribute_num() as i32);
        for attribute in &self.attributes {
            buf.put_i32_le(attribute.len() as i32);
            buf.put_slice(attribute.as_bytes());
        }
        buf.put_i32_le(self.dim_num() as i32);
        for dimension in &self.dimensions {
            buf.put_i32_le(dimension.len() as i32);
            buf.put_slice(dimension.as_bytes());
        }

        buf.put_i32_le(self.domain.domain_blob_size() as i32);
        self.domain.write_domain(&mut buf);
        buf.put_i32_le(self.domain.extents_blob_size() as i32);
        self.domain.write_tile_extents(&mut buf);

        for dtype in &self.types {
            buf.put_u8(dtype.to_code());
        }
        buf.put_u8(self.coord_type.to_code());
        for val_num in &self.val_num {
            buf.put_i32_le(val_num.to_wire());
        }
        for compression in &self.compression {
            buf.put_u8(compression.to_code());
        }

        assert_eq!(buf.len(), bin_size, "serialized schema size mismatch");
        buf.freeze()
    }

    /// Strict inverse of [`Self::serialize`].
    pub fn deserialize(buf: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(buf);

        let name_len = reader.len_i32()?;
        let name = reader.name(name_len)?;
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let dense = reader.bool()?;
        let key_value = reader.bool()?;
        let tile_order_code = reader.u8()?;
        let tile_order = Layout::from_code(tile_order_code)
            .ok_or(FormatError::UnknownLayoutCode(tile_order_code))?;
        let cell_order_code = reader.u8()?;
        let cell_order = Layout::from_code(cell_order_code)
            .ok_or(FormatError::UnknownLayoutCode(cell_order_code))?;
        let capacity = reader.i64_le()?;
        if capacity <= 0 {
            return Err(FormatError::InvalidCapacity(capacity));
        }
        let consolidation_step = reader.i32_le()?;
        if consolidation_step <= 0 {
            return Err(FormatError::InvalidConsolidationStep(consolidation_step));
        }

        let attribute_num = reader.len_i32()?;
        let mut attributes = Vec::with_capacity(attribute_num);
        for _ in 0..attribute_num {
            let len = reader.len_i32()?;
            attributes.push(reader.name(len)?);
        }
        let dim_num = reader.len_i32()?;
        let mut dimensions: SmallVec<[CompactString; 4]> = SmallVec::with_capacity(dim_num);
        for _ in 0..dim_num {
            let len = reader.len_i32()?;
            dimensions.push(CompactString::from(reader.name(len)?));
        }

        let domain_size = reader.len_i32()?;
        let domain_blob = reader.take(domain_size)?;
        let extents_size = reader.len_i32()?;
        let extents_blob = if extents_size == 0 {
            None
        } else {
            Some(reader.take(extents_size)?)
        };

        let mut types = Vec::with_capacity(attribute_num);
        for _ in 0..attribute_num {
            let code = reader.u8()?;
            types.push(DataType::from_code(code).ok_or(FormatError::UnknownTypeCode(code))?);
        }
        let coord_code = reader.u8()?;
        let coord_type =
            DataType::from_code(coord_code).ok_or(FormatError::UnknownTypeCode(coord_code))?;

        let mut val_num = Vec::with_capacity(attribute_num);
        for _ in 0..attribute_num {
            let raw = reader.i32_le()?;
            val_num.push(ValNum::from_wire(raw).ok_or(FormatError::InvalidValNum(raw))?);
        }
        let mut compression = Vec::with_capacity(attribute_num + 1);
        for _ in 0..attribute_num + 1 {
            let code = reader.u8()?;
            compression
                .push(Compression::from_code(code).ok_or(FormatError::UnknownCompressionCode(code))?);
        }

        if reader.remaining() > 0 {
            return Err(FormatError::TrailingBytes(reader.remaining()));
        }

        validate_attribute_names(&attributes).map_err(FormatError::Invalid)?;
        validate_dimension_names(&dimensions, &attributes).map_err(FormatError::Invalid)?;

        let domain = Domain::decode(coord_type, dim_num, domain_blob, extents_blob)
            .map_err(FormatError::Invalid)?;

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
            capacity as u64,
            consolidation_step as u32,
            domain,
        )
        .map_err(FormatError::Invalid)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, FormatError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FormatError::InvalidBool(other)),
        }
    }

    fn i32_le(&mut self) -> Result<i32, FormatError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn i64_le(&mut self) -> Result<i64, FormatError> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    /// A non-negative `i32` length prefix.
    fn len_i32(&mut self) -> Result<usize, FormatError> {
        let offset = self.offset;
        let raw = self.i32_le()?;
        if raw < 0 {
            return Err(FormatError::NegativeLength { offset });
        }
        Ok(raw as usize)
    }

    fn name(&mut self, len: usize) -> Result<String, FormatError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidName)
    }
}
