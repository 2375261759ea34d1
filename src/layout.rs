//! On-wire container layout: opener construction and null sentinels.
//!
//! Containers are written with their end marker in place from the start, so
//! a document is well-formed at every point during construction:
//!
//! ```text
//! array   [opener][reserve x 0x00][array-end]
//! object  [opener][reserve x 0x00][object-end]
//! column  [opener][varuint num=0][varuint capacity][capacity * width x 0x00]
//! ```
//!
//! Columns carry no end marker; their extent is fully determined by the
//! header. The column payload start is derived from the opener as
//! `opener + varuint(num_elements) + varuint(capacity)`; this module owns
//! that computation so callers never encode it by hand.

use crate::error::{ColsonError, Result};
use crate::marker::{
    derive_list, derive_map, AbstractClass, ColumnType, FieldType, ListContainer,
    MARKER_ARRAY_END, MARKER_OBJECT_END,
};
use crate::memfile::MemFile;

// ── Null sentinels ─────────────────────────────────────────────────

pub const NULL_U8: u8 = u8::MAX;
pub const NULL_U16: u16 = u16::MAX;
pub const NULL_U32: u32 = u32::MAX;
pub const NULL_U64: u64 = u64::MAX;
pub const NULL_I8: i8 = i8::MIN;
pub const NULL_I16: i16 = i16::MIN;
pub const NULL_I32: i32 = i32::MIN;
pub const NULL_I64: i64 = i64::MIN;

/// Quiet-NaN bit pattern reserved to mean "null" in float columns.
pub const NULL_FLOAT_BITS: u32 = 0x7FC0_DEAD;

/// Three-valued byte for boolean column slots.
pub const BOOLEAN_COLUMN_FALSE: u8 = 0;
pub const BOOLEAN_COLUMN_TRUE: u8 = 1;
pub const BOOLEAN_COLUMN_NULL: u8 = 2;

pub fn is_null_f32(value: f32) -> bool {
    value.to_bits() == NULL_FLOAT_BITS
}

pub fn null_f32() -> f32 {
    f32::from_bits(NULL_FLOAT_BITS)
}

/// The null sentinel for a column element type, as little-endian slot bytes.
pub fn null_sentinel_bytes(ty: ColumnType) -> [u8; 8] {
    let mut slot = [0u8; 8];
    match ty {
        ColumnType::U8 => slot[0] = NULL_U8,
        ColumnType::U16 => slot[..2].copy_from_slice(&NULL_U16.to_le_bytes()),
        ColumnType::U32 => slot[..4].copy_from_slice(&NULL_U32.to_le_bytes()),
        ColumnType::U64 => slot.copy_from_slice(&NULL_U64.to_le_bytes()),
        ColumnType::I8 => slot[0] = NULL_I8 as u8,
        ColumnType::I16 => slot[..2].copy_from_slice(&NULL_I16.to_le_bytes()),
        ColumnType::I32 => slot[..4].copy_from_slice(&NULL_I32.to_le_bytes()),
        ColumnType::I64 => slot.copy_from_slice(&NULL_I64.to_le_bytes()),
        ColumnType::Float => slot[..4].copy_from_slice(&NULL_FLOAT_BITS.to_le_bytes()),
        ColumnType::Boolean => slot[0] = BOOLEAN_COLUMN_NULL,
    }
    slot
}

/// Check whether the slot at `offset` carries the element type's sentinel.
pub fn slot_is_null(file: &MemFile, ty: ColumnType, offset: u64) -> Result<bool> {
    Ok(match ty {
        ColumnType::U8 => file.u8_at(offset)? == NULL_U8,
        ColumnType::U16 => file.u16_at(offset)? == NULL_U16,
        ColumnType::U32 => file.u32_at(offset)? == NULL_U32,
        ColumnType::U64 => file.u64_at(offset)? == NULL_U64,
        ColumnType::I8 => file.i8_at(offset)? == NULL_I8,
        ColumnType::I16 => file.i16_at(offset)? == NULL_I16,
        ColumnType::I32 => file.i32_at(offset)? == NULL_I32,
        ColumnType::I64 => file.i64_at(offset)? == NULL_I64,
        ColumnType::Float => file.u32_at(offset)? == NULL_FLOAT_BITS,
        ColumnType::Boolean => file.u8_at(offset)? == BOOLEAN_COLUMN_NULL,
    })
}

// ── Container openers ──────────────────────────────────────────────

/// Write an array opener with `reserve` bytes of zero slack and its end
/// marker, leaving the cursor at the payload start. Returns the payload
/// start offset.
pub fn open_array(file: &mut MemFile, class: AbstractClass, reserve: u64) -> Result<u64> {
    let opener = derive_list(ListContainer::Array, class)?;
    file.ensure_space(1);
    file.write_byte(opener.marker());
    let payload_start = file.tell();
    if reserve > 0 {
        file.inplace_insert(reserve as usize);
        file.seek_relative(reserve as i64)?;
    }
    file.ensure_space(1);
    file.write_byte(MARKER_ARRAY_END);
    file.seek(payload_start)?;
    Ok(payload_start)
}

/// Write an object opener with `reserve` bytes of zero slack and its end
/// marker, leaving the cursor at the payload start. Returns the payload
/// start offset.
pub fn open_object(file: &mut MemFile, class: AbstractClass, reserve: u64) -> Result<u64> {
    let opener = derive_map(class)?;
    file.ensure_space(1);
    file.write_byte(opener.marker());
    let payload_start = file.tell();
    if reserve > 0 {
        file.inplace_insert(reserve as usize);
        file.seek_relative(reserve as i64)?;
    }
    file.ensure_space(1);
    file.write_byte(MARKER_OBJECT_END);
    file.seek(payload_start)?;
    Ok(payload_start)
}

/// Write a column opener with zeroed payload for `capacity` elements,
/// leaving the cursor at the payload start. Returns the payload start
/// offset.
pub fn open_column(
    file: &mut MemFile,
    class: AbstractClass,
    ty: ColumnType,
    capacity: u64,
) -> Result<u64> {
    let opener = derive_list(ListContainer::Column(ty), class)?;
    let header_len = 1 + MemFile::varuint_len(0) + MemFile::varuint_len(capacity);
    file.ensure_space(header_len);
    file.write_byte(opener.marker());
    file.write_varuint(0);
    file.write_varuint(capacity);
    let payload_start = file.tell();
    let payload_len = capacity as usize * ty.value_size();
    if payload_len > 0 {
        file.inplace_insert(payload_len);
    }
    Ok(payload_start)
}

// ── Column header decoding ─────────────────────────────────────────

/// Decoded column header: live element count, capacity, and the absolute
/// offset of the first payload slot.
#[derive(Debug, Clone, Copy)]
pub struct ColumnHeader {
    pub ty: ColumnType,
    pub num_elements: u64,
    pub capacity: u64,
    pub header_offset: u64,
    pub payload_offset: u64,
}

impl ColumnHeader {
    /// Byte offset of payload slot `index`.
    pub fn slot_offset(&self, index: u64) -> u64 {
        self.payload_offset + index * self.ty.value_size() as u64
    }

    /// One past the last payload byte.
    pub fn payload_end(&self) -> u64 {
        self.payload_offset + self.capacity * self.ty.value_size() as u64
    }
}

/// Decode a column header from the opener marker at `column_begin`.
pub fn read_column_header(file: &MemFile, column_begin: u64) -> Result<ColumnHeader> {
    let marker = file.u8_at(column_begin)?;
    let ty = match FieldType::from_marker(marker) {
        Some(FieldType::Column(ty, _)) => ty,
        _ => {
            return Err(ColsonError::MalformedDocument(format!(
                "column opener expected at offset {}, found {:#04x}",
                column_begin, marker
            )))
        }
    };
    let header_offset = column_begin + 1;
    let (num_elements, num_len) = file.varuint_at(header_offset)?;
    let (capacity, cap_len) = file.varuint_at(header_offset + num_len as u64)?;
    if num_elements > capacity {
        return Err(ColsonError::MalformedDocument(format!(
            "column at {} declares {} elements over capacity {}",
            column_begin, num_elements, capacity
        )));
    }
    Ok(ColumnHeader {
        ty,
        num_elements,
        capacity,
        header_offset,
        payload_offset: header_offset + num_len as u64 + cap_len as u64,
    })
}

// ── Tests ──────────────────────────────────────────────────────────
