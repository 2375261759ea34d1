//! Stateful readers over arrays, columns, and objects.
//!
//! All three iterators keep absolute byte offsets into the shared
//! [`MemFile`](crate::memfile::MemFile) and borrow it exclusively for their
//! lifetime; a nested iterator reborrows from its parent, freezing the
//! parent until the child is dropped.

pub mod array;
pub mod column;
pub mod object;

pub use array::ArrayIter;
pub use column::ColumnIter;
pub use object::ObjectIter;

use crate::error::{ColsonError, Result};
use crate::marker::{FieldType, MARKER_ARRAY_END, MARKER_EMPTY, MARKER_OBJECT_END};
use crate::memfile::MemFile;

/// A decoded binary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryValue<'a> {
    /// Media-type id for `binary` fields (see [`crate::media`]).
    pub mime_id: Option<u64>,
    /// Inline type name for `binary_custom` fields.
    pub type_name: Option<&'a str>,
    pub bytes: &'a [u8],
}

// ── Shared decode helpers ──────────────────────────────────────────

/// Skip empty-space bytes at the cursor.
pub(crate) fn skip_empty(file: &mut MemFile) -> Result<()> {
    while file.remaining() > 0 && file.peek_byte()? == MARKER_EMPTY {
        file.seek_relative(1)?;
    }
    Ok(())
}

/// Skip `n` payload bytes; running off the end of the buffer means the
/// field was truncated.
fn skip_bytes(file: &mut MemFile, n: u64) -> Result<()> {
    if (file.remaining() as u64) < n {
        return Err(ColsonError::MalformedDocument(format!(
            "truncated field payload ({} bytes declared, {} remain)",
            n,
            file.remaining()
        )));
    }
    file.seek_relative(n as i64)
}

/// Advance the cursor past a field's payload. The cursor must sit just
/// after the field's marker byte.
pub(crate) fn skip_field_body(file: &mut MemFile, ty: FieldType) -> Result<()> {
    match ty {
        FieldType::Null | FieldType::True | FieldType::False => Ok(()),
        FieldType::NumU8 | FieldType::NumI8 => skip_bytes(file, 1),
        FieldType::NumU16 | FieldType::NumI16 => skip_bytes(file, 2),
        FieldType::NumU32 | FieldType::NumI32 | FieldType::NumFloat => skip_bytes(file, 4),
        FieldType::NumU64 | FieldType::NumI64 => skip_bytes(file, 8),
        FieldType::String => {
            let len = file.read_varuint()?;
            skip_bytes(file, len)
        }
        FieldType::Binary => {
            let _mime_id = file.read_varuint()?;
            let len = file.read_varuint()?;
            skip_bytes(file, len)
        }
        FieldType::BinaryCustom => {
            let name_len = file.read_varuint()?;
            skip_bytes(file, name_len)?;
            let len = file.read_varuint()?;
            skip_bytes(file, len)
        }
        FieldType::Array(_) => skip_array_body(file),
        FieldType::Object(_) => skip_object_body(file),
        FieldType::Column(ty, _) => {
            let _num = file.read_varuint()?;
            let capacity = file.read_varuint()?;
            let payload = capacity.checked_mul(ty.value_size() as u64).ok_or_else(|| {
                ColsonError::MalformedDocument("column capacity overflows".into())
            })?;
            skip_bytes(file, payload)
        }
    }
}

/// Skip an array payload up to and including its end marker. The cursor
/// must sit just after the array opener.
fn skip_array_body(file: &mut MemFile) -> Result<()> {
    loop {
        skip_empty(file)?;
        let byte = file.read_byte()?;
        if byte == MARKER_ARRAY_END {
            return Ok(());
        }
        let ty = FieldType::from_marker(byte).ok_or_else(|| {
            ColsonError::MalformedDocument(format!(
                "unknown marker {:#04x} at offset {}",
                byte,
                file.tell() - 1
            ))
        })?;
        skip_field_body(file, ty)?;
    }
}

/// Skip an object payload up to and including its end marker. The cursor
/// must sit just after the object opener.
fn skip_object_body(file: &mut MemFile) -> Result<()> {
    loop {
        skip_empty(file)?;
        if file.peek_byte()? == MARKER_OBJECT_END {
            file.seek_relative(1)?;
            return Ok(());
        }
        let key_len = file.read_varuint()?;
        skip_bytes(file, key_len)?;
        let byte = file.read_byte()?;
        let ty = FieldType::from_marker(byte).ok_or_else(|| {
            ColsonError::MalformedDocument(format!(
                "unknown marker {:#04x} at offset {}",
                byte,
                file.tell() - 1
            ))
        })?;
        skip_field_body(file, ty)?;
    }
}

// ── Typed field reads (offset-based, cursor untouched) ─────────────

pub(crate) fn string_at(file: &MemFile, data_off: u64) -> Result<&str> {
    let (len, len_len) = file.varuint_at(data_off)?;
    let bytes = file.bytes_at(data_off + len_len as u64, len as usize)?;
    std::str::from_utf8(bytes)
        .map_err(|_| ColsonError::MalformedDocument("string field is not valid UTF-8".into()))
}

pub(crate) fn binary_at(file: &MemFile, ty: FieldType, data_off: u64) -> Result<BinaryValue<'_>> {
    match ty {
        FieldType::Binary => {
            let (mime_id, n1) = file.varuint_at(data_off)?;
            let (len, n2) = file.varuint_at(data_off + n1 as u64)?;
            let bytes = file.bytes_at(data_off + n1 as u64 + n2 as u64, len as usize)?;
            Ok(BinaryValue {
                mime_id: Some(mime_id),
                type_name: None,
                bytes,
            })
        }
        FieldType::BinaryCustom => {
            let (name_len, n1) = file.varuint_at(data_off)?;
            let name_off = data_off + n1 as u64;
            let name_bytes = file.bytes_at(name_off, name_len as usize)?;
            let type_name = std::str::from_utf8(name_bytes).map_err(|_| {
                ColsonError::MalformedDocument("binary type name is not valid UTF-8".into())
            })?;
            let (len, n2) = file.varuint_at(name_off + name_len)?;
            let bytes = file.bytes_at(name_off + name_len + n2 as u64, len as usize)?;
            Ok(BinaryValue {
                mime_id: None,
                type_name: Some(type_name),
                bytes,
            })
        }
        other => Err(ColsonError::TypeMismatch(format!(
            "binary field expected, found {:?}",
            other
        ))),
    }
}

/// Unsigned read across all unsigned widths; `None` for a null field.
pub(crate) fn unsigned_at(file: &MemFile, ty: FieldType, data_off: u64) -> Result<Option<u64>> {
    Ok(Some(match ty {
        FieldType::Null => return Ok(None),
        FieldType::NumU8 => file.u8_at(data_off)? as u64,
        FieldType::NumU16 => file.u16_at(data_off)? as u64,
        FieldType::NumU32 => file.u32_at(data_off)? as u64,
        FieldType::NumU64 => file.u64_at(data_off)?,
        other => {
            return Err(ColsonError::TypeMismatch(format!(
                "unsigned number expected, found {:?}",
                other
            )))
        }
    }))
}

/// Signed read across all signed widths; `None` for a null field.
pub(crate) fn signed_at(file: &MemFile, ty: FieldType, data_off: u64) -> Result<Option<i64>> {
    Ok(Some(match ty {
        FieldType::Null => return Ok(None),
        FieldType::NumI8 => file.i8_at(data_off)? as i64,
        FieldType::NumI16 => file.i16_at(data_off)? as i64,
        FieldType::NumI32 => file.i32_at(data_off)? as i64,
        FieldType::NumI64 => file.i64_at(data_off)?,
        other => {
            return Err(ColsonError::TypeMismatch(format!(
                "signed number expected, found {:?}",
                other
            )))
        }
    }))
}

pub(crate) fn float_at(file: &MemFile, ty: FieldType, data_off: u64) -> Result<Option<f32>> {
    match ty {
        FieldType::Null => Ok(None),
        FieldType::NumFloat => Ok(Some(file.f32_at(data_off)?)),
        other => Err(ColsonError::TypeMismatch(format!(
            "float expected, found {:?}",
            other
        ))),
    }
}

pub(crate) fn bool_at(ty: FieldType) -> Result<bool> {
    match ty {
        FieldType::True => Ok(true),
        FieldType::False => Ok(false),
        other => Err(ColsonError::TypeMismatch(format!(
            "boolean expected, found {:?}",
            other
        ))),
    }
}
