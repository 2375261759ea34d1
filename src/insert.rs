//! Append engine for arrays, columns, and objects.
//!
//! An [`Inserter`] is scoped to the iterator it was opened from and writes
//! at that iterator's current position (or at the end marker once the end
//! was reached). Dropping the inserter hands the region back: the owning
//! iterator resumes at the insertion point and re-reads whatever was
//! written.
//!
//! Nested containers are bracketed by closure scope instead of explicit
//! begin/end pairs; the wire effect is the same: opener, child fields, end
//! marker, and the parent continues just past the end marker.

use crate::error::{ColsonError, Result};
use crate::iter::{ArrayIter, ColumnIter, ObjectIter};
use crate::layout::{self, null_sentinel_bytes, BOOLEAN_COLUMN_FALSE, BOOLEAN_COLUMN_TRUE};
use crate::marker::{
    AbstractClass, ColumnType, MARKER_BINARY, MARKER_BINARY_CUSTOM, MARKER_FALSE, MARKER_FLOAT,
    MARKER_I16, MARKER_I32, MARKER_I64, MARKER_I8, MARKER_NULL, MARKER_STRING, MARKER_TRUE,
    MARKER_U16, MARKER_U32, MARKER_U64, MARKER_U8,
};
use crate::media;
use crate::memfile::MemFile;

pub(crate) enum InsertContext<'a, 'f> {
    Array(&'a mut ArrayIter<'f>),
    Object(&'a mut ObjectIter<'f>),
    Column(&'a mut ColumnIter<'f>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtxKind {
    Array,
    Object,
    Column(ColumnType),
}

/// Append handle bound to an active iterator.
pub struct Inserter<'a, 'f> {
    ctx: InsertContext<'a, 'f>,
    /// Where this insert scope started; the owning iterator resumes here.
    start: u64,
    /// Next write position.
    pos: u64,
}

impl<'a, 'f> Inserter<'a, 'f> {
    pub(crate) fn for_array(it: &'a mut ArrayIter<'f>) -> Self {
        let start = if it.end_reached {
            it.pos
        } else {
            it.history.last().copied().unwrap_or(it.begin + 1)
        };
        Inserter {
            ctx: InsertContext::Array(it),
            start,
            pos: start,
        }
    }

    pub(crate) fn for_object(it: &'a mut ObjectIter<'f>) -> Self {
        let start = if it.end_reached {
            it.pos
        } else {
            it.history.last().copied().unwrap_or(it.begin + 1)
        };
        Inserter {
            ctx: InsertContext::Object(it),
            start,
            pos: start,
        }
    }

    pub(crate) fn for_column(it: &'a mut ColumnIter<'f>) -> Self {
        Inserter {
            ctx: InsertContext::Column(it),
            start: 0,
            pos: 0,
        }
    }

    fn kind(&self) -> CtxKind {
        match &self.ctx {
            InsertContext::Array(_) => CtxKind::Array,
            InsertContext::Object(_) => CtxKind::Object,
            InsertContext::Column(it) => CtxKind::Column(it.element_type()),
        }
    }

    fn file_mut(&mut self) -> &mut MemFile {
        match &mut self.ctx {
            InsertContext::Array(it) => &mut *it.file,
            InsertContext::Object(it) => &mut *it.file,
            InsertContext::Column(it) => &mut *it.file,
        }
    }

    fn require_array(&self, op: &str) -> Result<()> {
        match self.kind() {
            CtxKind::Array => Ok(()),
            other => Err(ColsonError::UnsupportedContainer(format!(
                "{} requires an array context, called in {:?} context",
                op, other
            ))),
        }
    }

    fn require_object(&self, op: &str) -> Result<()> {
        match self.kind() {
            CtxKind::Object => Ok(()),
            other => Err(ColsonError::UnsupportedContainer(format!(
                "{} requires an object context, called in {:?} context",
                op, other
            ))),
        }
    }

    // ── Raw write helpers ──────────────────────────────────────────

    /// Write the given bytes at the current position, opening space as
    /// needed without clobbering live data.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let pos = self.pos;
        let file = self.file_mut();
        file.seek(pos)?;
        file.ensure_space(bytes.len());
        file.write(bytes);
        let end = file.tell();
        self.pos = end;
        Ok(())
    }

    fn push_column(&mut self, slot: &[u8]) -> Result<()> {
        match &mut self.ctx {
            InsertContext::Column(it) => it.push_slot(slot),
            _ => Err(ColsonError::Internal(
                "column push outside a column context".into(),
            )),
        }
    }

    fn column_type_error(&self, wanted: &str) -> ColsonError {
        ColsonError::TypeMismatch(format!(
            "element type {} does not match the column type",
            wanted
        ))
    }

    // ── Scalar appends ─────────────────────────────────────────────

    pub fn insert_null(&mut self) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&[MARKER_NULL]),
            CtxKind::Column(ty) => {
                let sentinel = null_sentinel_bytes(ty);
                self.push_column(&sentinel[..ty.value_size()].to_vec())
            }
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_null".into(),
            )),
        }
    }

    pub fn insert_true(&mut self) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&[MARKER_TRUE]),
            CtxKind::Column(ColumnType::Boolean) => self.push_column(&[BOOLEAN_COLUMN_TRUE]),
            CtxKind::Column(_) => Err(self.column_type_error("boolean")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_true".into(),
            )),
        }
    }

    pub fn insert_false(&mut self) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&[MARKER_FALSE]),
            CtxKind::Column(ColumnType::Boolean) => self.push_column(&[BOOLEAN_COLUMN_FALSE]),
            CtxKind::Column(_) => Err(self.column_type_error("boolean")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_false".into(),
            )),
        }
    }

    pub fn insert_u8(&mut self, value: u8) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&[MARKER_U8, value]),
            CtxKind::Column(ColumnType::U8) => self.push_column(&[value]),
            CtxKind::Column(_) => Err(self.column_type_error("u8")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_u8".into(),
            )),
        }
    }

    pub fn insert_u16(&mut self, value: u16) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_U16, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::U16) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("u16")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_u16".into(),
            )),
        }
    }

    pub fn insert_u32(&mut self, value: u32) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_U32, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::U32) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("u32")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_u32".into(),
            )),
        }
    }

    pub fn insert_u64(&mut self, value: u64) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_U64, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::U64) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("u64")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_u64".into(),
            )),
        }
    }

    pub fn insert_i8(&mut self, value: i8) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_I8, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::I8) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("i8")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_i8".into(),
            )),
        }
    }

    pub fn insert_i16(&mut self, value: i16) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_I16, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::I16) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("i16")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_i16".into(),
            )),
        }
    }

    pub fn insert_i32(&mut self, value: i32) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_I32, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::I32) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("i32")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_i32".into(),
            )),
        }
    }

    pub fn insert_i64(&mut self, value: i64) -> Result<()> {
        match self.kind() {
            CtxKind::Array => self.write_raw(&field_bytes(MARKER_I64, &value.to_le_bytes())),
            CtxKind::Column(ColumnType::I64) => self.push_column(&value.to_le_bytes()),
            CtxKind::Column(_) => Err(self.column_type_error("i64")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_i64".into(),
            )),
        }
    }

    pub fn insert_float(&mut self, value: f32) -> Result<()> {
        match self.kind() {
            CtxKind::Array => {
                self.write_raw(&field_bytes(MARKER_FLOAT, &value.to_bits().to_le_bytes()))
            }
            CtxKind::Column(ColumnType::Float) => {
                self.push_column(&value.to_bits().to_le_bytes())
            }
            CtxKind::Column(_) => Err(self.column_type_error("float")),
            CtxKind::Object => Err(ColsonError::UnsupportedContainer(
                "keyless insert in object context; use prop_float".into(),
            )),
        }
    }

    /// Append an unsigned number in the smallest width that fits. A column
    /// has a fixed element type, so this is rejected there.
    pub fn insert_unsigned(&mut self, value: u64) -> Result<()> {
        if matches!(self.kind(), CtxKind::Column(_)) {
            return Err(ColsonError::InsertTooDangerous);
        }
        if value <= u8::MAX as u64 {
            self.insert_u8(value as u8)
        } else if value <= u16::MAX as u64 {
            self.insert_u16(value as u16)
        } else if value <= u32::MAX as u64 {
            self.insert_u32(value as u32)
        } else {
            self.insert_u64(value)
        }
    }

    /// Append a signed number in the smallest width that fits. A column
    /// has a fixed element type, so this is rejected there.
    pub fn insert_signed(&mut self, value: i64) -> Result<()> {
        if matches!(self.kind(), CtxKind::Column(_)) {
            return Err(ColsonError::InsertTooDangerous);
        }
        if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
            self.insert_i8(value as i8)
        } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            self.insert_i16(value as i16)
        } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            self.insert_i32(value as i32)
        } else {
            self.insert_i64(value)
        }
    }

    pub fn insert_string(&mut self, value: &str) -> Result<()> {
        self.require_array("insert_string")?;
        self.write_raw(&string_field_bytes(value))
    }

    /// Append a binary blob tagged with the media type registered for
    /// `file_ext`.
    pub fn insert_binary(&mut self, bytes: &[u8], file_ext: &str) -> Result<()> {
        self.require_array("insert_binary")?;
        self.write_raw(&binary_field_bytes(bytes, file_ext))
    }

    /// Append a binary blob tagged with a caller-defined type name.
    pub fn insert_binary_custom(&mut self, bytes: &[u8], type_name: &str) -> Result<()> {
        self.require_array("insert_binary_custom")?;
        self.write_raw(&binary_custom_field_bytes(bytes, type_name))
    }

    // ── Nested containers (array context) ──────────────────────────

    /// Append a nested array, reserving `reserve` bytes of slack, and fill
    /// it inside `f`. The parent continues past the child's end marker.
    pub fn insert_array<F>(&mut self, reserve: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_array("insert_array")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            layout::open_array(file, AbstractClass::UnsortedMultiset, reserve)?;
            let mut child = ArrayIter::new(file, start)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            child.fast_forward()?;
            new_pos = child.end_offset()? + 1;
        }
        self.pos = new_pos;
        Ok(())
    }

    /// Append a nested object and fill it inside `f`.
    pub fn insert_object<F>(&mut self, reserve: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_array("insert_object")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            layout::open_object(file, AbstractClass::UnsortedMultimap, reserve)?;
            let mut child = ObjectIter::new(file, start)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            child.fast_forward()?;
            new_pos = child.end_offset()? + 1;
        }
        self.pos = new_pos;
        Ok(())
    }

    /// Append a nested column of `ty` with the given slot capacity and
    /// fill it inside `f`.
    pub fn insert_column<F>(&mut self, ty: ColumnType, capacity: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_array("insert_column")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            layout::open_column(file, AbstractClass::UnsortedMultiset, ty, capacity)?;
            let mut child = ColumnIter::new(file, start)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            new_pos = child.end_offset();
        }
        self.pos = new_pos;
        Ok(())
    }

    // ── Keyed appends (object context) ─────────────────────────────

    fn prop_raw(&mut self, key: &str, field: &[u8]) -> Result<()> {
        self.require_object("keyed insert")?;
        let mut buf = Vec::with_capacity(key.len() + field.len() + 2);
        push_varuint(&mut buf, key.len() as u64);
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(field);
        self.write_raw(&buf)
    }

    pub fn prop_null(&mut self, key: &str) -> Result<()> {
        self.prop_raw(key, &[MARKER_NULL])
    }

    pub fn prop_true(&mut self, key: &str) -> Result<()> {
        self.prop_raw(key, &[MARKER_TRUE])
    }

    pub fn prop_false(&mut self, key: &str) -> Result<()> {
        self.prop_raw(key, &[MARKER_FALSE])
    }

    pub fn prop_u8(&mut self, key: &str, value: u8) -> Result<()> {
        self.prop_raw(key, &[MARKER_U8, value])
    }

    pub fn prop_u16(&mut self, key: &str, value: u16) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_U16, &value.to_le_bytes()))
    }

    pub fn prop_u32(&mut self, key: &str, value: u32) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_U32, &value.to_le_bytes()))
    }

    pub fn prop_u64(&mut self, key: &str, value: u64) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_U64, &value.to_le_bytes()))
    }

    pub fn prop_i8(&mut self, key: &str, value: i8) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_I8, &value.to_le_bytes()))
    }

    pub fn prop_i16(&mut self, key: &str, value: i16) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_I16, &value.to_le_bytes()))
    }

    pub fn prop_i32(&mut self, key: &str, value: i32) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_I32, &value.to_le_bytes()))
    }

    pub fn prop_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_I64, &value.to_le_bytes()))
    }

    pub fn prop_float(&mut self, key: &str, value: f32) -> Result<()> {
        self.prop_raw(key, &field_bytes(MARKER_FLOAT, &value.to_bits().to_le_bytes()))
    }

    pub fn prop_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.prop_raw(key, &string_field_bytes(value))
    }

    pub fn prop_binary(&mut self, key: &str, bytes: &[u8], file_ext: &str) -> Result<()> {
        self.prop_raw(key, &binary_field_bytes(bytes, file_ext))
    }

    pub fn prop_binary_custom(&mut self, key: &str, bytes: &[u8], type_name: &str) -> Result<()> {
        self.prop_raw(key, &binary_custom_field_bytes(bytes, type_name))
    }

    /// Keyed unsigned append in the smallest width that fits.
    pub fn prop_unsigned(&mut self, key: &str, value: u64) -> Result<()> {
        if value <= u8::MAX as u64 {
            self.prop_u8(key, value as u8)
        } else if value <= u16::MAX as u64 {
            self.prop_u16(key, value as u16)
        } else if value <= u32::MAX as u64 {
            self.prop_u32(key, value as u32)
        } else {
            self.prop_u64(key, value)
        }
    }

    /// Keyed signed append in the smallest width that fits.
    pub fn prop_signed(&mut self, key: &str, value: i64) -> Result<()> {
        if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
            self.prop_i8(key, value as i8)
        } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            self.prop_i16(key, value as i16)
        } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            self.prop_i32(key, value as i32)
        } else {
            self.prop_i64(key, value)
        }
    }

    /// Append a nested array under `key` and fill it inside `f`.
    pub fn prop_array<F>(&mut self, key: &str, reserve: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_object("prop_array")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            write_key(file, key);
            let child_begin = file.tell();
            layout::open_array(file, AbstractClass::UnsortedMultiset, reserve)?;
            let mut child = ArrayIter::new(file, child_begin)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            child.fast_forward()?;
            new_pos = child.end_offset()? + 1;
        }
        self.pos = new_pos;
        Ok(())
    }

    /// Append a nested object under `key` and fill it inside `f`.
    pub fn prop_object<F>(&mut self, key: &str, reserve: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_object("prop_object")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            write_key(file, key);
            let child_begin = file.tell();
            layout::open_object(file, AbstractClass::UnsortedMultimap, reserve)?;
            let mut child = ObjectIter::new(file, child_begin)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            child.fast_forward()?;
            new_pos = child.end_offset()? + 1;
        }
        self.pos = new_pos;
        Ok(())
    }

    /// Append a nested column of `ty` under `key` and fill it inside `f`.
    pub fn prop_column<F>(
        &mut self,
        key: &str,
        ty: ColumnType,
        capacity: u64,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        self.require_object("prop_column")?;
        let start = self.pos;
        let new_pos;
        {
            let file = self.file_mut();
            file.seek(start)?;
            write_key(file, key);
            let child_begin = file.tell();
            layout::open_column(file, AbstractClass::UnsortedMultiset, ty, capacity)?;
            let mut child = ColumnIter::new(file, child_begin)?;
            {
                let mut ins = child.insert_begin();
                f(&mut ins)?;
            }
            new_pos = child.end_offset();
        }
        self.pos = new_pos;
        Ok(())
    }
}

impl Drop for Inserter<'_, '_> {
    fn drop(&mut self) {
        match &mut self.ctx {
            InsertContext::Array(it) => it.reposition(self.start),
            InsertContext::Object(it) => it.reposition(self.start),
            InsertContext::Column(_) => {}
        }
    }
}

// ── Field encoding ─────────────────────────────────────────────────

fn push_varuint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn field_bytes(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(marker);
    buf.extend_from_slice(payload);
    buf
}

fn string_field_bytes(value: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + value.len());
    buf.push(MARKER_STRING);
    push_varuint(&mut buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
    buf
}

fn binary_field_bytes(bytes: &[u8], file_ext: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + bytes.len());
    buf.push(MARKER_BINARY);
    push_varuint(&mut buf, media::mime_id_by_ext(file_ext));
    push_varuint(&mut buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
    buf
}

fn binary_custom_field_bytes(bytes: &[u8], type_name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + type_name.len() + bytes.len());
    buf.push(MARKER_BINARY_CUSTOM);
    push_varuint(&mut buf, type_name.len() as u64);
    buf.extend_from_slice(type_name.as_bytes());
    push_varuint(&mut buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
    buf
}

fn write_key(file: &mut MemFile, key: &str) {
    let mut buf = Vec::with_capacity(1 + key.len());
    push_varuint(&mut buf, key.len() as u64);
    buf.extend_from_slice(key.as_bytes());
    file.ensure_space(buf.len());
    file.write(&buf);
}

// ── Tests ──────────────────────────────────────────────────────────
