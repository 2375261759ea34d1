//! Read/write iterator over object containers.
//!
//! Objects hold a sequence of `(key, value)` pairs. Keys are
//! length-prefixed strings without a marker prefix; values are full typed
//! fields, exactly as in arrays.

use crate::error::{ColsonError, Result};
use crate::insert::Inserter;
use crate::iter::{
    binary_at, bool_at, float_at, signed_at, skip_empty, skip_field_body, string_at, unsigned_at,
    ArrayIter, BinaryValue, ColumnIter,
};
use crate::marker::{
    derive_map, FieldType, MapDerivation, MARKER_FALSE, MARKER_OBJECT_END, MARKER_TRUE,
};
use crate::memfile::MemFile;

/// The property the iterator currently points at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Prop {
    /// Offset of the key length varuint.
    pub(crate) begin: u64,
    /// Offset of the key bytes.
    pub(crate) key_data: u64,
    pub(crate) key_len: u64,
    /// Offset of the value's marker byte.
    pub(crate) val_begin: u64,
    /// Offset of the value's payload.
    pub(crate) val_data: u64,
    pub(crate) val_ty: FieldType,
}

/// Stateful reader over an object container.
pub struct ObjectIter<'f> {
    pub(crate) file: &'f mut MemFile,
    pub(crate) begin: u64,
    pub(crate) derivation: MapDerivation,
    pub(crate) pos: u64,
    pub(crate) history: Vec<u64>,
    pub(crate) prop: Option<Prop>,
    pub(crate) end_reached: bool,
}

impl<'f> ObjectIter<'f> {
    /// Open an iterator at an object opener marker.
    pub(crate) fn new(file: &'f mut MemFile, begin: u64) -> Result<Self> {
        let marker = file.u8_at(begin)?;
        let derivation = match FieldType::from_marker(marker) {
            Some(FieldType::Object(d)) => d,
            _ => {
                return Err(ColsonError::MalformedDocument(format!(
                    "object opener expected at offset {}, found {:#04x}",
                    begin, marker
                )))
            }
        };
        Ok(Self {
            file,
            begin,
            derivation,
            pos: begin + 1,
            history: Vec::new(),
            prop: None,
            end_reached: false,
        })
    }

    /// Offset of the object's opener marker.
    pub fn begin_offset(&self) -> u64 {
        self.begin
    }

    // ── Cursor movement ────────────────────────────────────────────

    /// Advance to the next `(key, value)` pair. Returns `false` once the
    /// end marker is reached.
    pub fn next(&mut self) -> Result<bool> {
        if self.end_reached {
            return Ok(false);
        }
        self.file.seek(self.pos)?;
        skip_empty(self.file)?;
        let begin = self.file.tell();
        if self.file.peek_byte()? == MARKER_OBJECT_END {
            self.end_reached = true;
            self.pos = begin;
            self.prop = None;
            return Ok(false);
        }
        let key_len = self.file.read_varuint()?;
        let key_data = self.file.tell();
        self.file.seek_relative(key_len as i64)?;
        let val_begin = self.file.tell();
        let byte = self.file.read_byte()?;
        let val_ty = FieldType::from_marker(byte).ok_or_else(|| {
            ColsonError::MalformedDocument(format!(
                "unknown marker {:#04x} at offset {}",
                byte, val_begin
            ))
        })?;
        let val_data = self.file.tell();
        skip_field_body(self.file, val_ty)?;
        self.pos = self.file.tell();
        self.history.push(begin);
        self.prop = Some(Prop {
            begin,
            key_data,
            key_len,
            val_begin,
            val_data,
            val_ty,
        });
        Ok(true)
    }

    /// Whether another pair follows, without advancing.
    pub fn has_next(&mut self) -> Result<bool> {
        let saved = self.save_state();
        let result = self.next();
        self.restore_state(saved);
        result
    }

    /// Step back to the previous pair. Returns `false` when there is no
    /// previous pair (the iterator is then rewound).
    pub fn prev(&mut self) -> Result<bool> {
        if self.prop.is_some() {
            self.history.pop();
        }
        self.end_reached = false;
        self.prop = None;
        match self.history.pop() {
            Some(off) => {
                self.pos = off;
                self.next()
            }
            None => {
                self.rewind()?;
                Ok(false)
            }
        }
    }

    /// Reposition at the beginning of the object.
    pub fn rewind(&mut self) -> Result<()> {
        self.pos = self.begin + 1;
        self.history.clear();
        self.prop = None;
        self.end_reached = false;
        Ok(())
    }

    /// Advance to the end marker without exposing the pairs in between.
    pub fn fast_forward(&mut self) -> Result<()> {
        while self.next()? {}
        Ok(())
    }

    /// Offset of the current pair, or of the next read position when no
    /// pair is current.
    pub fn tell(&self) -> u64 {
        self.prop.map(|p| p.begin).unwrap_or(self.pos)
    }

    /// Offset of the object's end marker. Valid once the end was reached.
    pub fn end_offset(&self) -> Result<u64> {
        if self.end_reached {
            Ok(self.pos)
        } else {
            Err(ColsonError::IllegalState(
                "object end not reached".into(),
            ))
        }
    }

    fn save_state(&self) -> (u64, bool, Option<Prop>, usize) {
        (self.pos, self.end_reached, self.prop, self.history.len())
    }

    fn restore_state(&mut self, saved: (u64, bool, Option<Prop>, usize)) {
        self.pos = saved.0;
        self.end_reached = saved.1;
        self.prop = saved.2;
        self.history.truncate(saved.3);
    }

    /// Called when an inserter scoped to this iterator drops: forget
    /// everything at or after the insertion point and resume there.
    pub(crate) fn reposition(&mut self, at: u64) {
        self.pos = at;
        self.prop = None;
        self.end_reached = false;
        while self.history.last().is_some_and(|&off| off >= at) {
            self.history.pop();
        }
    }

    // ── Property access ────────────────────────────────────────────

    pub(crate) fn current(&self) -> Result<Prop> {
        self.prop.ok_or_else(|| {
            ColsonError::IllegalState("iterator does not point at a property".into())
        })
    }

    /// Key of the current property.
    pub fn prop_name(&self) -> Result<&str> {
        let p = self.current()?;
        let bytes = self.file.bytes_at(p.key_data, p.key_len as usize)?;
        std::str::from_utf8(bytes)
            .map_err(|_| ColsonError::MalformedDocument("object key is not valid UTF-8".into()))
    }

    /// Field type of the current property's value.
    pub fn prop_type(&self) -> Result<FieldType> {
        Ok(self.current()?.val_ty)
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(self.current()?.val_ty == FieldType::Null)
    }

    pub fn bool_value(&self) -> Result<bool> {
        bool_at(self.current()?.val_ty)
    }

    pub fn u8_value(&self) -> Result<u8> {
        let p = self.expect(FieldType::NumU8)?;
        self.file.u8_at(p.val_data)
    }

    pub fn u16_value(&self) -> Result<u16> {
        let p = self.expect(FieldType::NumU16)?;
        self.file.u16_at(p.val_data)
    }

    pub fn u32_value(&self) -> Result<u32> {
        let p = self.expect(FieldType::NumU32)?;
        self.file.u32_at(p.val_data)
    }

    pub fn u64_value(&self) -> Result<u64> {
        let p = self.expect(FieldType::NumU64)?;
        self.file.u64_at(p.val_data)
    }

    pub fn i8_value(&self) -> Result<i8> {
        let p = self.expect(FieldType::NumI8)?;
        self.file.i8_at(p.val_data)
    }

    pub fn i16_value(&self) -> Result<i16> {
        let p = self.expect(FieldType::NumI16)?;
        self.file.i16_at(p.val_data)
    }

    pub fn i32_value(&self) -> Result<i32> {
        let p = self.expect(FieldType::NumI32)?;
        self.file.i32_at(p.val_data)
    }

    pub fn i64_value(&self) -> Result<i64> {
        let p = self.expect(FieldType::NumI64)?;
        self.file.i64_at(p.val_data)
    }

    pub fn float_value(&self) -> Result<f32> {
        let p = self.expect(FieldType::NumFloat)?;
        self.file.f32_at(p.val_data)
    }

    /// Read any unsigned width; `None` for a null value.
    pub fn unsigned_value(&self) -> Result<Option<u64>> {
        let p = self.current()?;
        unsigned_at(self.file, p.val_ty, p.val_data)
    }

    /// Read any signed width; `None` for a null value.
    pub fn signed_value(&self) -> Result<Option<i64>> {
        let p = self.current()?;
        signed_at(self.file, p.val_ty, p.val_data)
    }

    /// Read a float; `None` for a null value.
    pub fn float_or_null(&self) -> Result<Option<f32>> {
        let p = self.current()?;
        float_at(self.file, p.val_ty, p.val_data)
    }

    pub fn string_value(&self) -> Result<&str> {
        let p = self.expect(FieldType::String)?;
        string_at(self.file, p.val_data)
    }

    pub fn binary_value(&self) -> Result<BinaryValue<'_>> {
        let p = self.current()?;
        binary_at(self.file, p.val_ty, p.val_data)
    }

    fn expect(&self, ty: FieldType) -> Result<Prop> {
        let p = self.current()?;
        if p.val_ty != ty {
            return Err(ColsonError::TypeMismatch(format!(
                "{:?} expected, found {:?}",
                ty, p.val_ty
            )));
        }
        Ok(p)
    }

    // ── Nested descent ─────────────────────────────────────────────

    /// Descend into the current property's array value.
    pub fn array_value(&mut self) -> Result<ArrayIter<'_>> {
        let p = self.current()?;
        if !p.val_ty.is_array_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "array expected, found {:?}",
                p.val_ty
            )));
        }
        ArrayIter::new(&mut *self.file, p.val_begin)
    }

    /// Descend into the current property's object value.
    pub fn object_value(&mut self) -> Result<ObjectIter<'_>> {
        let p = self.current()?;
        if !p.val_ty.is_object_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "object expected, found {:?}",
                p.val_ty
            )));
        }
        ObjectIter::new(&mut *self.file, p.val_begin)
    }

    /// Descend into the current property's column value.
    pub fn column_value(&mut self) -> Result<ColumnIter<'_>> {
        let p = self.current()?;
        if !p.val_ty.is_column_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "column expected, found {:?}",
                p.val_ty
            )));
        }
        ColumnIter::new(&mut *self.file, p.val_begin)
    }

    // ── Abstract type ──────────────────────────────────────────────

    pub fn is_multimap(&self) -> bool {
        !self.derivation.class().is_distinct()
    }

    pub fn is_sorted(&self) -> bool {
        self.derivation.class().is_sorted()
    }

    pub fn map_derivation(&self) -> MapDerivation {
        self.derivation
    }

    /// Rewrite the opener byte in place with a new abstract subtype.
    pub fn update_type(&mut self, derivation: MapDerivation) -> Result<()> {
        let opener = derive_map(derivation.class())?;
        self.file.write_at(self.begin, &[opener.marker()])?;
        self.derivation = derivation;
        Ok(())
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Remove the current `(key, value)` pair, shifting the tail left.
    pub fn remove(&mut self) -> Result<()> {
        let p = self.current()?;
        let len = (self.pos - p.begin) as usize;
        self.file.seek(p.begin)?;
        self.file.inplace_remove(len)?;
        self.history.pop();
        self.prop = None;
        self.pos = p.begin;
        Ok(())
    }

    /// Open an insert scope before the current pair (or at the end marker
    /// once the end was reached).
    pub fn insert_begin(&mut self) -> Inserter<'_, 'f> {
        Inserter::for_object(self)
    }

    // ── Value updates ──────────────────────────────────────────────

    /// Replace the current pair, keeping its key, with whatever `f`
    /// inserts under that key.
    fn replace_value_with(
        &mut self,
        f: impl FnOnce(&mut Inserter<'_, '_>, &str) -> Result<()>,
    ) -> Result<()> {
        let key = self.prop_name()?.to_string();
        self.remove()?;
        self.next()?;
        let mut ins = self.insert_begin();
        f(&mut ins, &key)
    }

    /// Set the current property's value to null, replacing the value field
    /// if it is not already a null marker.
    pub fn update_null(&mut self) -> Result<()> {
        match self.current()?.val_ty {
            FieldType::Null => Ok(()),
            _ => self.replace_value_with(|ins, key| ins.prop_null(key)),
        }
    }

    pub fn update_true(&mut self) -> Result<()> {
        let p = self.current()?;
        match p.val_ty {
            FieldType::True => Ok(()),
            FieldType::False => {
                self.file.write_at(p.val_begin, &[MARKER_TRUE])?;
                self.prop = Some(Prop {
                    val_ty: FieldType::True,
                    ..p
                });
                Ok(())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_true(key)),
        }
    }

    pub fn update_false(&mut self) -> Result<()> {
        let p = self.current()?;
        match p.val_ty {
            FieldType::False => Ok(()),
            FieldType::True => {
                self.file.write_at(p.val_begin, &[MARKER_FALSE])?;
                self.prop = Some(Prop {
                    val_ty: FieldType::False,
                    ..p
                });
                Ok(())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_false(key)),
        }
    }

    pub fn update_u8(&mut self, value: u8) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumU8 => self.file.write_at(p.val_data, &[value]),
            _ => self.replace_value_with(|ins, key| ins.prop_u8(key, value)),
        }
    }

    pub fn update_u16(&mut self, value: u16) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumU16 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_u16(key, value)),
        }
    }

    pub fn update_u32(&mut self, value: u32) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumU32 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_u32(key, value)),
        }
    }

    pub fn update_u64(&mut self, value: u64) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumU64 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_u64(key, value)),
        }
    }

    pub fn update_i8(&mut self, value: i8) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumI8 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_i8(key, value)),
        }
    }

    pub fn update_i16(&mut self, value: i16) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumI16 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_i16(key, value)),
        }
    }

    pub fn update_i32(&mut self, value: i32) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumI32 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_i32(key, value)),
        }
    }

    pub fn update_i64(&mut self, value: i64) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumI64 => {
                self.file.write_at(p.val_data, &value.to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_i64(key, value)),
        }
    }

    pub fn update_float(&mut self, value: f32) -> Result<()> {
        match self.current()? {
            p if p.val_ty == FieldType::NumFloat => {
                self.file.write_at(p.val_data, &value.to_bits().to_le_bytes())
            }
            _ => self.replace_value_with(|ins, key| ins.prop_float(key, value)),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::document::{Document, RecordKey};
    use crate::error::Result;
    use crate::insert::Inserter;
    use crate::marker::{ColumnType, FieldType, MapDerivation, MARKER_OBJECT_END};

    fn object_doc(fill: impl FnOnce(&mut Inserter<'_, '_>) -> Result<()>) -> Document {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(|ins| ins.insert_object(0, fill)).unwrap();
        doc
    }

    #[test]
    fn test_pairwise_iteration() {
        let mut doc = object_doc(|obj| {
            obj.prop_u8("a", 1)?;
            obj.prop_string("b", "two")?;
            obj.prop_null("c")
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();

        assert!(it.next().unwrap());
        assert_eq!(it.prop_name().unwrap(), "a");
        assert_eq!(it.prop_type().unwrap(), FieldType::NumU8);
        assert_eq!(it.unsigned_value().unwrap(), Some(1));

        assert!(it.next().unwrap());
        assert_eq!(it.prop_name().unwrap(), "b");
        assert_eq!(it.string_value().unwrap(), "two");

        assert!(it.next().unwrap());
        assert_eq!(it.prop_name().unwrap(), "c");
        assert!(it.is_null().unwrap());

        assert!(!it.next().unwrap());
        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_end_marker_offset() {
        let mut doc = object_doc(|obj| {
            obj.prop_u8("a", 1)?;
            obj.prop_u8("b", 2)
        });
        let bytes = doc.as_bytes().to_vec();
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        it.fast_forward().unwrap();
        let end = it.end_offset().unwrap();
        assert_eq!(bytes[end as usize], MARKER_OBJECT_END);
    }

    #[test]
    fn test_nested_values() {
        let mut doc = object_doc(|obj| {
            obj.prop_object("inner", 0, |o| o.prop_true("flag"))?;
            obj.prop_array("list", 0, |a| {
                a.insert_u8(1)?;
                a.insert_u8(2)
            })?;
            obj.prop_column("col", ColumnType::I16, 2, |c| c.insert_i16(-3))
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();

        it.next().unwrap();
        {
            let mut sub = it.object_value().unwrap();
            assert!(sub.next().unwrap());
            assert_eq!(sub.prop_name().unwrap(), "flag");
            assert!(sub.bool_value().unwrap());
        }

        it.next().unwrap();
        {
            let mut sub = it.array_value().unwrap();
            let mut seen = Vec::new();
            while sub.next().unwrap() {
                seen.push(sub.u8_value().unwrap());
            }
            assert_eq!(seen, vec![1, 2]);
        }

        it.next().unwrap();
        {
            let sub = it.column_value().unwrap();
            assert_eq!(sub.values_info(), (ColumnType::I16, 1));
            assert_eq!(sub.i16_value(0).unwrap(), -3);
        }

        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_remove_pair() {
        let mut doc = object_doc(|obj| {
            obj.prop_u8("a", 1)?;
            obj.prop_u8("b", 2)?;
            obj.prop_u8("c", 3)
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        it.next().unwrap();
        it.next().unwrap(); // at "b"
        it.remove().unwrap();

        it.rewind().unwrap();
        let mut keys = Vec::new();
        while it.next().unwrap() {
            keys.push(it.prop_name().unwrap().to_string());
        }
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_update_value_in_place() {
        let mut doc = object_doc(|obj| obj.prop_u8("n", 7));
        let before = doc.len();
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        it.next().unwrap();
        it.update_u8(8).unwrap();
        assert_eq!(it.unsigned_value().unwrap(), Some(8));
        drop(it);
        drop(body);
        assert_eq!(doc.len(), before);
    }

    #[test]
    fn test_update_value_replace_keeps_key() {
        let mut doc = object_doc(|obj| {
            obj.prop_string("n", "old")?;
            obj.prop_u8("m", 1)
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        it.next().unwrap();
        it.update_i64(-1).unwrap();
        drop(it);
        drop(body);

        assert_eq!(doc.to_json().unwrap(), r#"{"n":-1,"m":1}"#);
    }

    #[test]
    fn test_duplicate_keys_kept_in_document_order() {
        let mut doc = object_doc(|obj| {
            obj.prop_u8("k", 1)?;
            obj.prop_u8("k", 2)
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        let mut values = Vec::new();
        while it.next().unwrap() {
            assert_eq!(it.prop_name().unwrap(), "k");
            values.push(it.unsigned_value().unwrap().unwrap());
        }
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_update_type_rewrites_opener() {
        let mut doc = object_doc(|obj| obj.prop_u8("a", 1));
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut it = body.object_value().unwrap();
        assert!(it.is_multimap());
        it.update_type(MapDerivation::SortedMap).unwrap();
        assert!(!it.is_multimap());
        assert!(it.is_sorted());
    }
}
