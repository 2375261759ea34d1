//! Read/write iterator over array containers.

use crate::error::{ColsonError, Result};
use crate::insert::Inserter;
use crate::iter::{
    binary_at, bool_at, float_at, signed_at, skip_empty, skip_field_body, string_at, unsigned_at,
    BinaryValue, ColumnIter, ObjectIter,
};
use crate::marker::{
    derive_list, FieldType, ListContainer, ListDerivation, MARKER_ARRAY_END, MARKER_FALSE,
    MARKER_TRUE,
};
use crate::memfile::MemFile;

/// The field the iterator currently points at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Field {
    pub(crate) ty: FieldType,
    /// Offset of the field's marker byte.
    pub(crate) begin: u64,
    /// Offset of the field's payload.
    pub(crate) data: u64,
}

/// Stateful reader over an array container.
///
/// `next()` advances field by field; typed accessors are valid while the
/// iterator points at a field. Reading the end marker parks the iterator
/// there until `rewind()` or `prev()`.
pub struct ArrayIter<'f> {
    pub(crate) file: &'f mut MemFile,
    pub(crate) begin: u64,
    pub(crate) derivation: ListDerivation,
    /// Next read position.
    pub(crate) pos: u64,
    /// Marker offsets of the fields visited since the last rewind.
    pub(crate) history: Vec<u64>,
    pub(crate) field: Option<Field>,
    pub(crate) end_reached: bool,
    pub(crate) record_body: bool,
}

impl<'f> ArrayIter<'f> {
    /// Open an iterator at an array opener marker.
    pub(crate) fn new(file: &'f mut MemFile, begin: u64) -> Result<Self> {
        Self::create(file, begin, false)
    }

    /// Open an iterator over the document's record body array.
    pub(crate) fn new_record_body(file: &'f mut MemFile, begin: u64) -> Result<Self> {
        Self::create(file, begin, true)
    }

    fn create(file: &'f mut MemFile, begin: u64, record_body: bool) -> Result<Self> {
        let marker = file.u8_at(begin)?;
        let derivation = match FieldType::from_marker(marker) {
            Some(FieldType::Array(d)) => d,
            _ => {
                return Err(ColsonError::MalformedDocument(format!(
                    "array opener expected at offset {}, found {:#04x}",
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
            field: None,
            end_reached: false,
            record_body,
        })
    }

    /// Offset of the array's opener marker.
    pub fn begin_offset(&self) -> u64 {
        self.begin
    }

    // ── Cursor movement ────────────────────────────────────────────

    /// Advance to the next field. Returns `false` once the end marker is
    /// reached.
    pub fn next(&mut self) -> Result<bool> {
        if self.end_reached {
            return Ok(false);
        }
        self.file.seek(self.pos)?;
        skip_empty(self.file)?;
        let marker_off = self.file.tell();
        let byte = self.file.read_byte()?;
        if byte == MARKER_ARRAY_END {
            self.end_reached = true;
            self.pos = marker_off;
            self.field = None;
            return Ok(false);
        }
        let ty = FieldType::from_marker(byte).ok_or_else(|| {
            ColsonError::MalformedDocument(format!(
                "unknown marker {:#04x} at offset {}",
                byte, marker_off
            ))
        })?;
        let data = self.file.tell();
        skip_field_body(self.file, ty)?;
        self.pos = self.file.tell();
        self.history.push(marker_off);
        self.field = Some(Field {
            ty,
            begin: marker_off,
            data,
        });
        Ok(true)
    }

    /// Whether another field follows, without advancing.
    pub fn has_next(&mut self) -> Result<bool> {
        let saved = self.save_state();
        let result = self.next();
        self.restore_state(saved);
        result
    }

    /// Step back to the previous field. Returns `false` when there is no
    /// previous field (the iterator is then rewound).
    pub fn prev(&mut self) -> Result<bool> {
        if self.field.is_some() {
            self.history.pop();
        }
        self.end_reached = false;
        self.field = None;
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

    /// Reposition at the beginning of the array.
    pub fn rewind(&mut self) -> Result<()> {
        self.pos = self.begin + 1;
        self.history.clear();
        self.field = None;
        self.end_reached = false;
        Ok(())
    }

    /// Advance to the end marker without exposing the fields in between.
    pub fn fast_forward(&mut self) -> Result<()> {
        while self.next()? {}
        Ok(())
    }

    /// Offset of the current field's marker, or of the next read position
    /// when no field is current.
    pub fn tell(&self) -> u64 {
        self.field.map(|f| f.begin).unwrap_or(self.pos)
    }

    /// Offset of the array's end marker. Valid once the end was reached.
    pub fn end_offset(&self) -> Result<u64> {
        if self.end_reached {
            Ok(self.pos)
        } else {
            Err(ColsonError::IllegalState(
                "array end not reached".into(),
            ))
        }
    }

    fn save_state(&self) -> (u64, bool, Option<Field>, usize) {
        (self.pos, self.end_reached, self.field, self.history.len())
    }

    fn restore_state(&mut self, saved: (u64, bool, Option<Field>, usize)) {
        self.pos = saved.0;
        self.end_reached = saved.1;
        self.field = saved.2;
        self.history.truncate(saved.3);
    }

    /// Called when an inserter scoped to this iterator drops: forget
    /// everything at or after the insertion point and resume there.
    pub(crate) fn reposition(&mut self, at: u64) {
        self.pos = at;
        self.field = None;
        self.end_reached = false;
        while self.history.last().is_some_and(|&off| off >= at) {
            self.history.pop();
        }
    }

    // ── Field access ───────────────────────────────────────────────

    pub(crate) fn current(&self) -> Result<Field> {
        self.field.ok_or_else(|| {
            ColsonError::IllegalState("iterator does not point at a field".into())
        })
    }

    pub fn field_type(&self) -> Result<FieldType> {
        Ok(self.current()?.ty)
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(self.current()?.ty == FieldType::Null)
    }

    pub fn bool_value(&self) -> Result<bool> {
        bool_at(self.current()?.ty)
    }

    pub fn u8_value(&self) -> Result<u8> {
        let f = self.expect(FieldType::NumU8)?;
        self.file.u8_at(f.data)
    }

    pub fn u16_value(&self) -> Result<u16> {
        let f = self.expect(FieldType::NumU16)?;
        self.file.u16_at(f.data)
    }

    pub fn u32_value(&self) -> Result<u32> {
        let f = self.expect(FieldType::NumU32)?;
        self.file.u32_at(f.data)
    }

    pub fn u64_value(&self) -> Result<u64> {
        let f = self.expect(FieldType::NumU64)?;
        self.file.u64_at(f.data)
    }

    pub fn i8_value(&self) -> Result<i8> {
        let f = self.expect(FieldType::NumI8)?;
        self.file.i8_at(f.data)
    }

    pub fn i16_value(&self) -> Result<i16> {
        let f = self.expect(FieldType::NumI16)?;
        self.file.i16_at(f.data)
    }

    pub fn i32_value(&self) -> Result<i32> {
        let f = self.expect(FieldType::NumI32)?;
        self.file.i32_at(f.data)
    }

    pub fn i64_value(&self) -> Result<i64> {
        let f = self.expect(FieldType::NumI64)?;
        self.file.i64_at(f.data)
    }

    pub fn float_value(&self) -> Result<f32> {
        let f = self.expect(FieldType::NumFloat)?;
        self.file.f32_at(f.data)
    }

    /// Read any unsigned width; `None` for a null field.
    pub fn unsigned_value(&self) -> Result<Option<u64>> {
        let f = self.current()?;
        unsigned_at(self.file, f.ty, f.data)
    }

    /// Read any signed width; `None` for a null field.
    pub fn signed_value(&self) -> Result<Option<i64>> {
        let f = self.current()?;
        signed_at(self.file, f.ty, f.data)
    }

    /// Read a float; `None` for a null field.
    pub fn float_or_null(&self) -> Result<Option<f32>> {
        let f = self.current()?;
        float_at(self.file, f.ty, f.data)
    }

    pub fn string_value(&self) -> Result<&str> {
        let f = self.expect(FieldType::String)?;
        string_at(self.file, f.data)
    }

    pub fn binary_value(&self) -> Result<BinaryValue<'_>> {
        let f = self.current()?;
        binary_at(self.file, f.ty, f.data)
    }

    fn expect(&self, ty: FieldType) -> Result<Field> {
        let f = self.current()?;
        if f.ty != ty {
            return Err(ColsonError::TypeMismatch(format!(
                "{:?} expected, found {:?}",
                ty, f.ty
            )));
        }
        Ok(f)
    }

    // ── Nested descent ─────────────────────────────────────────────

    /// Descend into the current array field. The parent is frozen until
    /// the returned iterator is dropped.
    pub fn array_value(&mut self) -> Result<ArrayIter<'_>> {
        let f = self.current()?;
        if !f.ty.is_array_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "array expected, found {:?}",
                f.ty
            )));
        }
        ArrayIter::new(&mut *self.file, f.begin)
    }

    /// Descend into the current object field.
    pub fn object_value(&mut self) -> Result<ObjectIter<'_>> {
        let f = self.current()?;
        if !f.ty.is_object_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "object expected, found {:?}",
                f.ty
            )));
        }
        ObjectIter::new(&mut *self.file, f.begin)
    }

    /// Descend into the current column field.
    pub fn column_value(&mut self) -> Result<ColumnIter<'_>> {
        let f = self.current()?;
        if !f.ty.is_column_or_subtype() {
            return Err(ColsonError::TypeMismatch(format!(
                "column expected, found {:?}",
                f.ty
            )));
        }
        ColumnIter::new(&mut *self.file, f.begin)
    }

    // ── Abstract type ──────────────────────────────────────────────

    /// True iff this is the record body's top-level array and it holds
    /// exactly one field.
    pub fn is_unit(&mut self) -> Result<bool> {
        if !self.record_body {
            return Ok(false);
        }
        let saved = (self.save_state(), self.history.clone());
        self.rewind()?;
        let first = self.next()?;
        let second = first && self.next()?;
        self.history = saved.1;
        self.restore_state(saved.0);
        Ok(first && !second)
    }

    pub fn is_multiset(&self) -> bool {
        self.derivation.class().is_multiset()
    }

    pub fn is_sorted(&self) -> bool {
        self.derivation.class().is_sorted()
    }

    pub fn list_derivation(&self) -> ListDerivation {
        self.derivation
    }

    /// Rewrite the opener byte in place with a new abstract subtype.
    pub fn update_type(&mut self, derivation: ListDerivation) -> Result<()> {
        let opener = derive_list(ListContainer::Array, derivation.class())?;
        self.file.write_at(self.begin, &[opener.marker()])?;
        self.derivation = derivation;
        Ok(())
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Remove the current field, shifting the tail left. The iterator is
    /// left before the slot; the following field moves into it.
    pub fn remove(&mut self) -> Result<()> {
        let f = self.current()?;
        let len = (self.pos - f.begin) as usize;
        self.file.seek(f.begin)?;
        self.file.inplace_remove(len)?;
        self.history.pop();
        self.field = None;
        self.pos = f.begin;
        Ok(())
    }

    /// Open an insert scope before the current field (or at the end marker
    /// once the end was reached).
    pub fn insert_begin(&mut self) -> Inserter<'_, 'f> {
        Inserter::for_array(self)
    }

    // ── In-place updates ───────────────────────────────────────────

    /// Replace the current field with whatever `f` inserts.
    fn replace_with(
        &mut self,
        f: impl FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    ) -> Result<()> {
        self.remove()?;
        self.next()?;
        let mut ins = self.insert_begin();
        f(&mut ins)
    }

    /// Set the current field to null, replacing the field if it is not
    /// already a null marker.
    pub fn update_null(&mut self) -> Result<()> {
        match self.current()?.ty {
            FieldType::Null => Ok(()),
            _ => self.replace_with(|ins| ins.insert_null()),
        }
    }

    pub fn update_true(&mut self) -> Result<()> {
        let f = self.current()?;
        match f.ty {
            FieldType::True => Ok(()),
            FieldType::False => {
                self.file.write_at(f.begin, &[MARKER_TRUE])?;
                self.field = Some(Field {
                    ty: FieldType::True,
                    ..f
                });
                Ok(())
            }
            _ => self.replace_with(|ins| ins.insert_true()),
        }
    }

    pub fn update_false(&mut self) -> Result<()> {
        let f = self.current()?;
        match f.ty {
            FieldType::False => Ok(()),
            FieldType::True => {
                self.file.write_at(f.begin, &[MARKER_FALSE])?;
                self.field = Some(Field {
                    ty: FieldType::False,
                    ..f
                });
                Ok(())
            }
            _ => self.replace_with(|ins| ins.insert_false()),
        }
    }

    pub fn update_u8(&mut self, value: u8) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumU8 => self.file.write_at(f.data, &[value]),
            _ => self.replace_with(|ins| ins.insert_u8(value)),
        }
    }

    pub fn update_u16(&mut self, value: u16) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumU16 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_u16(value)),
        }
    }

    pub fn update_u32(&mut self, value: u32) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumU32 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_u32(value)),
        }
    }

    pub fn update_u64(&mut self, value: u64) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumU64 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_u64(value)),
        }
    }

    pub fn update_i8(&mut self, value: i8) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumI8 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_i8(value)),
        }
    }

    pub fn update_i16(&mut self, value: i16) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumI16 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_i16(value)),
        }
    }

    pub fn update_i32(&mut self, value: i32) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumI32 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_i32(value)),
        }
    }

    pub fn update_i64(&mut self, value: i64) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumI64 => self.file.write_at(f.data, &value.to_le_bytes()),
            _ => self.replace_with(|ins| ins.insert_i64(value)),
        }
    }

    pub fn update_float(&mut self, value: f32) -> Result<()> {
        match self.current()? {
            f if f.ty == FieldType::NumFloat => {
                self.file.write_at(f.data, &value.to_bits().to_le_bytes())
            }
            _ => self.replace_with(|ins| ins.insert_float(value)),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::document::{Document, RecordKey};
    use crate::error::Result;
    use crate::insert::Inserter;
    use crate::marker::{ColumnType, FieldType, ListDerivation};

    fn doc_with(fill: impl FnOnce(&mut Inserter<'_, '_>) -> Result<()>) -> Document {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(fill).unwrap();
        doc
    }

    #[test]
    fn test_next_visits_every_inserted_field() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(2)?;
            ins.insert_u8(3)?;
            ins.insert_u8(4)?;
            ins.insert_u8(5)
        });
        let mut it = doc.body().unwrap();
        let mut count = 0;
        while it.next().unwrap() {
            count += 1;
        }
        assert_eq!(count, 5);
        // Parked at the end marker; further calls stay there.
        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_typed_accessors() {
        let mut doc = doc_with(|ins| {
            ins.insert_null()?;
            ins.insert_true()?;
            ins.insert_false()?;
            ins.insert_u16(700)?;
            ins.insert_i32(-9)?;
            ins.insert_float(2.5)?;
            ins.insert_string("hi")
        });
        let mut it = doc.body().unwrap();

        it.next().unwrap();
        assert!(it.is_null().unwrap());
        assert_eq!(it.unsigned_value().unwrap(), None);

        it.next().unwrap();
        assert!(it.bool_value().unwrap());
        it.next().unwrap();
        assert!(!it.bool_value().unwrap());

        it.next().unwrap();
        assert_eq!(it.u16_value().unwrap(), 700);
        assert_eq!(it.unsigned_value().unwrap(), Some(700));

        it.next().unwrap();
        assert_eq!(it.i32_value().unwrap(), -9);
        assert_eq!(it.signed_value().unwrap(), Some(-9));

        it.next().unwrap();
        assert_eq!(it.float_value().unwrap(), 2.5);

        it.next().unwrap();
        assert_eq!(it.string_value().unwrap(), "hi");
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let mut doc = doc_with(|ins| ins.insert_string("x"));
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        let err = it.u8_value().unwrap_err();
        assert!(err.to_string().contains("Type mismatch"));
        // No partial read: the field is still intact.
        assert_eq!(it.string_value().unwrap(), "x");
    }

    #[test]
    fn test_accessor_without_field_is_illegal_state() {
        let mut doc = doc_with(|ins| ins.insert_u8(1));
        let it = doc.body().unwrap();
        assert!(it.field_type().is_err());
    }

    #[test]
    fn test_nested_descent_and_parent_resume() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_array(0, |arr| {
                arr.insert_u8(2)?;
                arr.insert_u8(3)
            })?;
            ins.insert_object(0, |obj| obj.prop_u8("k", 4))?;
            ins.insert_column(ColumnType::U8, 2, |col| col.insert_u8(9))
        });
        let mut it = doc.body().unwrap();

        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 1);

        it.next().unwrap();
        {
            let mut sub = it.array_value().unwrap();
            assert!(sub.next().unwrap());
            assert_eq!(sub.u8_value().unwrap(), 2);
            assert!(sub.next().unwrap());
            assert_eq!(sub.u8_value().unwrap(), 3);
            assert!(!sub.next().unwrap());
        }

        it.next().unwrap();
        {
            let mut sub = it.object_value().unwrap();
            assert!(sub.next().unwrap());
            assert_eq!(sub.prop_name().unwrap(), "k");
            assert_eq!(sub.unsigned_value().unwrap(), Some(4));
        }

        it.next().unwrap();
        {
            let sub = it.column_value().unwrap();
            assert_eq!(sub.values_info(), (ColumnType::U8, 1));
            assert_eq!(sub.u8_value(0).unwrap(), 9);
        }

        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_prev_and_rewind() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(2)?;
            ins.insert_u8(3)
        });
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.next().unwrap();
        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 3);

        assert!(it.prev().unwrap());
        assert_eq!(it.u8_value().unwrap(), 2);
        assert!(it.prev().unwrap());
        assert_eq!(it.u8_value().unwrap(), 1);
        assert!(!it.prev().unwrap());

        it.rewind().unwrap();
        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 1);
    }

    #[test]
    fn test_has_next_does_not_advance() {
        let mut doc = doc_with(|ins| ins.insert_u8(1));
        let mut it = doc.body().unwrap();
        assert!(it.has_next().unwrap());
        assert!(it.has_next().unwrap());
        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 1);
        assert!(!it.has_next().unwrap());
        assert_eq!(it.u8_value().unwrap(), 1);
    }

    #[test]
    fn test_fast_forward_lands_on_end_marker() {
        let mut doc = doc_with(|ins| {
            ins.insert_string("abc")?;
            ins.insert_array(0, |arr| arr.insert_u8(1))
        });
        let mut it = doc.body().unwrap();
        it.fast_forward().unwrap();
        let end = it.end_offset().unwrap();
        assert_eq!(
            doc.as_bytes()[end as usize],
            crate::marker::MARKER_ARRAY_END
        );
    }

    #[test]
    fn test_remove_middle_field() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(2)?;
            ins.insert_u8(3)
        });
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.next().unwrap();
        it.remove().unwrap();

        it.rewind().unwrap();
        let mut seen = Vec::new();
        while it.next().unwrap() {
            seen.push(it.u8_value().unwrap());
        }
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn test_update_in_place_keeps_size() {
        let mut doc = doc_with(|ins| {
            ins.insert_u32(10)?;
            ins.insert_u32(20)
        });
        let before = doc.len();
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.update_u32(99).unwrap();
        assert_eq!(it.u32_value().unwrap(), 99);
        drop(it);
        assert_eq!(doc.len(), before);
    }

    #[test]
    fn test_update_replaces_mismatched_type() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(2)?;
            ins.insert_u8(3)
        });
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.next().unwrap();
        it.update_i32(-5).unwrap();
        drop(it);

        let mut it = doc.body().unwrap();
        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 1);
        it.next().unwrap();
        assert_eq!(it.field_type().unwrap(), FieldType::NumI32);
        assert_eq!(it.i32_value().unwrap(), -5);
        it.next().unwrap();
        assert_eq!(it.u8_value().unwrap(), 3);
        assert!(!it.next().unwrap());
    }

    #[test]
    fn test_update_true_false_marker_swap() {
        let mut doc = doc_with(|ins| ins.insert_false());
        let before = doc.len();
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.update_true().unwrap();
        assert!(it.bool_value().unwrap());
        it.update_false().unwrap();
        assert!(!it.bool_value().unwrap());
        drop(it);
        assert_eq!(doc.len(), before);
    }

    #[test]
    fn test_insert_before_current_field() {
        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(3)
        });
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        it.next().unwrap(); // at 3
        {
            let mut ins = it.insert_begin();
            ins.insert_u8(2).unwrap();
        }
        it.rewind().unwrap();
        let mut seen = Vec::new();
        while it.next().unwrap() {
            seen.push(it.u8_value().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_is_unit() {
        let mut doc = doc_with(|ins| ins.insert_object(0, |_| Ok(())));
        let mut it = doc.body().unwrap();
        assert!(it.is_unit().unwrap());
        drop(it);

        let mut doc = doc_with(|ins| {
            ins.insert_u8(1)?;
            ins.insert_u8(2)
        });
        let mut it = doc.body().unwrap();
        assert!(!it.is_unit().unwrap());
    }

    #[test]
    fn test_is_unit_preserves_position() {
        let mut doc = doc_with(|ins| ins.insert_object(0, |_| Ok(())));
        let mut it = doc.body().unwrap();
        it.next().unwrap();
        assert!(it.is_unit().unwrap());
        // Still pointing at the object after the probe.
        assert!(it.field_type().unwrap().is_object_or_subtype());
    }

    #[test]
    fn test_update_type_rewrites_opener() {
        let mut doc = doc_with(|ins| ins.insert_u8(1));
        let mut it = doc.body().unwrap();
        assert!(it.is_multiset());
        assert!(!it.is_sorted());
        it.update_type(ListDerivation::SortedSet).unwrap();
        assert!(!it.is_multiset());
        assert!(it.is_sorted());
        drop(it);

        // Reopening reads the new abstract subtype from the wire.
        let it = doc.body().unwrap();
        assert_eq!(it.list_derivation(), ListDerivation::SortedSet);
    }

    #[test]
    fn test_unknown_marker_is_malformed() {
        let doc = doc_with(|ins| ins.insert_u8(1));
        let mut bytes = doc.as_bytes().to_vec();
        // Clobber the field marker with an unassigned byte.
        let body = bytes.len() - 4; // opener, marker, value, end
        bytes[body + 1] = 0xEE;
        let mut broken = crate::memfile::MemFile::from_vec(bytes);
        let mut it = super::ArrayIter::new(&mut broken, body as u64).unwrap();
        let err = it.next().unwrap_err();
        assert!(err.to_string().contains("unknown marker"));
    }
}
