//! Read/write iterator over column containers.
//!
//! Columns hold a dense fixed-width payload with separate live-count and
//! capacity counters. Slots beyond the live count are reserved space. A
//! column cannot switch markers per element, so each element type reserves
//! a null sentinel bit pattern.

use tracing::debug;

use crate::error::{ColsonError, Result};
use crate::insert::Inserter;
use crate::iter::ArrayIter;
use crate::layout::{
    self, null_sentinel_bytes, read_column_header, slot_is_null, ColumnHeader,
    BOOLEAN_COLUMN_FALSE, BOOLEAN_COLUMN_NULL, BOOLEAN_COLUMN_TRUE,
};
use crate::marker::{
    derive_list, ColumnType, FieldType, ListContainer, ListDerivation,
};
use crate::memfile::MemFile;

/// Stateful reader over a column container.
pub struct ColumnIter<'f> {
    pub(crate) file: &'f mut MemFile,
    pub(crate) begin: u64,
    pub(crate) derivation: ListDerivation,
    pub(crate) header: ColumnHeader,
    /// Set once the column was rewritten as an array; every further
    /// operation is rejected.
    promoted: bool,
}

impl<'f> ColumnIter<'f> {
    /// Open an iterator at a column opener marker.
    pub(crate) fn new(file: &'f mut MemFile, begin: u64) -> Result<Self> {
        let marker = file.u8_at(begin)?;
        let derivation = match FieldType::from_marker(marker) {
            Some(FieldType::Column(_, d)) => d,
            _ => {
                return Err(ColsonError::MalformedDocument(format!(
                    "column opener expected at offset {}, found {:#04x}",
                    begin, marker
                )))
            }
        };
        let header = read_column_header(file, begin)?;
        Ok(Self {
            file,
            begin,
            derivation,
            header,
            promoted: false,
        })
    }

    fn live(&self) -> Result<()> {
        if self.promoted {
            return Err(ColsonError::IllegalState(
                "column was promoted to an array".into(),
            ));
        }
        Ok(())
    }

    /// Offset of the column's opener marker.
    pub fn begin_offset(&self) -> u64 {
        self.begin
    }

    /// Re-read the on-wire header into the cached copy.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        self.header = read_column_header(self.file, self.begin)?;
        Ok(())
    }

    pub(crate) fn header(&self) -> ColumnHeader {
        self.header
    }

    /// Element type and live element count.
    pub fn values_info(&self) -> (ColumnType, u64) {
        (self.header.ty, self.header.num_elements)
    }

    pub fn element_type(&self) -> ColumnType {
        self.header.ty
    }

    pub fn num_elements(&self) -> u64 {
        self.header.num_elements
    }

    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    /// One past the last payload byte; where the enclosing container
    /// continues.
    pub fn end_offset(&self) -> u64 {
        self.header.payload_end()
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
        self.live()?;
        let opener = derive_list(
            ListContainer::Column(self.header.ty),
            derivation.class(),
        )?;
        self.file.write_at(self.begin, &[opener.marker()])?;
        self.derivation = derivation;
        Ok(())
    }

    // ── Slot access ────────────────────────────────────────────────

    fn check_bounds(&self, pos: u64) -> Result<()> {
        self.live()?;
        if pos >= self.header.num_elements {
            return Err(ColsonError::OutOfBounds {
                index: pos,
                len: self.header.num_elements,
            });
        }
        Ok(())
    }

    fn typed_slot(&self, ty: ColumnType, pos: u64) -> Result<u64> {
        self.check_bounds(pos)?;
        if self.header.ty != ty {
            return Err(ColsonError::TypeMismatch(format!(
                "column of {:?} expected, found {:?}",
                ty, self.header.ty
            )));
        }
        Ok(self.header.slot_offset(pos))
    }

    /// Whether slot `pos` carries the element type's null sentinel.
    pub fn value_is_null(&self, pos: u64) -> Result<bool> {
        self.check_bounds(pos)?;
        slot_is_null(self.file, self.header.ty, self.header.slot_offset(pos))
    }

    /// The live slots of a u8 column as a raw byte slice.
    pub fn u8_values(&self) -> Result<&[u8]> {
        self.live()?;
        if self.header.ty != ColumnType::U8 {
            return Err(ColsonError::TypeMismatch(format!(
                "column of U8 expected, found {:?}",
                self.header.ty
            )));
        }
        self.file
            .bytes_at(self.header.payload_offset, self.header.num_elements as usize)
    }

    /// The live slots of a boolean column as raw three-valued bytes.
    pub fn boolean_values(&self) -> Result<&[u8]> {
        self.live()?;
        if self.header.ty != ColumnType::Boolean {
            return Err(ColsonError::TypeMismatch(format!(
                "column of Boolean expected, found {:?}",
                self.header.ty
            )));
        }
        self.file
            .bytes_at(self.header.payload_offset, self.header.num_elements as usize)
    }

    pub fn u8_value(&self, pos: u64) -> Result<u8> {
        let off = self.typed_slot(ColumnType::U8, pos)?;
        self.file.u8_at(off)
    }

    pub fn u16_value(&self, pos: u64) -> Result<u16> {
        let off = self.typed_slot(ColumnType::U16, pos)?;
        self.file.u16_at(off)
    }

    pub fn u32_value(&self, pos: u64) -> Result<u32> {
        let off = self.typed_slot(ColumnType::U32, pos)?;
        self.file.u32_at(off)
    }

    pub fn u64_value(&self, pos: u64) -> Result<u64> {
        let off = self.typed_slot(ColumnType::U64, pos)?;
        self.file.u64_at(off)
    }

    pub fn i8_value(&self, pos: u64) -> Result<i8> {
        let off = self.typed_slot(ColumnType::I8, pos)?;
        self.file.i8_at(off)
    }

    pub fn i16_value(&self, pos: u64) -> Result<i16> {
        let off = self.typed_slot(ColumnType::I16, pos)?;
        self.file.i16_at(off)
    }

    pub fn i32_value(&self, pos: u64) -> Result<i32> {
        let off = self.typed_slot(ColumnType::I32, pos)?;
        self.file.i32_at(off)
    }

    pub fn i64_value(&self, pos: u64) -> Result<i64> {
        let off = self.typed_slot(ColumnType::I64, pos)?;
        self.file.i64_at(off)
    }

    pub fn float_value(&self, pos: u64) -> Result<f32> {
        let off = self.typed_slot(ColumnType::Float, pos)?;
        self.file.f32_at(off)
    }

    /// Three-valued boolean slot: `None` for the null sentinel.
    pub fn boolean_value(&self, pos: u64) -> Result<Option<bool>> {
        let off = self.typed_slot(ColumnType::Boolean, pos)?;
        Ok(match self.file.u8_at(off)? {
            BOOLEAN_COLUMN_TRUE => Some(true),
            BOOLEAN_COLUMN_FALSE => Some(false),
            BOOLEAN_COLUMN_NULL => None,
            other => {
                return Err(ColsonError::MalformedDocument(format!(
                    "invalid boolean column byte {:#04x}",
                    other
                )))
            }
        })
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Remove slot `pos`: the remaining live slots shift left and the
    /// payload tail is re-zeroed so the capacity region keeps its exact
    /// byte size.
    pub fn remove(&mut self, pos: u64) -> Result<()> {
        self.check_bounds(pos)?;
        let header = self.header;
        let size = header.ty.value_size();

        self.file.seek(header.slot_offset(pos))?;
        self.file.inplace_remove(size)?;

        // Re-open one empty slot at the end of the live region to restore
        // the capacity property.
        self.file
            .seek(header.slot_offset(header.num_elements - 1))?;
        self.file.inplace_insert(size);

        self.file.seek(header.header_offset)?;
        self.file.update_varuint(header.num_elements - 1)?;
        self.refresh()
    }

    /// Append one slot, growing the payload region when the capacity is
    /// exhausted. Used by the insert engine.
    pub(crate) fn push_slot(&mut self, slot: &[u8]) -> Result<()> {
        self.live()?;
        let header = self.header;
        let size = header.ty.value_size();
        debug_assert_eq!(slot.len(), size);

        let num = header.num_elements + 1;
        self.file.seek(header.header_offset)?;
        self.file.update_varuint(num)?;

        let mut capacity = header.capacity;
        if num > capacity {
            let new_capacity = grow_capacity(capacity);
            // Cursor sits at the capacity varuint after the count update.
            self.file.update_varuint(new_capacity)?;
            let payload_offset = self.file.tell();
            self.file
                .seek(payload_offset + capacity * size as u64)?;
            self.file
                .ensure_space((new_capacity - capacity) as usize * size);
            debug!(
                column = self.begin,
                capacity, new_capacity, "column capacity grown"
            );
            capacity = new_capacity;
        }

        let payload_offset = self.header.header_offset
            + MemFile::varuint_len(num) as u64
            + MemFile::varuint_len(capacity) as u64;
        self.file.seek(payload_offset + (num - 1) * size as u64)?;
        self.file.write(slot);
        self.refresh()
    }

    /// Open an insert scope appending to this column.
    pub fn insert_begin(&mut self) -> Inserter<'_, 'f> {
        Inserter::for_column(self)
    }

    // ── Slot updates ───────────────────────────────────────────────

    /// Write the element type's null sentinel into slot `pos` without
    /// changing the live count.
    pub fn update_set_null(&mut self, pos: u64) -> Result<()> {
        self.check_bounds(pos)?;
        let ty = self.header.ty;
        let sentinel = null_sentinel_bytes(ty);
        let off = self.header.slot_offset(pos);
        self.file.write_at(off, &sentinel[..ty.value_size()])
    }

    /// Set slot `pos` to `true`. On a non-boolean column the value is not
    /// representable, so the whole column is rewritten as an array with
    /// the update applied.
    pub fn update_set_true(&mut self, pos: u64) -> Result<()> {
        self.check_bounds(pos)?;
        if self.header.ty == ColumnType::Boolean {
            let off = self.header.slot_offset(pos);
            return self.file.write_at(off, &[BOOLEAN_COLUMN_TRUE]);
        }
        self.promote_to_array(pos, true)
    }

    /// Set slot `pos` to `false`, promoting non-boolean columns the same
    /// way as [`update_set_true`](Self::update_set_true).
    pub fn update_set_false(&mut self, pos: u64) -> Result<()> {
        self.check_bounds(pos)?;
        if self.header.ty == ColumnType::Boolean {
            let off = self.header.slot_offset(pos);
            return self.file.write_at(off, &[BOOLEAN_COLUMN_FALSE]);
        }
        self.promote_to_array(pos, false)
    }

    pub fn update_set_u8(&mut self, pos: u64, value: u8) -> Result<()> {
        let off = self.typed_slot(ColumnType::U8, pos)?;
        self.file.write_at(off, &[value])
    }

    pub fn update_set_u16(&mut self, pos: u64, value: u16) -> Result<()> {
        let off = self.typed_slot(ColumnType::U16, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_u32(&mut self, pos: u64, value: u32) -> Result<()> {
        let off = self.typed_slot(ColumnType::U32, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_u64(&mut self, pos: u64, value: u64) -> Result<()> {
        let off = self.typed_slot(ColumnType::U64, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_i8(&mut self, pos: u64, value: i8) -> Result<()> {
        let off = self.typed_slot(ColumnType::I8, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_i16(&mut self, pos: u64, value: i16) -> Result<()> {
        let off = self.typed_slot(ColumnType::I16, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_i32(&mut self, pos: u64, value: i32) -> Result<()> {
        let off = self.typed_slot(ColumnType::I32, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_i64(&mut self, pos: u64, value: i64) -> Result<()> {
        let off = self.typed_slot(ColumnType::I64, pos)?;
        self.file.write_at(off, &value.to_le_bytes())
    }

    pub fn update_set_float(&mut self, pos: u64, value: f32) -> Result<()> {
        let off = self.typed_slot(ColumnType::Float, pos)?;
        self.file.write_at(off, &value.to_bits().to_le_bytes())
    }

    // ── Column-to-array promotion ──────────────────────────────────

    /// Rewrite this column as an array carrying the same abstract class
    /// and element count, with `pending` applied to slot `pending_pos`.
    ///
    /// The replacement is built in scratch space and spliced over the
    /// column's byte span; live slots keep their values (null sentinels
    /// become null fields), only the physical layout changes.
    fn promote_to_array(&mut self, pending_pos: u64, pending: bool) -> Result<()> {
        let header = self.header;
        let class = self.derivation.class();
        let ty = header.ty;
        let size = ty.value_size();

        let mut scratch = MemFile::new();
        layout::open_array(
            &mut scratch,
            class,
            header.num_elements * size as u64,
        )?;
        {
            let mut target = ArrayIter::new(&mut scratch, 0)?;
            let mut ins = target.insert_begin();
            for i in 0..header.num_elements {
                let off = header.slot_offset(i);
                if i == pending_pos {
                    if pending {
                        ins.insert_true()?;
                    } else {
                        ins.insert_false()?;
                    }
                    continue;
                }
                if slot_is_null(self.file, ty, off)? {
                    ins.insert_null()?;
                    continue;
                }
                match ty {
                    ColumnType::U8 => ins.insert_u8(self.file.u8_at(off)?)?,
                    ColumnType::U16 => ins.insert_u16(self.file.u16_at(off)?)?,
                    ColumnType::U32 => ins.insert_u32(self.file.u32_at(off)?)?,
                    ColumnType::U64 => ins.insert_u64(self.file.u64_at(off)?)?,
                    ColumnType::I8 => ins.insert_i8(self.file.i8_at(off)?)?,
                    ColumnType::I16 => ins.insert_i16(self.file.i16_at(off)?)?,
                    ColumnType::I32 => ins.insert_i32(self.file.i32_at(off)?)?,
                    ColumnType::I64 => ins.insert_i64(self.file.i64_at(off)?)?,
                    ColumnType::Float => ins.insert_float(self.file.f32_at(off)?)?,
                    ColumnType::Boolean => {
                        match self.file.u8_at(off)? {
                            BOOLEAN_COLUMN_TRUE => ins.insert_true()?,
                            _ => ins.insert_false()?,
                        }
                    }
                }
            }
        }

        // Splice the replacement over the column's byte span.
        let old_len = header.payload_end() - self.begin;
        let new_len = scratch.len() as u64;
        self.file.seek(self.begin)?;
        if new_len > old_len {
            self.file.inplace_insert((new_len - old_len) as usize);
        } else if new_len < old_len {
            self.file.inplace_remove((old_len - new_len) as usize)?;
        }
        self.file.write(scratch.as_slice());

        debug!(
            column = self.begin,
            elements = header.num_elements,
            element_type = ?ty,
            "column promoted to array"
        );
        self.promoted = true;
        Ok(())
    }
}

/// Implementation-defined capacity growth; strictly increasing and linear
/// in the old capacity.
pub(crate) fn grow_capacity(capacity: u64) -> u64 {
    ((capacity + 1) as f64 * 1.7) as u64
}


#[cfg(test)]
mod column_tests {
    use crate::document::{Document, RecordKey};
    use crate::error::{ColsonError, Result};
    use crate::insert::Inserter;
    use crate::marker::{ColumnType, ListDerivation};

    fn column_doc(
        ty: ColumnType,
        capacity: u64,
        fill: impl FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    ) -> Document {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(|ins| ins.insert_column(ty, capacity, fill)).unwrap();
        doc
    }

    #[test]
    fn test_values_info_and_slot_reads() {
        let mut doc = column_doc(ColumnType::U16, 4, |col| {
            col.insert_u16(10)?;
            col.insert_u16(20)?;
            col.insert_null()
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let col = body.column_value().unwrap();

        assert_eq!(col.values_info(), (ColumnType::U16, 3));
        assert_eq!(col.capacity(), 4);
        assert_eq!(col.u16_value(0).unwrap(), 10);
        assert_eq!(col.u16_value(1).unwrap(), 20);
        assert!(!col.value_is_null(0).unwrap());
        assert!(col.value_is_null(2).unwrap());
    }

    #[test]
    fn test_out_of_bounds_slot() {
        let mut doc = column_doc(ColumnType::U8, 2, |col| col.insert_u8(1));
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let col = body.column_value().unwrap();
        let err = col.u8_value(1).unwrap_err();
        assert!(matches!(err, ColsonError::OutOfBounds { index: 1, len: 1 }));
    }

    #[test]
    fn test_typed_slice_access() {
        let mut doc = column_doc(ColumnType::U8, 3, |col| {
            col.insert_u8(7)?;
            col.insert_u8(8)
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let col = body.column_value().unwrap();
        assert_eq!(col.u8_values().unwrap(), &[7, 8]);
        assert!(col.boolean_values().is_err());
    }

    #[test]
    fn test_boolean_column_three_values() {
        let mut doc = column_doc(ColumnType::Boolean, 4, |col| {
            col.insert_true()?;
            col.insert_false()?;
            col.insert_null()
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let col = body.column_value().unwrap();
        assert_eq!(col.boolean_value(0).unwrap(), Some(true));
        assert_eq!(col.boolean_value(1).unwrap(), Some(false));
        assert_eq!(col.boolean_value(2).unwrap(), None);
        assert!(col.value_is_null(2).unwrap());
    }

    #[test]
    fn test_remove_shifts_and_preserves_capacity() {
        let mut doc = column_doc(ColumnType::U16, 5, |col| {
            col.insert_u16(1)?;
            col.insert_u16(2)?;
            col.insert_u16(3)
        });
        let before = doc.len();
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut col = body.column_value().unwrap();
        col.remove(1).unwrap();

        assert_eq!(col.num_elements(), 2);
        assert_eq!(col.capacity(), 5);
        assert_eq!(col.u16_value(0).unwrap(), 1);
        assert_eq!(col.u16_value(1).unwrap(), 3);
        drop(col);
        drop(body);

        // Payload region kept its exact byte size.
        assert_eq!(doc.len(), before);
        Document::from_bytes(doc.as_bytes()).unwrap();
    }

    #[test]
    fn test_update_set_null_and_back() {
        let mut doc = column_doc(ColumnType::I32, 3, |col| {
            col.insert_i32(-10)?;
            col.insert_i32(20)
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut col = body.column_value().unwrap();

        col.update_set_null(0).unwrap();
        assert!(col.value_is_null(0).unwrap());
        assert_eq!(col.num_elements(), 2);

        col.update_set_i32(0, 5).unwrap();
        assert!(!col.value_is_null(0).unwrap());
        assert_eq!(col.i32_value(0).unwrap(), 5);
    }

    #[test]
    fn test_update_set_wrong_type() {
        let mut doc = column_doc(ColumnType::U8, 2, |col| col.insert_u8(1));
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut col = body.column_value().unwrap();
        assert!(matches!(
            col.update_set_u16(0, 5).unwrap_err(),
            ColsonError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_boolean_update_set_true_false() {
        let mut doc = column_doc(ColumnType::Boolean, 2, |col| {
            col.insert_false()?;
            col.insert_null()
        });
        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let mut col = body.column_value().unwrap();
        col.update_set_true(0).unwrap();
        col.update_set_false(1).unwrap();
        assert_eq!(col.boolean_value(0).unwrap(), Some(true));
        assert_eq!(col.boolean_value(1).unwrap(), Some(false));
    }

    #[test]
    fn test_promotion_on_boolean_into_numeric_column() {
        let mut doc = column_doc(ColumnType::U8, 4, |col| {
            col.insert_u8(5)?;
            col.insert_null()
        });
        {
            let mut body = doc.body().unwrap();
            body.next().unwrap();
            let mut col = body.column_value().unwrap();
            col.update_set_false(0).unwrap();

            // The handle is stale after promotion.
            assert!(col.update_set_u8(1, 9).is_err());
        }

        // Still a structurally valid document, now holding an array.
        Document::from_bytes(doc.as_bytes()).unwrap();
        assert_eq!(doc.to_json().unwrap(), "[false,null]");
    }

    #[test]
    fn test_promotion_preserves_abstract_class() {
        let mut doc = column_doc(ColumnType::U32, 3, |col| {
            col.insert_u32(7)?;
            col.insert_u32(9)
        });
        {
            let mut body = doc.body().unwrap();
            body.next().unwrap();
            let mut col = body.column_value().unwrap();
            col.update_type(ListDerivation::SortedSet).unwrap();
            col.update_set_true(1).unwrap();
        }

        let mut body = doc.body().unwrap();
        body.next().unwrap();
        let arr = body.array_value().unwrap();
        assert_eq!(arr.list_derivation(), ListDerivation::SortedSet);
    }
}
