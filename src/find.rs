//! Typed result handle for dot-path lookups.

use crate::document::Document;
use crate::error::{ColsonError, Result};
use crate::iter::{binary_at, string_at, ArrayIter, BinaryValue, ColumnIter, ObjectIter};
use crate::layout::slot_is_null;
use crate::marker::{ColumnType, FieldType};
use crate::path::{evaluate, DotPath, PathStatus, Target};
use crate::printer::{self, Printer};

/// Where the resolved value lives and how to read it.
#[derive(Debug, Clone, Copy)]
enum FindValue {
    /// A leaf field inside an array or object.
    Leaf { ty: FieldType, data_off: u64 },
    /// A container field.
    Container { ty: FieldType, begin: u64 },
    /// A slot of a column.
    ColumnSlot {
        column_begin: u64,
        elem_ty: ColumnType,
        slot_off: u64,
        index: u64,
    },
}

/// Result handle of a dot-path lookup against a document.
///
/// Typed getters reject shapes that do not match with a type-mismatch
/// error; `status()` reports why an unresolved lookup missed.
pub struct Find<'d> {
    doc: &'d mut Document,
    status: PathStatus,
    value: Option<FindValue>,
}

impl<'d> Find<'d> {
    pub(crate) fn create(doc: &'d mut Document, path: &DotPath) -> Result<Find<'d>> {
        let body = doc.body_offset();
        let eval = evaluate(doc.file_mut(), body, path)?;
        let value = match eval.target {
            Some(target) => Some(Self::snapshot(doc, target)?),
            None => None,
        };
        Ok(Find {
            doc,
            status: eval.status,
            value,
        })
    }

    /// Turn a resolved target into offsets that survive until the next
    /// mutation of the document.
    fn snapshot(doc: &mut Document, target: Target) -> Result<FindValue> {
        match target {
            Target::ArraySlot { array_begin, slot } => {
                let mut it = ArrayIter::new(doc.file_mut(), array_begin)?;
                for _ in 0..=slot {
                    if !it.next()? {
                        return Err(ColsonError::Internal(
                            "resolved array slot vanished".into(),
                        ));
                    }
                }
                let ty = it.field_type()?;
                let field = it.current()?;
                Ok(if ty.is_traversable() {
                    FindValue::Container {
                        ty,
                        begin: field.begin,
                    }
                } else {
                    FindValue::Leaf {
                        ty,
                        data_off: field.data,
                    }
                })
            }
            Target::ObjectProp { object_begin, prop } => {
                let mut it = ObjectIter::new(doc.file_mut(), object_begin)?;
                for _ in 0..=prop {
                    if !it.next()? {
                        return Err(ColsonError::Internal(
                            "resolved object property vanished".into(),
                        ));
                    }
                }
                let p = it.current()?;
                Ok(if p.val_ty.is_traversable() {
                    FindValue::Container {
                        ty: p.val_ty,
                        begin: p.val_begin,
                    }
                } else {
                    FindValue::Leaf {
                        ty: p.val_ty,
                        data_off: p.val_data,
                    }
                })
            }
            Target::ColumnSlot {
                column_begin,
                index,
            } => {
                let it = ColumnIter::new(doc.file_mut(), column_begin)?;
                let header = it.header();
                Ok(FindValue::ColumnSlot {
                    column_begin,
                    elem_ty: header.ty,
                    slot_off: header.slot_offset(index),
                    index,
                })
            }
        }
    }

    pub fn status(&self) -> PathStatus {
        self.status
    }

    pub fn has_result(&self) -> bool {
        self.status == PathStatus::Resolved
    }

    fn value(&self) -> Result<FindValue> {
        self.value.ok_or_else(|| {
            ColsonError::IllegalState(format!("path not resolved: {:?}", self.status))
        })
    }

    /// Field type of the result. Column slots report the scalar type of
    /// the slot's value (null sentinels report as null).
    pub fn field_type(&self) -> Result<FieldType> {
        Ok(match self.value()? {
            FindValue::Leaf { ty, .. } | FindValue::Container { ty, .. } => ty,
            FindValue::ColumnSlot {
                elem_ty, slot_off, ..
            } => {
                if slot_is_null(self.doc.file(), elem_ty, slot_off)? {
                    FieldType::Null
                } else {
                    match elem_ty {
                        ColumnType::U8 => FieldType::NumU8,
                        ColumnType::U16 => FieldType::NumU16,
                        ColumnType::U32 => FieldType::NumU32,
                        ColumnType::U64 => FieldType::NumU64,
                        ColumnType::I8 => FieldType::NumI8,
                        ColumnType::I16 => FieldType::NumI16,
                        ColumnType::I32 => FieldType::NumI32,
                        ColumnType::I64 => FieldType::NumI64,
                        ColumnType::Float => FieldType::NumFloat,
                        ColumnType::Boolean => {
                            if self.doc.file().u8_at(slot_off)? != 0 {
                                FieldType::True
                            } else {
                                FieldType::False
                            }
                        }
                    }
                }
            }
        })
    }

    /// Whether the result is a null value (including column null
    /// sentinels).
    pub fn is_null(&self) -> Result<bool> {
        Ok(self.field_type()?.is_null())
    }

    // ── Typed getters ──────────────────────────────────────────────

    pub fn boolean(&self) -> Result<bool> {
        match self.field_type()? {
            FieldType::True => Ok(true),
            FieldType::False => Ok(false),
            other => Err(ColsonError::TypeMismatch(format!(
                "boolean expected, found {:?}",
                other
            ))),
        }
    }

    pub fn unsigned(&self) -> Result<u64> {
        let (ty, off) = self.scalar()?;
        Ok(match ty {
            FieldType::NumU8 => self.doc.file().u8_at(off)? as u64,
            FieldType::NumU16 => self.doc.file().u16_at(off)? as u64,
            FieldType::NumU32 => self.doc.file().u32_at(off)? as u64,
            FieldType::NumU64 => self.doc.file().u64_at(off)?,
            other => {
                return Err(ColsonError::TypeMismatch(format!(
                    "unsigned number expected, found {:?}",
                    other
                )))
            }
        })
    }

    pub fn signed(&self) -> Result<i64> {
        let (ty, off) = self.scalar()?;
        Ok(match ty {
            FieldType::NumI8 => self.doc.file().i8_at(off)? as i64,
            FieldType::NumI16 => self.doc.file().i16_at(off)? as i64,
            FieldType::NumI32 => self.doc.file().i32_at(off)? as i64,
            FieldType::NumI64 => self.doc.file().i64_at(off)?,
            other => {
                return Err(ColsonError::TypeMismatch(format!(
                    "signed number expected, found {:?}",
                    other
                )))
            }
        })
    }

    pub fn float(&self) -> Result<f32> {
        let (ty, off) = self.scalar()?;
        match ty {
            FieldType::NumFloat => self.doc.file().f32_at(off),
            other => Err(ColsonError::TypeMismatch(format!(
                "float expected, found {:?}",
                other
            ))),
        }
    }

    pub fn string(&self) -> Result<&str> {
        match self.value()? {
            FindValue::Leaf { ty, data_off } if ty == FieldType::String => {
                string_at(self.doc.file(), data_off)
            }
            _ => Err(ColsonError::TypeMismatch(format!(
                "string expected, found {:?}",
                self.field_type()?
            ))),
        }
    }

    pub fn binary(&self) -> Result<BinaryValue<'_>> {
        match self.value()? {
            FindValue::Leaf { ty, data_off } if ty.is_binary() => {
                binary_at(self.doc.file(), ty, data_off)
            }
            _ => Err(ColsonError::TypeMismatch(format!(
                "binary expected, found {:?}",
                self.field_type()?
            ))),
        }
    }

    /// Scalar location for number getters. For a column slot, the scalar
    /// type is the element type of the column.
    fn scalar(&self) -> Result<(FieldType, u64)> {
        match self.value()? {
            FindValue::Leaf { ty, data_off } => Ok((ty, data_off)),
            FindValue::ColumnSlot { .. } => {
                let ty = self.field_type()?;
                let FindValue::ColumnSlot { slot_off, .. } = self.value()? else {
                    unreachable!()
                };
                Ok((ty, slot_off))
            }
            FindValue::Container { ty, .. } => Err(ColsonError::TypeMismatch(format!(
                "scalar expected, found {:?}",
                ty
            ))),
        }
    }

    // ── Container getters ──────────────────────────────────────────

    /// Iterator over the resolved array.
    pub fn array(&mut self) -> Result<ArrayIter<'_>> {
        match self.value()? {
            FindValue::Container { ty, begin } if ty.is_array_or_subtype() => {
                ArrayIter::new(self.doc.file_mut(), begin)
            }
            _ => Err(ColsonError::TypeMismatch(format!(
                "array expected, found {:?}",
                self.field_type()?
            ))),
        }
    }

    /// Iterator over the resolved object.
    pub fn object(&mut self) -> Result<ObjectIter<'_>> {
        match self.value()? {
            FindValue::Container { ty, begin } if ty.is_object_or_subtype() => {
                ObjectIter::new(self.doc.file_mut(), begin)
            }
            _ => Err(ColsonError::TypeMismatch(format!(
                "object expected, found {:?}",
                self.field_type()?
            ))),
        }
    }

    /// Iterator over the resolved column (or the column containing a
    /// resolved slot).
    pub fn column(&mut self) -> Result<ColumnIter<'_>> {
        match self.value()? {
            FindValue::Container { ty, begin } if ty.is_column_or_subtype() => {
                ColumnIter::new(self.doc.file_mut(), begin)
            }
            FindValue::ColumnSlot { column_begin, .. } => {
                ColumnIter::new(self.doc.file_mut(), column_begin)
            }
            _ => Err(ColsonError::TypeMismatch(format!(
                "column expected, found {:?}",
                self.field_type()?
            ))),
        }
    }

    /// Index of the resolved column slot, if the path ended inside a
    /// column.
    pub fn column_slot(&self) -> Result<u64> {
        match self.value()? {
            FindValue::ColumnSlot { index, .. } => Ok(index),
            _ => Err(ColsonError::TypeMismatch(
                "path did not resolve to a column slot".into(),
            )),
        }
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Render the result through a printer.
    pub fn to_json(&mut self, p: &mut dyn Printer) -> Result<()> {
        match self.value()? {
            FindValue::Leaf { ty, data_off } => {
                printer::print_leaf(self.doc.file(), p, ty, data_off)
            }
            FindValue::Container { ty, begin } => {
                printer::print_container(self.doc.file_mut(), p, ty, begin)
            }
            FindValue::ColumnSlot {
                elem_ty, slot_off, ..
            } => printer::print_column_slot(self.doc.file(), p, elem_ty, slot_off),
        }
    }
}
