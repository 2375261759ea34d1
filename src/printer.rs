//! Printer visitor interface and a compact JSON implementation.
//!
//! The core drives the hooks while walking a document; the printer owns
//! the output buffer. A unit array at the record root prints its sole
//! element as the record body.

use crate::error::Result;
use crate::iter::{ArrayIter, BinaryValue, ColumnIter, ObjectIter};
use crate::layout::slot_is_null;
use crate::marker::{ColumnType, FieldType};
use crate::media;
use crate::memfile::MemFile;

/// Visitor hooks invoked while walking a document.
pub trait Printer {
    fn begin_record(&mut self);
    fn end_record(&mut self);
    fn begin_object(&mut self);
    fn end_object(&mut self);
    fn begin_array(&mut self);
    fn end_array(&mut self);
    fn prop_key(&mut self, name: &str);
    fn scalar_null(&mut self);
    fn scalar_boolean(&mut self, value: bool);
    fn scalar_unsigned(&mut self, value: u64);
    fn scalar_signed(&mut self, value: i64);
    fn scalar_float(&mut self, value: f32);
    fn scalar_string(&mut self, value: &str);
    fn scalar_binary(&mut self, value: &BinaryValue<'_>);
}

// ── Compact JSON printer ───────────────────────────────────────────

/// Renders the visited document as compact JSON (no whitespace).
#[derive(Debug, Default)]
pub struct CompactJsonPrinter {
    out: String,
    /// One entry per open container: whether a value was already emitted
    /// at that level.
    levels: Vec<bool>,
    /// Set between a key and its value so the value emits no comma.
    after_key: bool,
}

impl CompactJsonPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated output.
    pub fn finish(self) -> String {
        self.out
    }

    fn separate(&mut self) {
        if self.after_key {
            self.after_key = false;
            return;
        }
        if let Some(has_prior) = self.levels.last_mut() {
            if *has_prior {
                self.out.push(',');
            }
            *has_prior = true;
        }
    }

    fn push_escaped(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}

impl Printer for CompactJsonPrinter {
    fn begin_record(&mut self) {}

    fn end_record(&mut self) {}

    fn begin_object(&mut self) {
        self.separate();
        self.out.push('{');
        self.levels.push(false);
    }

    fn end_object(&mut self) {
        self.levels.pop();
        self.out.push('}');
    }

    fn begin_array(&mut self) {
        self.separate();
        self.out.push('[');
        self.levels.push(false);
    }

    fn end_array(&mut self) {
        self.levels.pop();
        self.out.push(']');
    }

    fn prop_key(&mut self, name: &str) {
        self.separate();
        self.push_escaped(name);
        self.out.push(':');
        self.after_key = true;
    }

    fn scalar_null(&mut self) {
        self.separate();
        self.out.push_str("null");
    }

    fn scalar_boolean(&mut self, value: bool) {
        self.separate();
        self.out.push_str(if value { "true" } else { "false" });
    }

    fn scalar_unsigned(&mut self, value: u64) {
        self.separate();
        self.out.push_str(&value.to_string());
    }

    fn scalar_signed(&mut self, value: i64) {
        self.separate();
        self.out.push_str(&value.to_string());
    }

    fn scalar_float(&mut self, value: f32) {
        self.separate();
        self.out.push_str(&value.to_string());
    }

    fn scalar_string(&mut self, value: &str) {
        self.separate();
        self.push_escaped(value);
    }

    fn scalar_binary(&mut self, value: &BinaryValue<'_>) {
        self.separate();
        self.out.push('{');
        self.out.push_str("\"type\":");
        let type_label = value
            .type_name
            .map(str::to_string)
            .or_else(|| {
                value
                    .mime_id
                    .and_then(media::mime_by_id)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        self.out.push('"');
        self.out.push_str(&type_label);
        self.out.push('"');
        self.out.push_str(",\"encoding\":\"hex\",\"value\":\"");
        for byte in value.bytes {
            self.out.push_str(&format!("{:02x}", byte));
        }
        self.out.push_str("\"}");
    }
}

// ── Traversal drivers ──────────────────────────────────────────────

/// Print a whole record: a unit array at the root prints its sole element
/// as the record body.
pub(crate) fn print_record(
    file: &mut MemFile,
    body_begin: u64,
    p: &mut dyn Printer,
) -> Result<()> {
    p.begin_record();
    let mut it = ArrayIter::new_record_body(file, body_begin)?;
    let mut unwrapped = false;
    if it.is_unit()? {
        it.next()?;
        // Only a container element stands in for the record body; a unit
        // array around a scalar prints as the array it is.
        if it.field_type()?.is_traversable() {
            print_array_field(&mut it, p)?;
            unwrapped = true;
        } else {
            it.rewind()?;
        }
    }
    if !unwrapped {
        print_array(&mut it, p)?;
    }
    p.end_record();
    Ok(())
}

/// Print a container opening at `begin`.
pub(crate) fn print_container(
    file: &mut MemFile,
    p: &mut dyn Printer,
    ty: FieldType,
    begin: u64,
) -> Result<()> {
    if ty.is_array_or_subtype() {
        let mut it = ArrayIter::new(file, begin)?;
        print_array(&mut it, p)
    } else if ty.is_object_or_subtype() {
        let mut it = ObjectIter::new(file, begin)?;
        print_object(&mut it, p)
    } else {
        let mut it = ColumnIter::new(file, begin)?;
        print_column(&mut it, p)
    }
}

/// Print a leaf field given its payload offset.
pub(crate) fn print_leaf(
    file: &MemFile,
    p: &mut dyn Printer,
    ty: FieldType,
    data_off: u64,
) -> Result<()> {
    match ty {
        FieldType::Null => p.scalar_null(),
        FieldType::True => p.scalar_boolean(true),
        FieldType::False => p.scalar_boolean(false),
        FieldType::NumU8 => p.scalar_unsigned(file.u8_at(data_off)? as u64),
        FieldType::NumU16 => p.scalar_unsigned(file.u16_at(data_off)? as u64),
        FieldType::NumU32 => p.scalar_unsigned(file.u32_at(data_off)? as u64),
        FieldType::NumU64 => p.scalar_unsigned(file.u64_at(data_off)?),
        FieldType::NumI8 => p.scalar_signed(file.i8_at(data_off)? as i64),
        FieldType::NumI16 => p.scalar_signed(file.i16_at(data_off)? as i64),
        FieldType::NumI32 => p.scalar_signed(file.i32_at(data_off)? as i64),
        FieldType::NumI64 => p.scalar_signed(file.i64_at(data_off)?),
        FieldType::NumFloat => p.scalar_float(file.f32_at(data_off)?),
        FieldType::String => {
            let s = crate::iter::string_at(file, data_off)?.to_string();
            p.scalar_string(&s);
        }
        FieldType::Binary | FieldType::BinaryCustom => {
            let value = crate::iter::binary_at(file, ty, data_off)?;
            p.scalar_binary(&value);
        }
        other => {
            return Err(crate::error::ColsonError::Internal(format!(
                "container {:?} passed to leaf printer",
                other
            )))
        }
    }
    Ok(())
}

/// Print one column slot as a scalar.
pub(crate) fn print_column_slot(
    file: &MemFile,
    p: &mut dyn Printer,
    ty: ColumnType,
    slot_off: u64,
) -> Result<()> {
    if slot_is_null(file, ty, slot_off)? {
        p.scalar_null();
        return Ok(());
    }
    match ty {
        ColumnType::U8 => p.scalar_unsigned(file.u8_at(slot_off)? as u64),
        ColumnType::U16 => p.scalar_unsigned(file.u16_at(slot_off)? as u64),
        ColumnType::U32 => p.scalar_unsigned(file.u32_at(slot_off)? as u64),
        ColumnType::U64 => p.scalar_unsigned(file.u64_at(slot_off)?),
        ColumnType::I8 => p.scalar_signed(file.i8_at(slot_off)? as i64),
        ColumnType::I16 => p.scalar_signed(file.i16_at(slot_off)? as i64),
        ColumnType::I32 => p.scalar_signed(file.i32_at(slot_off)? as i64),
        ColumnType::I64 => p.scalar_signed(file.i64_at(slot_off)?),
        ColumnType::Float => p.scalar_float(file.f32_at(slot_off)?),
        ColumnType::Boolean => p.scalar_boolean(file.u8_at(slot_off)? != 0),
    }
    Ok(())
}

fn print_array(it: &mut ArrayIter<'_>, p: &mut dyn Printer) -> Result<()> {
    p.begin_array();
    while it.next()? {
        print_array_field(it, p)?;
    }
    p.end_array();
    Ok(())
}

/// Print the field the array iterator currently points at.
fn print_array_field(it: &mut ArrayIter<'_>, p: &mut dyn Printer) -> Result<()> {
    let ty = it.field_type()?;
    if ty.is_array_or_subtype() {
        let mut sub = it.array_value()?;
        print_array(&mut sub, p)
    } else if ty.is_object_or_subtype() {
        let mut sub = it.object_value()?;
        print_object(&mut sub, p)
    } else if ty.is_column_or_subtype() {
        let mut sub = it.column_value()?;
        print_column(&mut sub, p)
    } else {
        let field = it.current()?;
        print_leaf(it.file, p, ty, field.data)
    }
}

fn print_object(it: &mut ObjectIter<'_>, p: &mut dyn Printer) -> Result<()> {
    p.begin_object();
    while it.next()? {
        let name = it.prop_name()?.to_string();
        p.prop_key(&name);
        let ty = it.prop_type()?;
        if ty.is_array_or_subtype() {
            let mut sub = it.array_value()?;
            print_array(&mut sub, p)?;
        } else if ty.is_object_or_subtype() {
            let mut sub = it.object_value()?;
            print_object(&mut sub, p)?;
        } else if ty.is_column_or_subtype() {
            let mut sub = it.column_value()?;
            print_column(&mut sub, p)?;
        } else {
            let prop = it.current()?;
            print_leaf(it.file, p, ty, prop.val_data)?;
        }
    }
    p.end_object();
    Ok(())
}

/// Columns print as JSON arrays; null sentinels print as `null`.
fn print_column(it: &mut ColumnIter<'_>, p: &mut dyn Printer) -> Result<()> {
    p.begin_array();
    let (ty, num) = it.values_info();
    for i in 0..num {
        let slot_off = it.header().slot_offset(i);
        print_column_slot(it.file, p, ty, slot_off)?;
    }
    p.end_array();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_escaping() {
        let mut p = CompactJsonPrinter::new();
        p.begin_array();
        p.scalar_string("a\"b\\c\nd");
        p.end_array();
        assert_eq!(p.finish(), r#"["a\"b\\c\nd"]"#);
    }

    #[test]
    fn test_comma_placement() {
        let mut p = CompactJsonPrinter::new();
        p.begin_object();
        p.prop_key("a");
        p.scalar_unsigned(1);
        p.prop_key("b");
        p.begin_array();
        p.scalar_null();
        p.scalar_boolean(true);
        p.end_array();
        p.end_object();
        assert_eq!(p.finish(), r#"{"a":1,"b":[null,true]}"#);
    }

    #[test]
    fn test_empty_containers() {
        let mut p = CompactJsonPrinter::new();
        p.begin_array();
        p.end_array();
        assert_eq!(p.finish(), "[]");

        let mut p = CompactJsonPrinter::new();
        p.begin_object();
        p.end_object();
        assert_eq!(p.finish(), "{}");
    }

    #[test]
    fn test_signed_and_float() {
        let mut p = CompactJsonPrinter::new();
        p.begin_array();
        p.scalar_signed(-5);
        p.scalar_float(2.5);
        p.end_array();
        assert_eq!(p.finish(), "[-5,2.5]");
    }
}
