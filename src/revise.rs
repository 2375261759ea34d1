//! Revision context: update a draft copy of a base document by dot path.
//!
//! `Revise::begin` clones the base into a draft; every setter compiles
//! (or accepts compiled) paths, resolves them against the draft, and
//! mutates the resolved slot in place. `end` refreshes the commit hash
//! and hands the draft back as the new document version. Dropping a
//! revision before `end` abandons the draft.

use tracing::debug;

use crate::document::Document;
use crate::error::{ColsonError, Result};
use crate::iter::{ArrayIter, ColumnIter, ObjectIter};
use crate::path::{evaluate, DotPath, Target};

enum Slot<'a> {
    Array(ArrayIter<'a>),
    Object(ObjectIter<'a>),
    Column(ColumnIter<'a>, u64),
}

/// An open revision over a draft document.
pub struct Revise {
    draft: Document,
}

impl Revise {
    /// Open a revision against a base document.
    pub fn begin(base: &Document) -> Revise {
        debug!(bytes = base.len(), "revision opened");
        Revise {
            draft: base.clone(),
        }
    }

    /// The draft in its current state.
    pub fn draft(&self) -> &Document {
        &self.draft
    }

    /// Finalize the draft: refresh the commit hash and return the new
    /// document version.
    pub fn end(mut self) -> Result<Document> {
        self.draft.refresh_commit_hash()?;
        debug!(bytes = self.draft.len(), "revision finalized");
        Ok(self.draft)
    }

    /// Resolve a path against the draft into a positioned slot handle.
    fn resolve(&mut self, path: &DotPath) -> Result<Slot<'_>> {
        let body = self.draft.body_offset();
        let eval = evaluate(self.draft.file_mut(), body, path)?;
        let target = eval
            .target
            .ok_or(ColsonError::PathUnresolved(eval.status))?;
        match target {
            Target::ArraySlot { array_begin, slot } => {
                let mut it = ArrayIter::new(self.draft.file_mut(), array_begin)?;
                for _ in 0..=slot {
                    if !it.next()? {
                        return Err(ColsonError::Internal(
                            "resolved array slot vanished".into(),
                        ));
                    }
                }
                Ok(Slot::Array(it))
            }
            Target::ObjectProp { object_begin, prop } => {
                let mut it = ObjectIter::new(self.draft.file_mut(), object_begin)?;
                for _ in 0..=prop {
                    if !it.next()? {
                        return Err(ColsonError::Internal(
                            "resolved object property vanished".into(),
                        ));
                    }
                }
                Ok(Slot::Object(it))
            }
            Target::ColumnSlot {
                column_begin,
                index,
            } => {
                let it = ColumnIter::new(self.draft.file_mut(), column_begin)?;
                Ok(Slot::Column(it, index))
            }
        }
    }

    // ── Setters (string paths) ─────────────────────────────────────

    pub fn set_null(&mut self, path: &str) -> Result<()> {
        self.set_null_compiled(&DotPath::parse(path)?)
    }

    pub fn set_true(&mut self, path: &str) -> Result<()> {
        self.set_true_compiled(&DotPath::parse(path)?)
    }

    pub fn set_false(&mut self, path: &str) -> Result<()> {
        self.set_false_compiled(&DotPath::parse(path)?)
    }

    pub fn set_u8(&mut self, path: &str, value: u8) -> Result<()> {
        self.set_u8_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_u16(&mut self, path: &str, value: u16) -> Result<()> {
        self.set_u16_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_u32(&mut self, path: &str, value: u32) -> Result<()> {
        self.set_u32_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_u64(&mut self, path: &str, value: u64) -> Result<()> {
        self.set_u64_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_i8(&mut self, path: &str, value: i8) -> Result<()> {
        self.set_i8_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_i16(&mut self, path: &str, value: i16) -> Result<()> {
        self.set_i16_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_i32(&mut self, path: &str, value: i32) -> Result<()> {
        self.set_i32_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_i64(&mut self, path: &str, value: i64) -> Result<()> {
        self.set_i64_compiled(&DotPath::parse(path)?, value)
    }

    pub fn set_float(&mut self, path: &str, value: f32) -> Result<()> {
        self.set_float_compiled(&DotPath::parse(path)?, value)
    }

    /// Set an unsigned value using the smallest width that fits.
    pub fn set_unsigned(&mut self, path: &str, value: u64) -> Result<()> {
        if value <= u8::MAX as u64 {
            self.set_u8(path, value as u8)
        } else if value <= u16::MAX as u64 {
            self.set_u16(path, value as u16)
        } else if value <= u32::MAX as u64 {
            self.set_u32(path, value as u32)
        } else {
            self.set_u64(path, value)
        }
    }

    /// Set a signed value using the smallest width that fits.
    pub fn set_signed(&mut self, path: &str, value: i64) -> Result<()> {
        if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
            self.set_i8(path, value as i8)
        } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            self.set_i16(path, value as i16)
        } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            self.set_i32(path, value as i32)
        } else {
            self.set_i64(path, value)
        }
    }

    /// Replacing a resolved slot with a string changes the slot's byte
    /// size class; this rewrite is not implemented.
    pub fn set_string(&mut self, _path: &str, _value: &str) -> Result<()> {
        Err(ColsonError::UnsupportedContainer(
            "replacing a slot with a string is not implemented".into(),
        ))
    }

    /// Replacing a resolved slot with a binary blob is not implemented.
    pub fn set_binary(&mut self, _path: &str, _bytes: &[u8], _file_ext: &str) -> Result<()> {
        Err(ColsonError::UnsupportedContainer(
            "replacing a slot with a binary is not implemented".into(),
        ))
    }

    // ── Setters (compiled paths) ───────────────────────────────────

    pub fn set_null_compiled(&mut self, path: &DotPath) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_null(),
            Slot::Object(mut it) => it.update_null(),
            Slot::Column(mut it, pos) => it.update_set_null(pos),
        }
    }

    pub fn set_true_compiled(&mut self, path: &DotPath) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_true(),
            Slot::Object(mut it) => it.update_true(),
            Slot::Column(mut it, pos) => it.update_set_true(pos),
        }
    }

    pub fn set_false_compiled(&mut self, path: &DotPath) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_false(),
            Slot::Object(mut it) => it.update_false(),
            Slot::Column(mut it, pos) => it.update_set_false(pos),
        }
    }

    pub fn set_u8_compiled(&mut self, path: &DotPath, value: u8) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_u8(value),
            Slot::Object(mut it) => it.update_u8(value),
            Slot::Column(mut it, pos) => it.update_set_u8(pos, value),
        }
    }

    pub fn set_u16_compiled(&mut self, path: &DotPath, value: u16) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_u16(value),
            Slot::Object(mut it) => it.update_u16(value),
            Slot::Column(mut it, pos) => it.update_set_u16(pos, value),
        }
    }

    pub fn set_u32_compiled(&mut self, path: &DotPath, value: u32) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_u32(value),
            Slot::Object(mut it) => it.update_u32(value),
            Slot::Column(mut it, pos) => it.update_set_u32(pos, value),
        }
    }

    pub fn set_u64_compiled(&mut self, path: &DotPath, value: u64) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_u64(value),
            Slot::Object(mut it) => it.update_u64(value),
            Slot::Column(mut it, pos) => it.update_set_u64(pos, value),
        }
    }

    pub fn set_i8_compiled(&mut self, path: &DotPath, value: i8) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_i8(value),
            Slot::Object(mut it) => it.update_i8(value),
            Slot::Column(mut it, pos) => it.update_set_i8(pos, value),
        }
    }

    pub fn set_i16_compiled(&mut self, path: &DotPath, value: i16) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_i16(value),
            Slot::Object(mut it) => it.update_i16(value),
            Slot::Column(mut it, pos) => it.update_set_i16(pos, value),
        }
    }

    pub fn set_i32_compiled(&mut self, path: &DotPath, value: i32) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_i32(value),
            Slot::Object(mut it) => it.update_i32(value),
            Slot::Column(mut it, pos) => it.update_set_i32(pos, value),
        }
    }

    pub fn set_i64_compiled(&mut self, path: &DotPath, value: i64) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_i64(value),
            Slot::Object(mut it) => it.update_i64(value),
            Slot::Column(mut it, pos) => it.update_set_i64(pos, value),
        }
    }

    pub fn set_float_compiled(&mut self, path: &DotPath, value: f32) -> Result<()> {
        match self.resolve(path)? {
            Slot::Array(mut it) => it.update_float(value),
            Slot::Object(mut it) => it.update_float(value),
            Slot::Column(mut it, pos) => it.update_set_float(pos, value),
        }
    }

    // ── Single-shot conveniences ───────────────────────────────────

    pub fn update_one_set_null(base: &Document, path: &str) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_null(path)?;
        revise.end()
    }

    pub fn update_one_set_true(base: &Document, path: &str) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_true(path)?;
        revise.end()
    }

    pub fn update_one_set_false(base: &Document, path: &str) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_false(path)?;
        revise.end()
    }

    pub fn update_one_set_u8(base: &Document, path: &str, value: u8) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_u8(path, value)?;
        revise.end()
    }

    pub fn update_one_set_u16(base: &Document, path: &str, value: u16) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_u16(path, value)?;
        revise.end()
    }

    pub fn update_one_set_u32(base: &Document, path: &str, value: u32) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_u32(path, value)?;
        revise.end()
    }

    pub fn update_one_set_u64(base: &Document, path: &str, value: u64) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_u64(path, value)?;
        revise.end()
    }

    pub fn update_one_set_i8(base: &Document, path: &str, value: i8) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_i8(path, value)?;
        revise.end()
    }

    pub fn update_one_set_i16(base: &Document, path: &str, value: i16) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_i16(path, value)?;
        revise.end()
    }

    pub fn update_one_set_i32(base: &Document, path: &str, value: i32) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_i32(path, value)?;
        revise.end()
    }

    pub fn update_one_set_i64(base: &Document, path: &str, value: i64) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_i64(path, value)?;
        revise.end()
    }

    pub fn update_one_set_float(base: &Document, path: &str, value: f32) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_float(path, value)?;
        revise.end()
    }

    pub fn update_one_set_unsigned(base: &Document, path: &str, value: u64) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_unsigned(path, value)?;
        revise.end()
    }

    pub fn update_one_set_signed(base: &Document, path: &str, value: i64) -> Result<Document> {
        let mut revise = Revise::begin(base);
        revise.set_signed(path, value)?;
        revise.end()
    }
}
