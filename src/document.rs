//! Document: record header plus the top-level body array.
//!
//! Wire shape:
//!
//! ```text
//! [key kind: u8]
//! [key payload: none | u64 LE | i64 LE | varuint string id]
//! [commit hash: 8 bytes]
//! [body array container]
//! ```
//!
//! The body is always an array container; its absence makes the document
//! malformed. A body array holding exactly one object or column element
//! (a "unit array") is treated as the record body for printing and path
//! evaluation.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::dict::StringDictionary;
use crate::error::{ColsonError, Result};
use crate::find::Find;
use crate::insert::Inserter;
use crate::iter::{skip_field_body, ArrayIter};
use crate::layout;
use crate::marker::{AbstractClass, FieldType};
use crate::memfile::MemFile;
use crate::path::DotPath;
use crate::printer::{self, CompactJsonPrinter, Printer};

// ── Record keys ────────────────────────────────────────────────────

const KEY_KIND_NONE: u8 = 0;
const KEY_KIND_AUTOGEN: u8 = 1;
const KEY_KIND_UNSIGNED: u8 = 2;
const KEY_KIND_SIGNED: u8 = 3;
const KEY_KIND_STRING: u8 = 4;

/// Record key supplied at document creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKey {
    None,
    Autogen(u64),
    Unsigned(u64),
    Signed(i64),
    String(String),
}

/// Record key as stored in a document header. String keys are
/// dictionary-encoded and surface as their id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKeyValue {
    None,
    Autogen(u64),
    Unsigned(u64),
    Signed(i64),
    StringId(u64),
}

// ── Document ───────────────────────────────────────────────────────

/// A columnar binary JSON document held in one contiguous byte buffer.
#[derive(Debug, Clone)]
pub struct Document {
    file: MemFile,
    key_kind: u8,
    hash_off: u64,
    body_off: u64,
}

impl Document {
    /// Create an empty document. String record keys need a dictionary;
    /// use [`with_string_key`](Self::with_string_key) for those.
    pub fn new(key: RecordKey) -> Result<Document> {
        match key {
            RecordKey::None => Self::build(KEY_KIND_NONE, &[]),
            RecordKey::Autogen(id) => Self::build(KEY_KIND_AUTOGEN, &id.to_le_bytes()),
            RecordKey::Unsigned(id) => Self::build(KEY_KIND_UNSIGNED, &id.to_le_bytes()),
            RecordKey::Signed(id) => Self::build(KEY_KIND_SIGNED, &id.to_le_bytes()),
            RecordKey::String(_) => Err(ColsonError::UnsupportedContainer(
                "string record keys are dictionary-encoded; use Document::with_string_key"
                    .into(),
            )),
        }
    }

    /// Create an empty document whose record key is the dictionary id of
    /// `key`.
    pub fn with_string_key(dict: &mut dyn StringDictionary, key: &str) -> Result<Document> {
        let id = dict.insert(&[key])[0];
        let mut payload = Vec::new();
        let mut v = id;
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                payload.push(byte);
                break;
            }
            payload.push(byte | 0x80);
        }
        Self::build(KEY_KIND_STRING, &payload)
    }

    fn build(kind: u8, key_payload: &[u8]) -> Result<Document> {
        let mut file = MemFile::new();
        file.write_byte(kind);
        file.write(key_payload);
        let hash_off = file.tell();
        file.write(&[0u8; 8]);
        let body_off = file.tell();
        layout::open_array(&mut file, AbstractClass::UnsortedMultiset, 0)?;
        Ok(Document {
            file,
            key_kind: kind,
            hash_off,
            body_off,
        })
    }

    /// Parse and validate a document from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Document> {
        let mut file = MemFile::from_vec(bytes.to_vec());

        if file.is_empty() {
            return Err(ColsonError::MalformedDocument("empty document".into()));
        }
        let key_kind = file.u8_at(0)?;
        let payload_len: u64 = match key_kind {
            KEY_KIND_NONE => 0,
            KEY_KIND_AUTOGEN | KEY_KIND_UNSIGNED | KEY_KIND_SIGNED => 8,
            KEY_KIND_STRING => file.varuint_at(1)?.1 as u64,
            other => {
                return Err(ColsonError::MalformedDocument(format!(
                    "unknown record key kind {:#04x}",
                    other
                )))
            }
        };
        let hash_off = 1 + payload_len;
        let body_off = hash_off + 8;

        let marker = file.u8_at(body_off)?;
        let body_type = match FieldType::from_marker(marker) {
            Some(ty) if ty.is_array_or_subtype() => ty,
            _ => {
                return Err(ColsonError::MalformedDocument(format!(
                    "record body must be an array container, found marker {:#04x}",
                    marker
                )))
            }
        };

        // Walk the whole body so truncation and unknown markers surface
        // here instead of during later reads.
        file.seek(body_off + 1)?;
        skip_field_body(&mut file, body_type)?;
        if file.remaining() != 0 {
            return Err(ColsonError::MalformedDocument(format!(
                "{} trailing bytes after record body",
                file.remaining()
            )));
        }

        Ok(Document {
            file,
            key_kind,
            hash_off,
            body_off,
        })
    }

    /// Open a document from a file (memory-mapped read).
    pub fn open(path: &Path) -> Result<Document> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_bytes(&mmap)
    }

    /// Write the document bytes to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.file.as_slice())?;
        Ok(())
    }

    /// The raw document bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.file.as_slice()
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    // ── Header access ──────────────────────────────────────────────

    /// The record key stored in the header.
    pub fn record_key(&self) -> Result<RecordKeyValue> {
        Ok(match self.key_kind {
            KEY_KIND_NONE => RecordKeyValue::None,
            KEY_KIND_AUTOGEN => RecordKeyValue::Autogen(self.file.u64_at(1)?),
            KEY_KIND_UNSIGNED => RecordKeyValue::Unsigned(self.file.u64_at(1)?),
            KEY_KIND_SIGNED => RecordKeyValue::Signed(self.file.i64_at(1)?),
            KEY_KIND_STRING => RecordKeyValue::StringId(self.file.varuint_at(1)?.0),
            other => {
                return Err(ColsonError::Internal(format!(
                    "unknown record key kind {:#04x}",
                    other
                )))
            }
        })
    }

    /// Resolve a string record key through the dictionary that encoded it.
    pub fn string_key<'s>(
        &self,
        dict: &'s dyn StringDictionary,
    ) -> Result<Option<&'s str>> {
        match self.record_key()? {
            RecordKeyValue::StringId(id) => Ok(dict.extract(&[id]).remove(0)),
            _ => Ok(None),
        }
    }

    /// The 8-byte commit hash from the header.
    pub fn commit_hash(&self) -> Result<u64> {
        self.file.u64_at(self.hash_off)
    }

    /// Recompute the commit hash over the document bytes (with the hash
    /// field zeroed during hashing, so the result is deterministic).
    pub(crate) fn refresh_commit_hash(&mut self) -> Result<()> {
        self.file.write_at(self.hash_off, &[0u8; 8])?;
        let digest = blake3::hash(self.file.as_slice());
        self.file
            .write_at(self.hash_off, &digest.as_bytes()[..8])?;
        Ok(())
    }

    pub(crate) fn file(&self) -> &MemFile {
        &self.file
    }

    pub(crate) fn file_mut(&mut self) -> &mut MemFile {
        &mut self.file
    }

    pub(crate) fn body_offset(&self) -> u64 {
        self.body_off
    }

    // ── Reading ────────────────────────────────────────────────────

    /// Iterator over the record body array.
    pub fn body(&mut self) -> Result<ArrayIter<'_>> {
        ArrayIter::new_record_body(&mut self.file, self.body_off)
    }

    // ── Writing ────────────────────────────────────────────────────

    /// Append to the record body through an insert scope.
    pub fn edit<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Inserter<'_, '_>) -> Result<()>,
    {
        let mut it = ArrayIter::new_record_body(&mut self.file, self.body_off)?;
        it.fast_forward()?;
        let mut ins = it.insert_begin();
        f(&mut ins)
    }

    // ── Path lookup ────────────────────────────────────────────────

    /// Compile and evaluate a dot path, returning a typed result handle.
    pub fn find(&mut self, path: &str) -> Result<Find<'_>> {
        let compiled = DotPath::parse(path)?;
        Find::create(self, &compiled)
    }

    /// Evaluate a pre-compiled dot path.
    pub fn find_compiled(&mut self, path: &DotPath) -> Result<Find<'_>> {
        Find::create(self, path)
    }

    /// Whether a path resolves at all. Unparseable paths do not resolve.
    pub fn exists(&mut self, path: &str) -> bool {
        self.find(path).map(|f| f.has_result()).unwrap_or(false)
    }

    pub fn path_is_array(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_array_or_subtype)
    }

    pub fn path_is_column(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_column_or_subtype)
    }

    pub fn path_is_object(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_object_or_subtype)
    }

    pub fn path_is_container(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_traversable)
    }

    pub fn path_is_null(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_null)
    }

    pub fn path_is_number(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_number)
    }

    pub fn path_is_boolean(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_boolean)
    }

    pub fn path_is_string(&mut self, path: &str) -> bool {
        self.path_has_shape(path, FieldType::is_string)
    }

    fn path_has_shape(&mut self, path: &str, pred: fn(FieldType) -> bool) -> bool {
        self.find(path)
            .ok()
            .filter(|f| f.has_result())
            .and_then(|f| f.field_type().ok())
            .map(pred)
            .unwrap_or(false)
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Render the record through a printer.
    pub fn print(&mut self, p: &mut dyn Printer) -> Result<()> {
        printer::print_record(&mut self.file, self.body_off, p)
    }

    /// Render the record as compact JSON.
    pub fn to_json(&mut self) -> Result<String> {
        let mut p = CompactJsonPrinter::new();
        self.print(&mut p)?;
        Ok(p.finish())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::InMemoryDictionary;

    #[test]
    fn test_new_document_prints_empty_array() {
        let mut doc = Document::new(RecordKey::None).unwrap();
        assert_eq!(doc.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_record_keys() {
        let doc = Document::new(RecordKey::None).unwrap();
        assert_eq!(doc.record_key().unwrap(), RecordKeyValue::None);

        let doc = Document::new(RecordKey::Autogen(7)).unwrap();
        assert_eq!(doc.record_key().unwrap(), RecordKeyValue::Autogen(7));

        let doc = Document::new(RecordKey::Unsigned(42)).unwrap();
        assert_eq!(doc.record_key().unwrap(), RecordKeyValue::Unsigned(42));

        let doc = Document::new(RecordKey::Signed(-3)).unwrap();
        assert_eq!(doc.record_key().unwrap(), RecordKeyValue::Signed(-3));
    }

    #[test]
    fn test_string_key_via_dictionary() {
        let mut dict = InMemoryDictionary::new();
        let doc = Document::with_string_key(&mut dict, "user/42").unwrap();
        match doc.record_key().unwrap() {
            RecordKeyValue::StringId(id) => {
                assert_eq!(dict.extract(&[id]), vec![Some("user/42")]);
            }
            other => panic!("unexpected key {:?}", other),
        }
        assert_eq!(doc.string_key(&dict).unwrap(), Some("user/42"));
    }

    #[test]
    fn test_string_key_requires_dictionary() {
        let err = Document::new(RecordKey::String("x".into())).unwrap_err();
        assert!(err.to_string().contains("dictionary"));
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let mut doc = Document::new(RecordKey::Unsigned(1)).unwrap();
        doc.edit(|ins| {
            ins.insert_u8(1)?;
            ins.insert_string("two")
        })
        .unwrap();

        let reopened = Document::from_bytes(doc.as_bytes()).unwrap();
        assert_eq!(reopened.as_bytes(), doc.as_bytes());
        assert_eq!(reopened.record_key().unwrap(), RecordKeyValue::Unsigned(1));
    }

    #[test]
    fn test_from_bytes_rejects_empty() {
        let err = Document::from_bytes(&[]).unwrap_err();
        assert!(err.to_string().contains("empty document"));
    }

    #[test]
    fn test_from_bytes_rejects_unknown_key_kind() {
        let err = Document::from_bytes(&[0x7F; 16]).unwrap_err();
        assert!(err.to_string().contains("unknown record key kind"));
    }

    #[test]
    fn test_from_bytes_rejects_non_array_body() {
        let doc = Document::new(RecordKey::None).unwrap();
        let mut bytes = doc.as_bytes().to_vec();
        let body = bytes.len() - 2;
        bytes[body] = crate::marker::MARKER_NULL;
        let err = Document::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("record body must be an array"));
    }

    #[test]
    fn test_from_bytes_rejects_truncation() {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(|ins| ins.insert_string("somewhat long payload")).unwrap();
        let bytes = doc.as_bytes();
        let err = Document::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("Malformed document"));
    }

    #[test]
    fn test_from_bytes_rejects_trailing_bytes() {
        let doc = Document::new(RecordKey::None).unwrap();
        let mut bytes = doc.as_bytes().to_vec();
        bytes.push(0xAB);
        let err = Document::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing bytes"));
    }

    #[test]
    fn test_exists_and_shape_probes() {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(|ins| {
            ins.insert_object(0, |obj| {
                obj.prop_u8("n", 1)?;
                obj.prop_string("s", "x")?;
                obj.prop_true("b")?;
                obj.prop_null("z")?;
                obj.prop_array("a", 0, |_| Ok(()))
            })
        })
        .unwrap();

        assert!(doc.exists("$.n"));
        assert!(!doc.exists("$.missing"));
        assert!(!doc.exists("$.["));

        assert!(doc.path_is_number("$.n"));
        assert!(doc.path_is_string("$.s"));
        assert!(doc.path_is_boolean("$.b"));
        assert!(doc.path_is_null("$.z"));
        assert!(doc.path_is_array("$.a"));
        assert!(doc.path_is_container("$.a"));
        assert!(!doc.path_is_object("$.a"));
    }

    #[test]
    fn test_commit_hash_starts_zero() {
        let doc = Document::new(RecordKey::None).unwrap();
        assert_eq!(doc.commit_hash().unwrap(), 0);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut doc = Document::new(RecordKey::None).unwrap();
        doc.edit(|ins| ins.insert_u8(1)).unwrap();
        let mut copy = doc.clone();
        copy.edit(|ins| ins.insert_u8(2)).unwrap();
        assert_eq!(doc.to_json().unwrap(), "[1]");
        assert_eq!(copy.to_json().unwrap(), "[1,2]");
    }
}
