//! Columnar binary JSON document format.
//!
//! A document is a single contiguous byte buffer of typed markers and
//! payloads that supports in-place traversal, mutation, and dot-path
//! lookup without an intermediate parsed tree. Containers (arrays,
//! columns, objects) carry an abstract-type annotation — set / multiset /
//! map / multimap crossed with sort state — encoded directly in their
//! opener marker.
//!
//! ```
//! use colson::{Document, RecordKey};
//!
//! let mut doc = Document::new(RecordKey::None).unwrap();
//! doc.edit(|ins| {
//!     ins.insert_object(0, |obj| {
//!         obj.prop_string("name", "ada")?;
//!         obj.prop_unsigned("age", 36)
//!     })
//! })
//! .unwrap();
//!
//! let find = doc.find("$.age").unwrap();
//! assert_eq!(find.unsigned().unwrap(), 36);
//! ```

pub mod dict;
pub mod error;
pub mod layout;
pub mod marker;
pub mod media;
pub mod printer;

mod document;
mod find;
mod insert;
mod iter;
mod memfile;
mod path;
mod revise;

pub use document::{Document, RecordKey, RecordKeyValue};
pub use error::{ColsonError, Result};
pub use find::Find;
pub use insert::Inserter;
pub use iter::{ArrayIter, BinaryValue, ColumnIter, ObjectIter};
pub use memfile::MemFile;
pub use path::{DotPath, PathNode, PathStatus};
pub use revise::Revise;
