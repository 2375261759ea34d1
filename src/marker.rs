//! Marker taxonomy and field-type codec.
//!
//! Every field type is encoded by a distinct one-byte marker. Leaf and
//! structural markers live below 0x20; container openers occupy the dense
//! block 0x20–0x4F: twelve container kinds (array, ten column element
//! types, object) with four abstract variants each. For a container kind
//! with block base `B`, variant 0 (`B+0`) is the *base* marker (unsorted
//! multiset / multimap) and variants 1–3 are the derived abstract types.
//!
//! ```text
//! 0x00        empty space (skip padding)
//! 0x01-0x03   null, true, false
//! 0x04        string
//! 0x05-0x0D   numbers: u8 u16 u32 u64 i8 i16 i32 i64 float
//! 0x0E-0x0F   binary, binary-custom
//! 0x10-0x11   array end, object end
//! 0x20-0x4F   container openers (12 kinds x 4 abstract variants)
//! ```
//!
//! Classification is arithmetic over the block: a byte `m` opens a
//! container iff `0x20 <= m < 0x50`; kind is `(m - 0x20) / 4` and abstract
//! variant is `(m - 0x20) % 4`.

use serde::{Deserialize, Serialize};

use crate::error::{ColsonError, Result};

// ── Marker constants ───────────────────────────────────────────────

/// Empty space inside arrays and objects; readers skip it.
pub const MARKER_EMPTY: u8 = 0x00;
pub const MARKER_NULL: u8 = 0x01;
pub const MARKER_TRUE: u8 = 0x02;
pub const MARKER_FALSE: u8 = 0x03;
pub const MARKER_STRING: u8 = 0x04;
pub const MARKER_U8: u8 = 0x05;
pub const MARKER_U16: u8 = 0x06;
pub const MARKER_U32: u8 = 0x07;
pub const MARKER_U64: u8 = 0x08;
pub const MARKER_I8: u8 = 0x09;
pub const MARKER_I16: u8 = 0x0A;
pub const MARKER_I32: u8 = 0x0B;
pub const MARKER_I64: u8 = 0x0C;
pub const MARKER_FLOAT: u8 = 0x0D;
pub const MARKER_BINARY: u8 = 0x0E;
pub const MARKER_BINARY_CUSTOM: u8 = 0x0F;
pub const MARKER_ARRAY_END: u8 = 0x10;
pub const MARKER_OBJECT_END: u8 = 0x11;

/// First container opener byte.
pub const CONTAINER_BLOCK_START: u8 = 0x20;
/// One past the last container opener byte.
pub const CONTAINER_BLOCK_END: u8 = 0x50;

const ARRAY_BLOCK: u8 = 0x20;
const COLUMN_BLOCK: u8 = 0x24;
const OBJECT_BLOCK: u8 = 0x4C;

// ── Column element types ───────────────────────────────────────────

/// Fixed element type of a column container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Boolean,
}

impl ColumnType {
    pub const ALL: [ColumnType; 10] = [
        ColumnType::U8,
        ColumnType::U16,
        ColumnType::U32,
        ColumnType::U64,
        ColumnType::I8,
        ColumnType::I16,
        ColumnType::I32,
        ColumnType::I64,
        ColumnType::Float,
        ColumnType::Boolean,
    ];

    /// Fixed byte width of one column slot of this type.
    pub fn value_size(self) -> usize {
        match self {
            ColumnType::U8 | ColumnType::I8 | ColumnType::Boolean => 1,
            ColumnType::U16 | ColumnType::I16 => 2,
            ColumnType::U32 | ColumnType::I32 | ColumnType::Float => 4,
            ColumnType::U64 | ColumnType::I64 => 8,
        }
    }

    fn index(self) -> u8 {
        match self {
            ColumnType::U8 => 0,
            ColumnType::U16 => 1,
            ColumnType::U32 => 2,
            ColumnType::U64 => 3,
            ColumnType::I8 => 4,
            ColumnType::I16 => 5,
            ColumnType::I32 => 6,
            ColumnType::I64 => 7,
            ColumnType::Float => 8,
            ColumnType::Boolean => 9,
        }
    }

    fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }
}

// ── Abstract derivations ───────────────────────────────────────────

/// Abstract subtype of a list container (array or column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListDerivation {
    UnsortedMultiset,
    SortedMultiset,
    UnsortedSet,
    SortedSet,
}

impl ListDerivation {
    fn index(self) -> u8 {
        match self {
            ListDerivation::UnsortedMultiset => 0,
            ListDerivation::SortedMultiset => 1,
            ListDerivation::UnsortedSet => 2,
            ListDerivation::SortedSet => 3,
        }
    }

    fn from_index(idx: u8) -> Self {
        match idx {
            0 => ListDerivation::UnsortedMultiset,
            1 => ListDerivation::SortedMultiset,
            2 => ListDerivation::UnsortedSet,
            _ => ListDerivation::SortedSet,
        }
    }

    pub fn class(self) -> AbstractClass {
        match self {
            ListDerivation::UnsortedMultiset => AbstractClass::UnsortedMultiset,
            ListDerivation::SortedMultiset => AbstractClass::SortedMultiset,
            ListDerivation::UnsortedSet => AbstractClass::UnsortedSet,
            ListDerivation::SortedSet => AbstractClass::SortedSet,
        }
    }
}

/// Abstract subtype of an object container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapDerivation {
    UnsortedMultimap,
    SortedMultimap,
    UnsortedMap,
    SortedMap,
}

impl MapDerivation {
    fn index(self) -> u8 {
        match self {
            MapDerivation::UnsortedMultimap => 0,
            MapDerivation::SortedMultimap => 1,
            MapDerivation::UnsortedMap => 2,
            MapDerivation::SortedMap => 3,
        }
    }

    fn from_index(idx: u8) -> Self {
        match idx {
            0 => MapDerivation::UnsortedMultimap,
            1 => MapDerivation::SortedMultimap,
            2 => MapDerivation::UnsortedMap,
            _ => MapDerivation::SortedMap,
        }
    }

    pub fn class(self) -> AbstractClass {
        match self {
            MapDerivation::UnsortedMultimap => AbstractClass::UnsortedMultimap,
            MapDerivation::SortedMultimap => AbstractClass::SortedMultimap,
            MapDerivation::UnsortedMap => AbstractClass::UnsortedMap,
            MapDerivation::SortedMap => AbstractClass::SortedMap,
        }
    }
}

/// Combined sort/duplicate classification of a container's abstract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractClass {
    UnsortedMultiset,
    SortedMultiset,
    UnsortedSet,
    SortedSet,
    UnsortedMultimap,
    SortedMultimap,
    UnsortedMap,
    SortedMap,
}

impl AbstractClass {
    /// Base abstract types are the unsorted multiset / multimap variants;
    /// everything else is derived.
    pub fn is_base(self) -> bool {
        matches!(
            self,
            AbstractClass::UnsortedMultiset | AbstractClass::UnsortedMultimap
        )
    }

    pub fn is_derived(self) -> bool {
        !self.is_base()
    }

    pub fn is_sorted(self) -> bool {
        matches!(
            self,
            AbstractClass::SortedMultiset
                | AbstractClass::SortedSet
                | AbstractClass::SortedMultimap
                | AbstractClass::SortedMap
        )
    }

    /// Distinct classes (sets and maps) declare that duplicates are absent.
    pub fn is_distinct(self) -> bool {
        matches!(
            self,
            AbstractClass::UnsortedSet
                | AbstractClass::SortedSet
                | AbstractClass::UnsortedMap
                | AbstractClass::SortedMap
        )
    }

    pub fn is_multiset(self) -> bool {
        matches!(
            self,
            AbstractClass::UnsortedMultiset | AbstractClass::SortedMultiset
        )
    }

    pub fn is_map_class(self) -> bool {
        matches!(
            self,
            AbstractClass::UnsortedMultimap
                | AbstractClass::SortedMultimap
                | AbstractClass::UnsortedMap
                | AbstractClass::SortedMap
        )
    }

    /// List-side derivation for this class, if it is a list class.
    pub fn to_list_derivation(self) -> Result<ListDerivation> {
        match self {
            AbstractClass::UnsortedMultiset => Ok(ListDerivation::UnsortedMultiset),
            AbstractClass::SortedMultiset => Ok(ListDerivation::SortedMultiset),
            AbstractClass::UnsortedSet => Ok(ListDerivation::UnsortedSet),
            AbstractClass::SortedSet => Ok(ListDerivation::SortedSet),
            _ => Err(ColsonError::TypeMismatch(
                "abstract class does not encode a list type".into(),
            )),
        }
    }

    /// Map-side derivation for this class, if it is a map class.
    pub fn to_map_derivation(self) -> Result<MapDerivation> {
        match self {
            AbstractClass::UnsortedMultimap => Ok(MapDerivation::UnsortedMultimap),
            AbstractClass::SortedMultimap => Ok(MapDerivation::SortedMultimap),
            AbstractClass::UnsortedMap => Ok(MapDerivation::UnsortedMap),
            AbstractClass::SortedMap => Ok(MapDerivation::SortedMap),
            _ => Err(ColsonError::TypeMismatch(
                "abstract class does not encode a map type".into(),
            )),
        }
    }
}

// ── Field types ────────────────────────────────────────────────────

/// A list container shape, input to [`derive_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListContainer {
    Array,
    Column(ColumnType),
}

/// The static type of a value, identified by a one-byte marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Null,
    True,
    False,
    String,
    NumU8,
    NumU16,
    NumU32,
    NumU64,
    NumI8,
    NumI16,
    NumI32,
    NumI64,
    NumFloat,
    Binary,
    BinaryCustom,
    Array(ListDerivation),
    Column(ColumnType, ListDerivation),
    Object(MapDerivation),
}

impl FieldType {
    /// Decode a marker byte. `None` for unknown markers (including the
    /// empty-space and end markers, which are not field types).
    pub fn from_marker(marker: u8) -> Option<FieldType> {
        match marker {
            MARKER_NULL => Some(FieldType::Null),
            MARKER_TRUE => Some(FieldType::True),
            MARKER_FALSE => Some(FieldType::False),
            MARKER_STRING => Some(FieldType::String),
            MARKER_U8 => Some(FieldType::NumU8),
            MARKER_U16 => Some(FieldType::NumU16),
            MARKER_U32 => Some(FieldType::NumU32),
            MARKER_U64 => Some(FieldType::NumU64),
            MARKER_I8 => Some(FieldType::NumI8),
            MARKER_I16 => Some(FieldType::NumI16),
            MARKER_I32 => Some(FieldType::NumI32),
            MARKER_I64 => Some(FieldType::NumI64),
            MARKER_FLOAT => Some(FieldType::NumFloat),
            MARKER_BINARY => Some(FieldType::Binary),
            MARKER_BINARY_CUSTOM => Some(FieldType::BinaryCustom),
            CONTAINER_BLOCK_START..=0x4F => {
                let kind = (marker - CONTAINER_BLOCK_START) / 4;
                let variant = (marker - CONTAINER_BLOCK_START) % 4;
                match kind {
                    0 => Some(FieldType::Array(ListDerivation::from_index(variant))),
                    1..=10 => Some(FieldType::Column(
                        ColumnType::from_index(kind - 1)?,
                        ListDerivation::from_index(variant),
                    )),
                    _ => Some(FieldType::Object(MapDerivation::from_index(variant))),
                }
            }
            _ => None,
        }
    }

    /// The marker byte encoding this field type.
    pub fn marker(self) -> u8 {
        match self {
            FieldType::Null => MARKER_NULL,
            FieldType::True => MARKER_TRUE,
            FieldType::False => MARKER_FALSE,
            FieldType::String => MARKER_STRING,
            FieldType::NumU8 => MARKER_U8,
            FieldType::NumU16 => MARKER_U16,
            FieldType::NumU32 => MARKER_U32,
            FieldType::NumU64 => MARKER_U64,
            FieldType::NumI8 => MARKER_I8,
            FieldType::NumI16 => MARKER_I16,
            FieldType::NumI32 => MARKER_I32,
            FieldType::NumI64 => MARKER_I64,
            FieldType::NumFloat => MARKER_FLOAT,
            FieldType::Binary => MARKER_BINARY,
            FieldType::BinaryCustom => MARKER_BINARY_CUSTOM,
            FieldType::Array(d) => ARRAY_BLOCK + d.index(),
            FieldType::Column(t, d) => COLUMN_BLOCK + t.index() * 4 + d.index(),
            FieldType::Object(d) => OBJECT_BLOCK + d.index(),
        }
    }

    // ── Classifiers ────────────────────────────────────────────────

    pub fn is_null(self) -> bool {
        self == FieldType::Null
    }

    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            FieldType::True | FieldType::False | FieldType::Column(ColumnType::Boolean, _)
        )
    }

    pub fn is_string(self) -> bool {
        self == FieldType::String
    }

    pub fn is_binary(self) -> bool {
        matches!(self, FieldType::Binary | FieldType::BinaryCustom)
    }

    pub fn is_number(self) -> bool {
        self.is_unsigned() || self.is_signed() || self.is_floating()
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            FieldType::NumU8 | FieldType::NumU16 | FieldType::NumU32 | FieldType::NumU64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            FieldType::NumI8 | FieldType::NumI16 | FieldType::NumI32 | FieldType::NumI64
        )
    }

    pub fn is_floating(self) -> bool {
        self == FieldType::NumFloat
    }

    pub fn is_array_or_subtype(self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    pub fn is_column_or_subtype(self) -> bool {
        matches!(self, FieldType::Column(..))
    }

    pub fn is_column_of(self, ty: ColumnType) -> bool {
        matches!(self, FieldType::Column(t, _) if t == ty)
    }

    pub fn is_object_or_subtype(self) -> bool {
        matches!(self, FieldType::Object(_))
    }

    /// Arrays and columns are both list containers.
    pub fn is_list_or_subtype(self) -> bool {
        self.is_array_or_subtype() || self.is_column_or_subtype()
    }

    /// Any container: array, column, or object.
    pub fn is_traversable(self) -> bool {
        self.is_list_or_subtype() || self.is_object_or_subtype()
    }

    /// Abstract classification of a container opener. `None` for leaves.
    pub fn abstract_class(self) -> Option<AbstractClass> {
        match self {
            FieldType::Array(d) | FieldType::Column(_, d) => Some(d.class()),
            FieldType::Object(d) => Some(d.class()),
            _ => None,
        }
    }
}

// ── Abstract derivation ────────────────────────────────────────────

/// Derived opener for a list container annotated with the given class.
pub fn derive_list(container: ListContainer, class: AbstractClass) -> Result<FieldType> {
    let derivation = class.to_list_derivation()?;
    Ok(match container {
        ListContainer::Array => FieldType::Array(derivation),
        ListContainer::Column(ty) => FieldType::Column(ty, derivation),
    })
}

/// Derived opener for an object container annotated with the given class.
pub fn derive_map(class: AbstractClass) -> Result<FieldType> {
    Ok(FieldType::Object(class.to_map_derivation()?))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_marker_mapping_is_bijective() {
        let mut seen = HashSet::new();
        let mut count = 0;
        for byte in 0u8..=255 {
            if let Some(ty) = FieldType::from_marker(byte) {
                assert_eq!(ty.marker(), byte, "marker {:#04x} does not roundtrip", byte);
                assert!(seen.insert(ty), "marker {:#04x} maps to duplicate type", byte);
                count += 1;
            }
        }
        // 15 leaf types + 12 container kinds x 4 variants.
        assert_eq!(count, 15 + 48);
    }

    #[test]
    fn test_structural_markers_are_not_field_types() {
        assert_eq!(FieldType::from_marker(MARKER_EMPTY), None);
        assert_eq!(FieldType::from_marker(MARKER_ARRAY_END), None);
        assert_eq!(FieldType::from_marker(MARKER_OBJECT_END), None);
        assert_eq!(FieldType::from_marker(0x50), None);
        assert_eq!(FieldType::from_marker(0xFF), None);
    }

    #[test]
    fn test_container_block_classification() {
        for byte in CONTAINER_BLOCK_START..CONTAINER_BLOCK_END {
            let ty = FieldType::from_marker(byte).unwrap();
            assert!(ty.is_traversable());
            assert!(ty.abstract_class().is_some());
        }
    }

    #[test]
    fn test_base_variant_is_unsorted_multi() {
        for byte in CONTAINER_BLOCK_START..CONTAINER_BLOCK_END {
            let ty = FieldType::from_marker(byte).unwrap();
            let class = ty.abstract_class().unwrap();
            let is_block_base = (byte - CONTAINER_BLOCK_START) % 4 == 0;
            assert_eq!(class.is_base(), is_block_base, "marker {:#04x}", byte);
        }
    }

    #[test]
    fn test_classifiers() {
        assert!(FieldType::True.is_boolean());
        assert!(FieldType::Column(ColumnType::Boolean, ListDerivation::SortedSet).is_boolean());
        assert!(!FieldType::NumU8.is_boolean());

        assert!(FieldType::NumU32.is_unsigned());
        assert!(FieldType::NumI32.is_signed());
        assert!(FieldType::NumFloat.is_floating());
        assert!(FieldType::NumFloat.is_number());
        assert!(!FieldType::String.is_number());

        assert!(FieldType::Binary.is_binary());
        assert!(FieldType::BinaryCustom.is_binary());

        let col = FieldType::Column(ColumnType::U16, ListDerivation::UnsortedMultiset);
        assert!(col.is_column_of(ColumnType::U16));
        assert!(!col.is_column_of(ColumnType::U32));
        assert!(col.is_list_or_subtype());
        assert!(col.is_traversable());

        assert!(FieldType::Array(ListDerivation::SortedSet).is_list_or_subtype());
        assert!(FieldType::Object(MapDerivation::SortedMap).is_traversable());
        assert!(!FieldType::Null.is_traversable());
    }

    #[test]
    fn test_derive_list_total_over_list_classes() {
        let classes = [
            AbstractClass::UnsortedMultiset,
            AbstractClass::SortedMultiset,
            AbstractClass::UnsortedSet,
            AbstractClass::SortedSet,
        ];
        for class in classes {
            let arr = derive_list(ListContainer::Array, class).unwrap();
            assert!(arr.is_array_or_subtype());
            assert_eq!(arr.abstract_class(), Some(class));

            for ty in ColumnType::ALL {
                let col = derive_list(ListContainer::Column(ty), class).unwrap();
                assert!(col.is_column_of(ty));
                assert_eq!(col.abstract_class(), Some(class));
            }
        }
    }

    #[test]
    fn test_derive_list_rejects_map_classes() {
        let err = derive_list(ListContainer::Array, AbstractClass::SortedMap).unwrap_err();
        assert!(err.to_string().contains("does not encode a list type"));
    }

    #[test]
    fn test_derive_map_total_over_map_classes() {
        let classes = [
            AbstractClass::UnsortedMultimap,
            AbstractClass::SortedMultimap,
            AbstractClass::UnsortedMap,
            AbstractClass::SortedMap,
        ];
        for class in classes {
            let obj = derive_map(class).unwrap();
            assert!(obj.is_object_or_subtype());
            assert_eq!(obj.abstract_class(), Some(class));
        }
    }

    #[test]
    fn test_derive_map_rejects_list_classes() {
        assert!(derive_map(AbstractClass::SortedSet).is_err());
    }

    #[test]
    fn test_value_sizes() {
        assert_eq!(ColumnType::U8.value_size(), 1);
        assert_eq!(ColumnType::U16.value_size(), 2);
        assert_eq!(ColumnType::U32.value_size(), 4);
        assert_eq!(ColumnType::U64.value_size(), 8);
        assert_eq!(ColumnType::I8.value_size(), 1);
        assert_eq!(ColumnType::I16.value_size(), 2);
        assert_eq!(ColumnType::I32.value_size(), 4);
        assert_eq!(ColumnType::I64.value_size(), 8);
        assert_eq!(ColumnType::Float.value_size(), 4);
        assert_eq!(ColumnType::Boolean.value_size(), 1);
    }

    #[test]
    fn test_abstract_class_predicates() {
        assert!(AbstractClass::UnsortedMultiset.is_base());
        assert!(AbstractClass::UnsortedMultimap.is_base());
        assert!(AbstractClass::SortedSet.is_derived());

        assert!(AbstractClass::SortedMultiset.is_sorted());
        assert!(!AbstractClass::UnsortedSet.is_sorted());

        assert!(AbstractClass::SortedMap.is_distinct());
        assert!(!AbstractClass::SortedMultimap.is_distinct());

        assert!(AbstractClass::UnsortedMultiset.is_multiset());
        assert!(AbstractClass::SortedMultimap.is_map_class());
    }
}
