//! Dot-path compilation and evaluation.
//!
//! A dot path is an ordered sequence of key-name and array-index nodes:
//! `$.users[3].name`, `$.[0].[4]`, `col[3].foo`. The leading `$` is
//! optional; keys with special characters can be double-quoted.
//!
//! Evaluation starts in the record body array. A unit array at the record
//! root is transparent: a key-name node descends into its sole object
//! element without consuming a node, and a column element is entered
//! directly when more index nodes follow.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ColsonError, Result};
use crate::iter::{ArrayIter, ColumnIter, ObjectIter};
use crate::memfile::MemFile;

// ── Path nodes ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNode {
    Key(String),
    Idx(u64),
}

/// A compiled dot path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DotPath {
    nodes: Vec<PathNode>,
}

impl DotPath {
    pub fn parse(input: &str) -> Result<DotPath> {
        let s = input.trim();
        let bytes = s.as_bytes();
        let mut i = 0;
        if bytes.first() == Some(&b'$') {
            i = 1;
        }
        let mut nodes = Vec::new();
        let mut first = i == 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    i += 1;
                    if i >= bytes.len() {
                        return Err(parse_error(s, "trailing dot"));
                    }
                    if bytes[i] == b'[' {
                        i = parse_bracket(s, i, &mut nodes)?;
                    } else {
                        i = parse_segment(s, i, &mut nodes)?;
                    }
                }
                b'[' => {
                    i = parse_bracket(s, i, &mut nodes)?;
                }
                _ if first => {
                    i = parse_segment(s, i, &mut nodes)?;
                }
                _ => return Err(parse_error(s, "expected '.' or '['")),
            }
            first = false;
        }
        if nodes.is_empty() {
            return Err(parse_error(s, "empty path"));
        }
        Ok(DotPath { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.nodes.push(PathNode::Key(key.into()));
    }

    pub fn push_idx(&mut self, idx: u64) {
        self.nodes.push(PathNode::Idx(idx));
    }
}

impl FromStr for DotPath {
    type Err = ColsonError;

    fn from_str(s: &str) -> Result<Self> {
        DotPath::parse(s)
    }
}

fn parse_error(input: &str, reason: &str) -> ColsonError {
    ColsonError::DotPathParse(format!("{} in {:?}", reason, input))
}

/// Parse a `[123]` bracket starting at the `[`. Returns the index just
/// past the closing bracket.
fn parse_bracket(input: &str, start: usize, nodes: &mut Vec<PathNode>) -> Result<usize> {
    let bytes = input.as_bytes();
    let mut i = start + 1;
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return Err(parse_error(input, "expected digits inside brackets"));
    }
    if i >= bytes.len() || bytes[i] != b']' {
        return Err(parse_error(input, "unclosed bracket"));
    }
    let idx: u64 = input[digits_start..i]
        .parse()
        .map_err(|_| parse_error(input, "index too large"))?;
    nodes.push(PathNode::Idx(idx));
    Ok(i + 1)
}

/// Parse a plain or quoted segment starting at `start`. All-digit
/// segments are array indexes. Returns the index just past the segment.
fn parse_segment(input: &str, start: usize, nodes: &mut Vec<PathNode>) -> Result<usize> {
    let bytes = input.as_bytes();
    if bytes[start] == b'"' {
        let mut i = start + 1;
        while i < bytes.len() && bytes[i] != b'"' {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(parse_error(input, "unclosed quote"));
        }
        nodes.push(PathNode::Key(input[start + 1..i].to_string()));
        return Ok(i + 1);
    }
    let mut i = start;
    while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
        i += 1;
    }
    let token = &input[start..i];
    if token.is_empty() {
        return Err(parse_error(input, "empty path segment"));
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        let idx: u64 = token
            .parse()
            .map_err(|_| parse_error(input, "index too large"))?;
        nodes.push(PathNode::Idx(idx));
    } else {
        nodes.push(PathNode::Key(token.to_string()));
    }
    Ok(i)
}

// ── Evaluation ─────────────────────────────────────────────────────

/// Outcome of evaluating a dot path against a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStatus {
    Resolved,
    EmptyDoc,
    NoSuchKey,
    NoSuchIndex,
    NotAnObject,
    NotAContainer,
    NotTraversable,
    NoNestingPossible,
    InternalError,
}

/// Location of a resolved path inside its containing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Field number `slot` of the array opening at `array_begin`.
    ArraySlot { array_begin: u64, slot: u64 },
    /// Pair number `prop` of the object opening at `object_begin`.
    ObjectProp { object_begin: u64, prop: u64 },
    /// Slot `index` of the column opening at `column_begin`.
    ColumnSlot { column_begin: u64, index: u64 },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Evaluation {
    pub status: PathStatus,
    pub target: Option<Target>,
}

impl Evaluation {
    fn miss(status: PathStatus) -> Self {
        Evaluation {
            status,
            target: None,
        }
    }

    fn hit(target: Target) -> Self {
        Evaluation {
            status: PathStatus::Resolved,
            target: Some(target),
        }
    }
}

/// Evaluate `path` against the record body array opening at `body_begin`.
pub(crate) fn evaluate(
    file: &mut MemFile,
    body_begin: u64,
    path: &DotPath,
) -> Result<Evaluation> {
    if path.is_empty() {
        return Err(ColsonError::DotPathParse("empty path".into()));
    }
    let mut it = ArrayIter::new_record_body(file, body_begin)?;
    traverse_array(&mut it, path, 0, true)
}

fn traverse_array(
    it: &mut ArrayIter<'_>,
    path: &DotPath,
    pos: usize,
    is_record: bool,
) -> Result<Evaluation> {
    let is_unit = it.is_unit()?;
    if !it.next()? {
        return Ok(Evaluation::miss(PathStatus::EmptyDoc));
    }
    match &path.nodes()[pos] {
        PathNode::Idx(requested) => {
            let mut current = 0u64;
            while current < *requested {
                if !it.next()? {
                    return Ok(Evaluation::miss(PathStatus::NoSuchIndex));
                }
                current += 1;
            }
            let elem_type = it.field_type()?;
            let next_pos = pos + 1;

            // A unit column at the record root is entered directly; the
            // remaining path indexes its slots.
            if is_unit && is_record && elem_type.is_column_or_subtype() && next_pos < path.len()
            {
                let mut sub = it.column_value()?;
                return traverse_column(&mut sub, path, next_pos);
            }

            if next_pos == path.len() {
                return Ok(Evaluation::hit(Target::ArraySlot {
                    array_begin: it.begin_offset(),
                    slot: *requested,
                }));
            }
            if !elem_type.is_traversable() {
                return Ok(Evaluation::miss(PathStatus::NotTraversable));
            }
            match &path.nodes()[next_pos] {
                PathNode::Idx(_) => {
                    if !elem_type.is_list_or_subtype() {
                        return Ok(Evaluation::miss(PathStatus::NotAContainer));
                    }
                    if elem_type.is_array_or_subtype() {
                        let mut sub = it.array_value()?;
                        traverse_array(&mut sub, path, next_pos, false)
                    } else {
                        let mut sub = it.column_value()?;
                        traverse_column(&mut sub, path, next_pos)
                    }
                }
                PathNode::Key(_) => {
                    if !elem_type.is_object_or_subtype() {
                        return Ok(Evaluation::miss(PathStatus::NotAnObject));
                    }
                    let mut sub = it.object_value()?;
                    traverse_object(&mut sub, path, next_pos)
                }
            }
        }
        PathNode::Key(_) => {
            // Key lookup on an array only makes sense through the
            // unit-array shortcut at the record root.
            let elem_type = it.field_type()?;
            if !elem_type.is_object_or_subtype() {
                return Ok(Evaluation::miss(PathStatus::NotAnObject));
            }
            if is_unit && is_record {
                let mut sub = it.object_value()?;
                traverse_object(&mut sub, path, pos)
            } else {
                Ok(Evaluation::miss(PathStatus::NoSuchKey))
            }
        }
    }
}

fn traverse_object(it: &mut ObjectIter<'_>, path: &DotPath, pos: usize) -> Result<Evaluation> {
    let needle = match &path.nodes()[pos] {
        PathNode::Key(name) => name.as_str(),
        PathNode::Idx(_) => return Ok(Evaluation::miss(PathStatus::InternalError)),
    };
    if !it.next()? {
        return Ok(Evaluation::miss(PathStatus::EmptyDoc));
    }
    let next_pos = pos + 1;
    let mut prop_idx = 0u64;
    loop {
        if it.prop_name()? == needle {
            if next_pos == path.len() {
                return Ok(Evaluation::hit(Target::ObjectProp {
                    object_begin: it.begin_offset(),
                    prop: prop_idx,
                }));
            }
            let val_type = it.prop_type()?;
            if !val_type.is_traversable() {
                return Ok(Evaluation::miss(PathStatus::NotAContainer));
            }
            return match &path.nodes()[next_pos] {
                PathNode::Idx(_) => {
                    if !val_type.is_list_or_subtype() {
                        Ok(Evaluation::miss(PathStatus::NotAContainer))
                    } else if val_type.is_array_or_subtype() {
                        let mut sub = it.array_value()?;
                        traverse_array(&mut sub, path, next_pos, false)
                    } else {
                        let mut sub = it.column_value()?;
                        traverse_column(&mut sub, path, next_pos)
                    }
                }
                PathNode::Key(_) => {
                    if !val_type.is_object_or_subtype() {
                        Ok(Evaluation::miss(PathStatus::NotAnObject))
                    } else {
                        let mut sub = it.object_value()?;
                        traverse_object(&mut sub, path, next_pos)
                    }
                }
            };
        }
        if !it.next()? {
            break;
        }
        prop_idx += 1;
    }
    Ok(Evaluation::miss(PathStatus::NoSuchKey))
}

fn traverse_column(it: &mut ColumnIter<'_>, path: &DotPath, pos: usize) -> Result<Evaluation> {
    // Columns cannot nest, so the current node must be the last one.
    if pos + 1 != path.len() {
        return Ok(Evaluation::miss(PathStatus::NoNestingPossible));
    }
    let requested = match &path.nodes()[pos] {
        PathNode::Idx(idx) => *idx,
        PathNode::Key(_) => return Ok(Evaluation::miss(PathStatus::NotAnObject)),
    };
    let (_, num_values) = it.values_info();
    if requested >= num_values {
        return Ok(Evaluation::miss(PathStatus::NoSuchIndex));
    }
    Ok(Evaluation::hit(Target::ColumnSlot {
        column_begin: it.begin_offset(),
        index: requested,
    }))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(path: &DotPath) -> Vec<String> {
        path.nodes()
            .iter()
            .map(|n| match n {
                PathNode::Key(k) => k.clone(),
                PathNode::Idx(i) => i.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_parse_dollar_prefix() {
        let p = DotPath::parse("$.a.b").unwrap();
        assert_eq!(
            p.nodes(),
            &[PathNode::Key("a".into()), PathNode::Key("b".into())]
        );
    }

    #[test]
    fn test_parse_without_dollar() {
        let p = DotPath::parse("a.b").unwrap();
        assert_eq!(keys(&p), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_bracket_index() {
        let p = DotPath::parse("$.[1]").unwrap();
        assert_eq!(p.nodes(), &[PathNode::Idx(1)]);

        let p = DotPath::parse("$.[0].[4]").unwrap();
        assert_eq!(p.nodes(), &[PathNode::Idx(0), PathNode::Idx(4)]);
    }

    #[test]
    fn test_parse_key_with_bracket_suffix() {
        let p = DotPath::parse("$.col[3].foo").unwrap();
        assert_eq!(
            p.nodes(),
            &[
                PathNode::Key("col".into()),
                PathNode::Idx(3),
                PathNode::Key("foo".into())
            ]
        );
    }

    #[test]
    fn test_parse_digit_segment_is_index() {
        let p = DotPath::parse("0.name.3").unwrap();
        assert_eq!(
            p.nodes(),
            &[
                PathNode::Idx(0),
                PathNode::Key("name".into()),
                PathNode::Idx(3)
            ]
        );
    }

    #[test]
    fn test_parse_quoted_key() {
        let p = DotPath::parse("$.\"a b\".c").unwrap();
        assert_eq!(keys(&p), vec!["a b", "c"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(DotPath::parse("").is_err());
        assert!(DotPath::parse("$").is_err());
        assert!(DotPath::parse("$.").is_err());
        assert!(DotPath::parse("$.a..b").is_err());
        assert!(DotPath::parse("$.[abc]").is_err());
        assert!(DotPath::parse("$.[3").is_err());
        assert!(DotPath::parse("$.\"unterminated").is_err());
        assert!(DotPath::parse("$x").is_err());
    }

    #[test]
    fn test_from_str() {
        let p: DotPath = "$.x[2]".parse().unwrap();
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_push_builders() {
        let mut p = DotPath::default();
        p.push_key("a");
        p.push_idx(7);
        assert_eq!(p.nodes(), &[PathNode::Key("a".into()), PathNode::Idx(7)]);
    }
}
