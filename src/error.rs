//! Error types for the document core

use thiserror::Error;

use crate::path::PathStatus;

pub type Result<T> = std::result::Result<T, ColsonError>;

#[derive(Error, Debug)]
pub enum ColsonError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Index {index} out of bounds (len {len})")]
    OutOfBounds { index: u64, len: u64 },

    #[error("Unsupported container operation: {0}")]
    UnsupportedContainer(String),

    #[error("Dot path parse error: {0}")]
    DotPathParse(String),

    #[error("Path not resolved: {0:?}")]
    PathUnresolved(PathStatus),

    #[error("Width-selecting insert is not allowed inside a column")]
    InsertTooDangerous,

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
