use ogdb_types::ClassId;
use thiserror::Error;

/// Errors produced while encoding or decoding slots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("corrupt format: version {version} is outside [0, {current}]")]
    CorruptFormat { version: u8, current: u8 },

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("truncated slot: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("marshalled length mismatch: predicted {expected}, encoded {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid string: {0}")]
    InvalidString(String),

    #[error("invalid indirection pointer: offset {offset}, length {length}")]
    InvalidPointer { offset: i32, length: i32 },

    #[error("aspect count mismatch for class {class}: recorded {recorded}, live {live}")]
    AspectCountMismatch {
        class: ClassId,
        recorded: usize,
        live: usize,
    },

    #[error("no mapping for {kind} id {id}")]
    UnmappedId { kind: &'static str, id: i32 },
}

pub type FormatResult<T> = Result<T, FormatError>;
