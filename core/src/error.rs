use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PbtError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("key of {key_len} bytes is not strictly greater than the previous key ({previous_len} bytes)")]
    OutOfOrderKey { previous_len: usize, key_len: usize },

    #[error("table writer is already finished")]
    AlreadyFinished,

    #[error("table writer was abandoned after a failed write")]
    WriterFailed,

    #[error("invalid table options: {0}")]
    InvalidOptions(String),

    #[error("table file not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt table file: {0}")]
    CorruptFormat(String),

    #[error("comparator mismatch: expected {expected}, found {found}")]
    ComparatorMismatch { expected: String, found: String },

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("cursor at ordinal {ordinal} is out of range for a table of {len} entries")]
    CursorOutOfRange { ordinal: u64, len: u64 },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
}

impl PbtError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptFormat(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PbtError>;
