//! Persistent sorted tables.
//!
//! Architecture:
//! - TableWriter: streams strictly increasing entries into a new file
//! - TableReader: memory-maps a finished file for point and ordinal lookups
//! - Cursor: a copyable position over a reader's entries
//! - merge: k-way merge of readers into a writer

mod comparator;
mod cursor;
mod format;
mod merge;
mod options;
mod reader;
mod writer;

pub use comparator::{
    Comparator, ComparatorConfig, Endian, FixedWidthUint, Lexicographic, default_comparator, resolve,
};
pub use cursor::{Cursor, Entries};
pub use options::TableOptions;
pub use reader::TableReader;
pub use writer::{TableSummary, TableWriter};

pub(crate) use cursor::CursorPosition;
