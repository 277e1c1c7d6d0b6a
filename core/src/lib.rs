//! Persistent sorted key-value tables.
//!
//! A table is written once, in strictly increasing key order, and is
//! read-only afterwards. Readers memory-map the file and answer exact-match,
//! ordinal and lower-bound lookups through a sparse index. Several tables can
//! be merged into a new one.
//!
//! ```no_run
//! use pbt_core::{TableReader, TableWriter};
//!
//! # fn main() -> pbt_core::Result<()> {
//! let mut writer = TableWriter::create("fruit.pbt")?;
//! writer.add(b"apple", b"red")?;
//! writer.add(b"banana", b"yellow")?;
//! writer.finish()?;
//!
//! let reader = TableReader::open("fruit.pbt")?;
//! assert_eq!(reader.get(b"banana")?, Some(&b"yellow"[..]));
//! # Ok(())
//! # }
//! ```

// Public API
pub mod error;
pub mod handles;
pub mod table;

// Internal modules
pub(crate) mod constants;
pub(crate) mod varint;

pub use error::{PbtError, Result};
pub use handles::{CursorHandle, ReaderHandle, TableRegistry, WriterHandle};
pub use table::{
    Comparator, ComparatorConfig, Cursor, Endian, Entries, FixedWidthUint, Lexicographic, TableOptions,
    TableReader, TableSummary, TableWriter, resolve,
};
