//! Positions within a reader's ordered sequence of entries.

use std::fmt;

use crate::error::{PbtError, Result};

use super::format::RecordSpan;
use super::reader::TableReader;

/// A position in `[0, len]` of one reader. `len` is the end sentinel and has
/// no key or value.
///
/// Cursors are plain values: copying one and advancing the copy leaves the
/// original where it was. Two cursors are equal when they belong to the same
/// reader and sit at the same ordinal.
#[derive(Clone, Copy)]
pub struct Cursor<'r> {
    reader: &'r TableReader,
    ordinal: u64,
    /// Byte offset of the record at `ordinal` (the index start at the end).
    offset: usize,
}

/// A cursor detached from its reader's lifetime, for callers that keep the
/// reader alive some other way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CursorPosition {
    pub ordinal: u64,
    pub offset: usize,
}

impl<'r> Cursor<'r> {
    pub(crate) fn new(reader: &'r TableReader, ordinal: u64, offset: usize) -> Self {
        Self {
            reader,
            ordinal,
            offset,
        }
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn reader(&self) -> &'r TableReader {
        self.reader
    }

    pub fn is_end(&self) -> bool {
        self.ordinal >= self.reader.len()
    }

    /// Advance by one entry. Fails at the end position.
    pub fn increment(&mut self) -> Result<()> {
        let span = self.span()?;
        self.offset = span.next_offset();
        self.ordinal += 1;
        Ok(())
    }

    pub fn key(&self) -> Result<&'r [u8]> {
        let span = self.span()?;
        Ok(self.reader.bytes(span.key))
    }

    pub fn value(&self) -> Result<&'r [u8]> {
        let span = self.span()?;
        Ok(self.reader.bytes(span.value))
    }

    pub fn entry(&self) -> Result<(&'r [u8], &'r [u8])> {
        let span = self.span()?;
        Ok((self.reader.bytes(span.key), self.reader.bytes(span.value)))
    }

    /// Copy the current key into `buffer`, returning its length.
    pub fn key_copy_to(&self, buffer: &mut [u8]) -> Result<usize> {
        copy_into(self.key()?, buffer)
    }

    /// Copy the current value into `buffer`, returning its length.
    pub fn value_copy_to(&self, buffer: &mut [u8]) -> Result<usize> {
        copy_into(self.value()?, buffer)
    }

    /// Iterate from this position to the end.
    pub fn entries(self) -> Entries<'r> {
        Entries {
            cursor: self,
            failed: false,
        }
    }

    pub(crate) fn position(&self) -> CursorPosition {
        CursorPosition {
            ordinal: self.ordinal,
            offset: self.offset,
        }
    }

    fn span(&self) -> Result<RecordSpan> {
        if self.is_end() {
            return Err(PbtError::CursorOutOfRange {
                ordinal: self.ordinal,
                len: self.reader.len(),
            });
        }
        self.reader.record(self.offset)
    }
}

impl PartialEq for Cursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.reader, other.reader) && self.ordinal == other.ordinal
    }
}

impl Eq for Cursor<'_> {}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("table", &self.reader.path())
            .field("ordinal", &self.ordinal)
            .field("len", &self.reader.len())
            .finish()
    }
}

/// Iterator over `(key, value)` pairs from a cursor to the end of its table.
///
/// Stops after yielding the first error.
pub struct Entries<'r> {
    cursor: Cursor<'r>,
    failed: bool,
}

impl<'r> Iterator for Entries<'r> {
    type Item = Result<(&'r [u8], &'r [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_end() {
            return None;
        }
        let item = self.cursor.entry().and_then(|entry| {
            self.cursor.increment()?;
            Ok(entry)
        });
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.cursor.reader.len().saturating_sub(self.cursor.ordinal);
        (0, usize::try_from(remaining).ok())
    }
}

/// Copy `src` into the front of `buffer`, failing if it does not fit.
pub(crate) fn copy_into(src: &[u8], buffer: &mut [u8]) -> Result<usize> {
    let Some(dest) = buffer.get_mut(..src.len()) else {
        return Err(PbtError::BufferTooSmall {
            needed: src.len(),
            available: buffer.len(),
        });
    };
    dest.copy_from_slice(src);
    Ok(src.len())
}
