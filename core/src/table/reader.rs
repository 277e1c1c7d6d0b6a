//! Read-only access to a finished table.
//!
//! The file is memory-mapped and fully validated on open (header, trailer,
//! checksum, comparator, sparse index). Lookups binary-search the in-memory
//! index samples and then scan at most `index_interval` records.

use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::constants::{HEADER_SIZE, TRAILER_SIZE, UNCHECKED_TAIL};
use crate::error::{PbtError, Result};

use super::comparator::{self, Comparator, ComparatorConfig};
use super::cursor::{Cursor, CursorPosition, Entries, copy_into};
use super::format::{
    IndexSample, RecordSpan, Trailer, check_header, decode_comparator_block, decode_index,
    decode_record,
};

/// Reader over one immutable table file. Safe to share across threads.
pub struct TableReader {
    path: PathBuf,
    mmap: Mmap,
    comparator: Arc<dyn Comparator>,
    comparator_config: ComparatorConfig,
    entry_count: u64,
    index_interval: u32,
    /// End of the entry region, which is where the index starts.
    entries_end: usize,
    samples: Vec<IndexSample>,
}

impl TableReader {
    /// Open a table, resolving its persisted comparator among the built-ins.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_inner(path.as_ref(), None)
    }

    /// Open a table that must have been written with `comparator`.
    pub fn open_with_comparator<P: AsRef<Path>>(path: P, comparator: Arc<dyn Comparator>) -> Result<Self> {
        Self::open_inner(path.as_ref(), Some(comparator))
    }

    fn open_inner(path: &Path, comparator: Option<Arc<dyn Comparator>>) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PbtError::NotFound(path.to_path_buf()),
            _ => PbtError::Io(e),
        })?;

        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE + TRAILER_SIZE {
            return Err(PbtError::corrupt(format!("file of {file_len} bytes is too small")));
        }
        // SAFETY: finished tables are never modified in place; writers only
        // ever rename a complete file onto the path.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        check_header(&mmap)?;
        let trailer = Trailer::read_from(&mmap)?;

        let checked_len = mmap.len() - UNCHECKED_TAIL as usize;
        let actual = crc32fast::hash(&mmap[..checked_len]);
        if actual != trailer.checksum {
            return Err(PbtError::corrupt(format!(
                "checksum mismatch: stored {:#010x}, computed {actual:#010x}",
                trailer.checksum
            )));
        }

        let layout = Layout::validate(&trailer, mmap.len())?;

        let comparator_config = decode_comparator_block(&mmap, layout.comparator.clone())?;
        let comparator = match comparator {
            Some(given) => {
                let expected = given.config();
                if expected != comparator_config {
                    return Err(PbtError::ComparatorMismatch {
                        expected: expected.to_string(),
                        found: comparator_config.to_string(),
                    });
                }
                given
            }
            None => comparator::resolve(&comparator_config).ok_or_else(|| {
                PbtError::ComparatorMismatch {
                    expected: "a built-in comparator".to_string(),
                    found: comparator_config.to_string(),
                }
            })?,
        };

        let samples = decode_index(&mmap, layout.index.clone())?;
        validate_samples(&samples, &trailer, layout.index.start)?;

        tracing::debug!(
            path = %path.display(),
            entries = trailer.entry_count,
            index_samples = samples.len(),
            comparator = %comparator_config,
            "opened table"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            comparator,
            comparator_config,
            entry_count: trailer.entry_count,
            index_interval: trailer.index_interval,
            entries_end: layout.index.start,
            samples,
        })
    }

    /// Value stored under `key`, or `None` if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        Ok(self.get_entry(key)?.map(|(_, value)| value))
    }

    pub fn get_entry(&self, key: &[u8]) -> Result<Option<(&[u8], &[u8])>> {
        let cursor = self.seek(key)?;
        if cursor.is_end() {
            return Ok(None);
        }
        let (found, value) = cursor.entry()?;
        if self.comparator.compare(found, key) == Ordering::Equal {
            Ok(Some((found, value)))
        } else {
            Ok(None)
        }
    }

    /// Copy the value stored under `key` into `buffer`, returning its length.
    pub fn get_copy_to(&self, key: &[u8], buffer: &mut [u8]) -> Result<Option<usize>> {
        match self.get(key)? {
            Some(value) => copy_into(value, buffer).map(Some),
            None => Ok(None),
        }
    }

    /// Value at `ordinal`, or `None` when `ordinal >= len()`.
    pub fn at(&self, ordinal: u64) -> Result<Option<&[u8]>> {
        Ok(self.entry_at(ordinal)?.map(|(_, value)| value))
    }

    pub fn entry_at(&self, ordinal: u64) -> Result<Option<(&[u8], &[u8])>> {
        if ordinal >= self.entry_count {
            return Ok(None);
        }
        self.seek_at(ordinal)?.entry().map(Some)
    }

    pub fn begin(&self) -> Cursor<'_> {
        Cursor::new(self, 0, HEADER_SIZE as usize)
    }

    pub fn end(&self) -> Cursor<'_> {
        Cursor::new(self, self.entry_count, self.entries_end)
    }

    /// Cursor at the first entry whose key is not less than `key`, or `end()`.
    pub fn seek(&self, key: &[u8]) -> Result<Cursor<'_>> {
        let below = self
            .samples
            .partition_point(|sample| self.comparator.compare(self.bytes(sample.key.clone()), key) == Ordering::Less);
        if below == 0 {
            return Ok(self.begin());
        }

        // Sample `below` (if any) is >= key, so this scan stops within one interval.
        let mut cursor = self.cursor_at_sample(below - 1);
        while !cursor.is_end() {
            if self.comparator.compare(cursor.key()?, key) != Ordering::Less {
                break;
            }
            cursor.increment()?;
        }
        Ok(cursor)
    }

    /// Cursor at `ordinal`, clamped to `[0, len()]`.
    pub fn seek_at(&self, ordinal: u64) -> Result<Cursor<'_>> {
        if ordinal >= self.entry_count {
            return Ok(self.end());
        }
        let interval = self.index_interval as u64;
        let mut cursor = self.cursor_at_sample((ordinal / interval) as usize);
        for _ in 0..ordinal % interval {
            cursor.increment()?;
        }
        Ok(cursor)
    }

    /// Iterate every entry in order.
    pub fn iter(&self) -> Entries<'_> {
        self.begin().entries()
    }

    /// Iterate entries whose keys are not less than `key`.
    pub fn range_from(&self, key: &[u8]) -> Result<Entries<'_>> {
        Ok(self.seek(key)?.entries())
    }

    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn index_interval(&self) -> u32 {
        self.index_interval
    }

    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    pub fn comparator_config(&self) -> &ComparatorConfig {
        &self.comparator_config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn record(&self, offset: usize) -> Result<RecordSpan> {
        decode_record(&self.mmap, offset, self.entries_end)
    }

    /// Ranges handed out here were bounds-checked when they were decoded.
    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.mmap[range]
    }

    pub(crate) fn cursor_at_position(&self, position: CursorPosition) -> Cursor<'_> {
        Cursor::new(self, position.ordinal, position.offset)
    }

    fn cursor_at_sample(&self, sample: usize) -> Cursor<'_> {
        let ordinal = sample as u64 * self.index_interval as u64;
        Cursor::new(self, ordinal, self.samples[sample].record_offset as usize)
    }
}

impl fmt::Debug for TableReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableReader")
            .field("path", &self.path)
            .field("entries", &self.entry_count)
            .field("index_interval", &self.index_interval)
            .field("comparator", &self.comparator_config)
            .finish()
    }
}

/// Byte ranges of the index and comparator block, checked against the file size.
struct Layout {
    index: Range<usize>,
    comparator: Range<usize>,
}

impl Layout {
    fn validate(trailer: &Trailer, file_len: usize) -> Result<Self> {
        let trailer_start = file_len as u64 - TRAILER_SIZE;
        if trailer.index_interval == 0 {
            return Err(PbtError::corrupt("index interval is zero"));
        }
        if trailer.index_offset < HEADER_SIZE
            || trailer.index_offset.checked_add(trailer.index_len) != Some(trailer.comparator_offset)
            || trailer.comparator_offset > trailer_start
        {
            return Err(PbtError::corrupt("trailer offsets are inconsistent"));
        }
        // Every record takes at least two bytes.
        if trailer.entry_count > (trailer.index_offset - HEADER_SIZE) / 2 {
            return Err(PbtError::corrupt("entry count exceeds entry region"));
        }
        Ok(Self {
            index: trailer.index_offset as usize..trailer.comparator_offset as usize,
            comparator: trailer.comparator_offset as usize..trailer_start as usize,
        })
    }
}

fn validate_samples(samples: &[IndexSample], trailer: &Trailer, entries_end: usize) -> Result<()> {
    let expected = trailer.entry_count.div_ceil(trailer.index_interval as u64);
    if samples.len() as u64 != expected {
        return Err(PbtError::corrupt(format!(
            "index has {} samples, expected {expected}",
            samples.len()
        )));
    }
    if trailer.entry_count == 0 && entries_end != HEADER_SIZE as usize {
        return Err(PbtError::corrupt("empty table with a non-empty entry region"));
    }

    let mut previous: Option<u64> = None;
    for (i, sample) in samples.iter().enumerate() {
        let offset = sample.record_offset;
        let in_region = offset >= HEADER_SIZE && offset < entries_end as u64;
        let ascending = previous.is_none_or(|prev| offset > prev);
        let anchored = i != 0 || offset == HEADER_SIZE;
        if !(in_region && ascending && anchored) {
            return Err(PbtError::corrupt(format!("index sample {i} has invalid offset {offset}")));
        }
        previous = Some(offset);
    }
    Ok(())
}
