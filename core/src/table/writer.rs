//! Table builder.
//!
//! Entries are streamed into `<path>.tmp` as they are added. `finish` appends
//! the sparse index, the comparator block and the checksummed trailer, then
//! renames the temp file onto `path`. Until then nothing a reader could open
//! exists at `path`.

use std::cmp::Ordering;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::TEMP_EXTENSION;
use crate::error::{PbtError, Result};

use super::comparator::Comparator;
use super::format::{
    Trailer, comparator_block_len, record_len, write_comparator_block, write_header,
    write_index_sample, write_record,
};
use super::options::TableOptions;

/// Metadata describing a finished table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub path: PathBuf,
    pub entry_count: u64,
    pub index_samples: u64,
    pub file_size: u64,
    pub first_key: Option<Vec<u8>>,
    pub last_key: Option<Vec<u8>>,
}

/// Buffered file writer that tracks its position and a running CRC-32.
struct ChecksumWriter {
    inner: BufWriter<File>,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl ChecksumWriter {
    fn new(file: File) -> Self {
        Self {
            inner: BufWriter::new(file),
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn into_file(self) -> io::Result<File> {
        self.inner.into_inner().map_err(|e| e.into_error())
    }
}

impl Write for ChecksumWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Everything owned while the table is still accepting entries.
struct Builder {
    out: ChecksumWriter,
    temp_path: PathBuf,
    last_key: Option<Vec<u8>>,
    /// (key, record offset) for every `index_interval`th entry.
    samples: Vec<(Vec<u8>, u64)>,
}

impl Builder {
    fn seal(mut self, path: &Path, options: &TableOptions, entry_count: u64) -> Result<TableSummary> {
        let index_offset = self.out.position;
        for (key, record_offset) in &self.samples {
            write_index_sample(&mut self.out, key, *record_offset)?;
        }
        let index_len = self.out.position - index_offset;

        let config = options.comparator.config();
        let comparator_offset = self.out.position;
        write_comparator_block(&mut self.out, &config)?;
        debug_assert_eq!(self.out.position - comparator_offset, comparator_block_len(&config));

        let mut trailer = Trailer {
            entry_count,
            index_offset,
            index_len,
            comparator_offset,
            index_interval: options.index_interval,
            checksum: 0,
        };
        trailer.write_checked_fields(&mut self.out)?;
        trailer.checksum = self.out.checksum();
        trailer.write_seal(&mut self.out)?;

        let file_size = self.out.position;
        let file = self.out.into_file()?;
        if options.sync_on_finish {
            file.sync_all()?;
        }
        drop(file);
        fs::rename(&self.temp_path, path)?;

        Ok(TableSummary {
            path: path.to_path_buf(),
            entry_count,
            index_samples: self.samples.len() as u64,
            file_size,
            first_key: self.samples.into_iter().next().map(|(key, _)| key),
            last_key: self.last_key,
        })
    }
}

enum WriterState {
    Building(Builder),
    Finished,
    /// A write into the entry region failed; its bytes cannot be trusted.
    Failed,
}

/// Builds one immutable table file from entries added in strictly increasing key order.
pub struct TableWriter {
    path: PathBuf,
    options: TableOptions,
    entry_count: u64,
    state: WriterState,
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("path", &self.path)
            .field("entry_count", &self.entry_count)
            .finish_non_exhaustive()
    }
}

impl TableWriter {
    /// Start a table at `path` using the default options.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, TableOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: TableOptions) -> Result<Self> {
        if options.index_interval == 0 {
            return Err(PbtError::InvalidOptions("index_interval must be at least 1".to_string()));
        }

        let path = path.as_ref().to_path_buf();
        let temp_path = temp_path_for(&path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        let mut out = ChecksumWriter::new(file);
        write_header(&mut out)?;

        tracing::debug!(
            path = %path.display(),
            comparator = %options.comparator.config(),
            index_interval = options.index_interval,
            "created table writer"
        );

        Ok(Self {
            path,
            options,
            entry_count: 0,
            state: WriterState::Building(Builder {
                out,
                temp_path,
                last_key: None,
                samples: Vec::new(),
            }),
        })
    }

    /// Append one entry. `key` must sort strictly after the previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let builder = match &mut self.state {
            WriterState::Building(builder) => builder,
            WriterState::Finished => return Err(PbtError::AlreadyFinished),
            WriterState::Failed => return Err(PbtError::WriterFailed),
        };

        if let Some(previous) = &builder.last_key {
            if self.options.comparator.compare(key, previous) != Ordering::Greater {
                return Err(PbtError::OutOfOrderKey {
                    previous_len: previous.len(),
                    key_len: key.len(),
                });
            }
        }

        let record_offset = builder.out.position;
        if let Err(e) = write_record(&mut builder.out, key, value) {
            self.abandon();
            return Err(e);
        }
        debug_assert_eq!(builder.out.position - record_offset, record_len(key, value));

        if self.entry_count % self.options.index_interval as u64 == 0 {
            builder.samples.push((key.to_vec(), record_offset));
        }
        self.entry_count += 1;

        let last = builder.last_key.get_or_insert_with(Vec::new);
        last.clear();
        last.extend_from_slice(key);
        Ok(())
    }

    /// Write the index and trailer and move the file into place.
    ///
    /// The writer is finished afterwards even if this fails; a failed finish
    /// removes its temp file and never leaves an openable table behind.
    pub fn finish(&mut self) -> Result<TableSummary> {
        let builder = match std::mem::replace(&mut self.state, WriterState::Finished) {
            WriterState::Building(builder) => builder,
            WriterState::Finished => return Err(PbtError::AlreadyFinished),
            WriterState::Failed => {
                self.state = WriterState::Failed;
                return Err(PbtError::WriterFailed);
            }
        };

        let temp_path = builder.temp_path.clone();
        match builder.seal(&self.path, &self.options, self.entry_count) {
            Ok(summary) => {
                tracing::info!(
                    path = %summary.path.display(),
                    entries = summary.entry_count,
                    index_samples = summary.index_samples,
                    bytes = summary.file_size,
                    "finished table"
                );
                Ok(summary)
            }
            Err(e) => {
                remove_temp(&temp_path);
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub(crate) fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.options.comparator
    }

    /// Number of entries added so far. Still valid after `finish`.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, WriterState::Finished)
    }

    pub(crate) fn ensure_building(&self) -> Result<()> {
        match self.state {
            WriterState::Building(_) => Ok(()),
            WriterState::Finished => Err(PbtError::AlreadyFinished),
            WriterState::Failed => Err(PbtError::WriterFailed),
        }
    }

    /// Drop the partial output after a failed write. Later calls report `WriterFailed`.
    fn abandon(&mut self) {
        if let WriterState::Building(builder) = std::mem::replace(&mut self.state, WriterState::Failed) {
            tracing::warn!(path = %self.path.display(), entries = self.entry_count, "abandoning table after failed write");
            let Builder { out, temp_path, .. } = builder;
            drop(out);
            remove_temp(&temp_path);
        }
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if let WriterState::Building(builder) = &self.state {
            tracing::debug!(path = %self.path.display(), "abandoning unfinished table");
            remove_temp(&builder.temp_path);
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(TEMP_EXTENSION);
    PathBuf::from(name)
}

fn remove_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove temp table file");
        }
    }
}
