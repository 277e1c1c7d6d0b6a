//! Handle registry for callers that cannot hold Rust references.
//!
//! Writers, readers and cursors are addressed by small typed integer tokens.
//! The registry owns the underlying resources: writers sit behind a mutex so a
//! single token serializes its callers, readers are shared through `Arc`, and
//! cursors are stored as positions that are rebuilt against their reader on
//! every call. Closing a reader drops the cursors that point into it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{PbtError, Result};
use crate::table::{
    Comparator, Cursor, CursorPosition, TableOptions, TableReader, TableSummary, TableWriter,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WriterHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReaderHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CursorHandle(u64);

impl WriterHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl ReaderHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl CursorHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
struct CursorSlot {
    reader: ReaderHandle,
    position: CursorPosition,
}

/// Owns every open writer, reader and cursor and hands out tokens for them.
#[derive(Default)]
pub struct TableRegistry {
    next_id: AtomicU64,
    writers: DashMap<WriterHandle, Arc<Mutex<TableWriter>>>,
    readers: DashMap<ReaderHandle, Arc<TableReader>>,
    cursors: DashMap<CursorHandle, CursorSlot>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // --- writers ---

    pub fn create_writer<P: AsRef<Path>>(&self, path: P) -> Result<WriterHandle> {
        self.create_writer_with(path, TableOptions::default())
    }

    pub fn create_writer_with<P: AsRef<Path>>(&self, path: P, options: TableOptions) -> Result<WriterHandle> {
        let writer = TableWriter::with_options(path, options)?;
        let handle = WriterHandle(self.allocate_id());
        self.writers.insert(handle, Arc::new(Mutex::new(writer)));
        Ok(handle)
    }

    pub fn writer_add(&self, handle: WriterHandle, key: &[u8], value: &[u8]) -> Result<()> {
        self.writer(handle)?.lock().add(key, value)
    }

    pub fn writer_merge(&self, handle: WriterHandle, readers: &[ReaderHandle]) -> Result<u64> {
        let writer = self.writer(handle)?;
        let inputs = readers
            .iter()
            .map(|&reader| self.reader(reader))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&TableReader> = inputs.iter().map(Arc::as_ref).collect();
        writer.lock().merge(&refs)
    }

    pub fn writer_finish(&self, handle: WriterHandle) -> Result<TableSummary> {
        self.writer(handle)?.lock().finish()
    }

    /// Release a writer. An unfinished writer discards its partial output.
    pub fn close_writer(&self, handle: WriterHandle) -> Result<()> {
        self.writers
            .remove(&handle)
            .map(|_| ())
            .ok_or(PbtError::UnknownHandle {
                kind: "writer",
                id: handle.0,
            })
    }

    // --- readers ---

    pub fn open_reader<P: AsRef<Path>>(&self, path: P) -> Result<ReaderHandle> {
        self.insert_reader(TableReader::open(path)?)
    }

    pub fn open_reader_with<P: AsRef<Path>>(&self, path: P, comparator: Arc<dyn Comparator>) -> Result<ReaderHandle> {
        self.insert_reader(TableReader::open_with_comparator(path, comparator)?)
    }

    pub fn reader_get(&self, handle: ReaderHandle, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.reader(handle)?.get(key)?.map(<[u8]>::to_vec))
    }

    pub fn reader_get_copy_to(&self, handle: ReaderHandle, key: &[u8], buffer: &mut [u8]) -> Result<Option<usize>> {
        self.reader(handle)?.get_copy_to(key, buffer)
    }

    pub fn reader_at(&self, handle: ReaderHandle, ordinal: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.reader(handle)?.at(ordinal)?.map(<[u8]>::to_vec))
    }

    pub fn reader_len(&self, handle: ReaderHandle) -> Result<u64> {
        Ok(self.reader(handle)?.len())
    }

    pub fn reader_begin(&self, handle: ReaderHandle) -> Result<CursorHandle> {
        let reader = self.reader(handle)?;
        self.insert_cursor(handle, reader.begin())
    }

    pub fn reader_end(&self, handle: ReaderHandle) -> Result<CursorHandle> {
        let reader = self.reader(handle)?;
        self.insert_cursor(handle, reader.end())
    }

    pub fn reader_seek(&self, handle: ReaderHandle, key: &[u8]) -> Result<CursorHandle> {
        let reader = self.reader(handle)?;
        let cursor = reader.seek(key)?;
        self.insert_cursor(handle, cursor)
    }

    pub fn reader_seek_at(&self, handle: ReaderHandle, ordinal: u64) -> Result<CursorHandle> {
        let reader = self.reader(handle)?;
        let cursor = reader.seek_at(ordinal)?;
        self.insert_cursor(handle, cursor)
    }

    /// Release a reader and every cursor created from it.
    pub fn close_reader(&self, handle: ReaderHandle) -> Result<()> {
        self.readers.remove(&handle).ok_or(PbtError::UnknownHandle {
            kind: "reader",
            id: handle.0,
        })?;
        self.cursors.retain(|_, slot| slot.reader != handle);
        Ok(())
    }

    // --- cursors ---

    pub fn cursor_increment(&self, handle: CursorHandle) -> Result<()> {
        let slot = self.cursor_slot(handle)?;
        let reader = self.reader(slot.reader)?;
        let mut cursor = reader.cursor_at_position(slot.position);
        cursor.increment()?;
        if let Some(mut stored) = self.cursors.get_mut(&handle) {
            stored.position = cursor.position();
        }
        Ok(())
    }

    pub fn cursor_equals(&self, a: CursorHandle, b: CursorHandle) -> Result<bool> {
        let a = self.cursor_slot(a)?;
        let b = self.cursor_slot(b)?;
        Ok(a.reader == b.reader && a.position.ordinal == b.position.ordinal)
    }

    pub fn cursor_get_key(&self, handle: CursorHandle) -> Result<Vec<u8>> {
        self.with_cursor(handle, |cursor| cursor.key().map(<[u8]>::to_vec))
    }

    pub fn cursor_get_key_copy_to(&self, handle: CursorHandle, buffer: &mut [u8]) -> Result<usize> {
        self.with_cursor(handle, |cursor| cursor.key_copy_to(buffer))
    }

    pub fn cursor_get_value(&self, handle: CursorHandle) -> Result<Vec<u8>> {
        self.with_cursor(handle, |cursor| cursor.value().map(<[u8]>::to_vec))
    }

    pub fn cursor_get_value_copy_to(&self, handle: CursorHandle, buffer: &mut [u8]) -> Result<usize> {
        self.with_cursor(handle, |cursor| cursor.value_copy_to(buffer))
    }

    pub fn close_cursor(&self, handle: CursorHandle) -> Result<()> {
        self.cursors
            .remove(&handle)
            .map(|_| ())
            .ok_or(PbtError::UnknownHandle {
                kind: "cursor",
                id: handle.0,
            })
    }

    // --- internals ---

    fn writer(&self, handle: WriterHandle) -> Result<Arc<Mutex<TableWriter>>> {
        self.writers
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PbtError::UnknownHandle {
                kind: "writer",
                id: handle.0,
            })
    }

    fn reader(&self, handle: ReaderHandle) -> Result<Arc<TableReader>> {
        self.readers
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PbtError::UnknownHandle {
                kind: "reader",
                id: handle.0,
            })
    }

    fn insert_reader(&self, reader: TableReader) -> Result<ReaderHandle> {
        let handle = ReaderHandle(self.allocate_id());
        self.readers.insert(handle, Arc::new(reader));
        Ok(handle)
    }

    /// Register a cursor, unless `reader` was closed while it was being created.
    fn insert_cursor(&self, reader: ReaderHandle, cursor: Cursor<'_>) -> Result<CursorHandle> {
        let handle = CursorHandle(self.allocate_id());
        self.cursors.insert(
            handle,
            CursorSlot {
                reader,
                position: cursor.position(),
            },
        );
        // `close_reader` removes the reader before sweeping cursors, so a cursor
        // inserted after that sweep is caught here.
        if !self.readers.contains_key(&reader) {
            self.cursors.remove(&handle);
            return Err(PbtError::UnknownHandle {
                kind: "reader",
                id: reader.0,
            });
        }
        Ok(handle)
    }

    fn cursor_slot(&self, handle: CursorHandle) -> Result<CursorSlot> {
        self.cursors
            .get(&handle)
            .map(|entry| *entry.value())
            .ok_or(PbtError::UnknownHandle {
                kind: "cursor",
                id: handle.0,
            })
    }

    fn with_cursor<T>(&self, handle: CursorHandle, f: impl FnOnce(&Cursor<'_>) -> Result<T>) -> Result<T> {
        let slot = self.cursor_slot(handle)?;
        let reader = self.reader(slot.reader)?;
        let cursor = reader.cursor_at_position(slot.position);
        f(&cursor)
    }
}
