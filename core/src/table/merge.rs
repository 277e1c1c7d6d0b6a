//! K-way merge of finished tables into a writer.
//!
//! One cursor per input is kept in a min-heap keyed by its current key. When
//! several inputs hold the same key, the entry from the input that comes last
//! in the argument list is written and every tied cursor moves past the key.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{PbtError, Result};

use super::comparator::Comparator;
use super::cursor::Cursor;
use super::reader::TableReader;
use super::writer::TableWriter;

/// Current head of one input, ordered for a min-heap.
struct HeapEntry<'a> {
    key: &'a [u8],
    source_idx: usize,
    comparator: &'a dyn Comparator,
}

impl Eq for HeapEntry<'_> {}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smallest key on top; for equal keys the later source comes out first.
        match self.comparator.compare(other.key, self.key) {
            Ordering::Equal => self.source_idx.cmp(&other.source_idx),
            ord => ord,
        }
    }
}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TableWriter {
    /// Append the sorted union of `readers` through the normal `add` path.
    ///
    /// Every reader must use this writer's comparator; otherwise nothing is
    /// written. Keys already added to this writer must sort before the
    /// merged keys. Returns the number of entries written.
    pub fn merge(&mut self, readers: &[&TableReader]) -> Result<u64> {
        self.ensure_building()?;

        let comparator = Arc::clone(self.comparator());
        let expected = comparator.config();
        for reader in readers {
            if reader.comparator_config() != &expected {
                return Err(PbtError::ComparatorMismatch {
                    expected: expected.to_string(),
                    found: reader.comparator_config().to_string(),
                });
            }
        }

        tracing::debug!(
            path = %self.path().display(),
            inputs = readers.len(),
            total_entries = readers.iter().map(|r| r.len()).sum::<u64>(),
            "merging tables"
        );

        let mut cursors: Vec<Cursor<'_>> = readers.iter().map(|reader| reader.begin()).collect();
        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for (source_idx, cursor) in cursors.iter().enumerate() {
            if !cursor.is_end() {
                heap.push(HeapEntry {
                    key: cursor.key()?,
                    source_idx,
                    comparator: comparator.as_ref(),
                });
            }
        }

        let mut written = 0u64;
        while let Some(winner) = heap.pop() {
            let value = cursors[winner.source_idx].value()?;
            advance(&mut cursors, &mut heap, winner.source_idx, comparator.as_ref())?;

            while let Some(tied) = heap.peek() {
                if comparator.compare(tied.key, winner.key) != Ordering::Equal {
                    break;
                }
                let source_idx = tied.source_idx;
                heap.pop();
                advance(&mut cursors, &mut heap, source_idx, comparator.as_ref())?;
            }

            self.add(winner.key, value)?;
            written += 1;
        }

        tracing::info!(path = %self.path().display(), inputs = readers.len(), written, "merged tables");
        Ok(written)
    }
}

/// Move one input forward and put its new head back on the heap.
fn advance<'a>(
    cursors: &mut [Cursor<'a>],
    heap: &mut BinaryHeap<HeapEntry<'a>>,
    source_idx: usize,
    comparator: &'a dyn Comparator,
) -> Result<()> {
    let cursor = &mut cursors[source_idx];
    cursor.increment()?;
    if !cursor.is_end() {
        heap.push(HeapEntry {
            key: cursor.key()?,
            source_idx,
            comparator,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::comparator::{FixedWidthUint, Lexicographic};
    use crate::table::options::TableOptions;
    use rand::Rng;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn build(path: &Path, entries: &[(&str, &str)]) -> TableReader {
        let mut writer = TableWriter::create(path).unwrap();
        for (key, value) in entries {
            writer.add(key.as_bytes(), value.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        TableReader::open(path).unwrap()
    }

    fn collect(path: &PathBuf) -> Vec<(String, String)> {
        let reader = TableReader::open(path).unwrap();
        reader
            .iter()
            .map(|r| {
                let (k, v) = r.unwrap();
                (
                    String::from_utf8(k.to_vec()).unwrap(),
                    String::from_utf8(v.to_vec()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_merge_disjoint_tables() {
        let dir = tempdir().unwrap();
        let first = build(&dir.path().join("w1.pbt"), &[("key-1", "value-1"), ("key-2", "value-2")]);
        let second = build(&dir.path().join("w2.pbt"), &[("key-3", "value-3"), ("key-4", "value-4")]);

        let target = dir.path().join("w3.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        assert_eq!(writer.merge(&[&first, &second]).unwrap(), 4);
        writer.finish().unwrap();

        assert_eq!(
            collect(&target),
            vec![
                ("key-1".to_string(), "value-1".to_string()),
                ("key-2".to_string(), "value-2".to_string()),
                ("key-3".to_string(), "value-3".to_string()),
                ("key-4".to_string(), "value-4".to_string()),
            ]
        );
    }

    #[test]
    fn test_merge_interleaved_tables() {
        let dir = tempdir().unwrap();
        let a = build(&dir.path().join("a.pbt"), &[("a", "1"), ("d", "4"), ("g", "7")]);
        let b = build(&dir.path().join("b.pbt"), &[("b", "2"), ("e", "5")]);
        let c = build(&dir.path().join("c.pbt"), &[("c", "3"), ("f", "6"), ("h", "8"), ("i", "9")]);

        let target = dir.path().join("abc.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        writer.merge(&[&a, &b, &c]).unwrap();
        writer.finish().unwrap();

        let keys: Vec<_> = collect(&target).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
    }

    #[test]
    fn test_duplicate_keys_take_last_reader() {
        let dir = tempdir().unwrap();
        let older = build(&dir.path().join("older.pbt"), &[("a", "old-a"), ("k", "old-k"), ("z", "old-z")]);
        let middle = build(&dir.path().join("middle.pbt"), &[("k", "mid-k"), ("m", "mid-m")]);
        let newer = build(&dir.path().join("newer.pbt"), &[("k", "new-k"), ("z", "new-z")]);

        let target = dir.path().join("compacted.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        assert_eq!(writer.merge(&[&older, &middle, &newer]).unwrap(), 4);
        writer.finish().unwrap();

        assert_eq!(
            collect(&target),
            vec![
                ("a".to_string(), "old-a".to_string()),
                ("k".to_string(), "new-k".to_string()),
                ("m".to_string(), "mid-m".to_string()),
                ("z".to_string(), "new-z".to_string()),
            ]
        );

        // Reversing the argument order flips the winner.
        let target = dir.path().join("reversed.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        writer.merge(&[&newer, &middle, &older]).unwrap();
        writer.finish().unwrap();
        let reader = TableReader::open(&target).unwrap();
        assert_eq!(reader.get(b"k").unwrap(), Some(&b"old-k"[..]));
        assert_eq!(reader.get(b"z").unwrap(), Some(&b"old-z"[..]));
    }

    #[test]
    fn test_merge_same_table_twice() {
        let dir = tempdir().unwrap();
        let table = build(&dir.path().join("same.pbt"), &[("x", "1"), ("y", "2")]);

        let target = dir.path().join("twice.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        assert_eq!(writer.merge(&[&table, &table]).unwrap(), 2);
        assert_eq!(writer.finish().unwrap().entry_count, 2);
    }

    #[test]
    fn test_merge_comparator_mismatch_writes_nothing() {
        let dir = tempdir().unwrap();
        let lexical = build(&dir.path().join("lex.pbt"), &[("a", "1")]);

        let numeric_path = dir.path().join("num.pbt");
        let options = TableOptions::with_comparator(Arc::new(FixedWidthUint::u32_le()));
        let mut numeric = TableWriter::with_options(&numeric_path, options).unwrap();
        numeric.add(&7u32.to_le_bytes(), b"7").unwrap();
        numeric.finish().unwrap();
        let numeric = TableReader::open(&numeric_path).unwrap();

        let mut writer = TableWriter::create(dir.path().join("mixed.pbt")).unwrap();
        let err = writer.merge(&[&lexical, &numeric]).unwrap_err();
        assert!(matches!(err, PbtError::ComparatorMismatch { .. }));
        assert_eq!(writer.entry_count(), 0);
    }

    #[test]
    fn test_merge_after_adds_must_stay_ordered() {
        let dir = tempdir().unwrap();
        let table = build(&dir.path().join("tail.pbt"), &[("m", "1"), ("n", "2")]);

        let target = dir.path().join("prefixed.pbt");
        let mut writer = TableWriter::create(&target).unwrap();
        writer.add(b"a", b"0").unwrap();
        writer.merge(&[&table]).unwrap();
        writer.add(b"z", b"3").unwrap();
        assert_eq!(writer.finish().unwrap().entry_count, 4);

        let mut writer = TableWriter::create(dir.path().join("overlap.pbt")).unwrap();
        writer.add(b"m", b"0").unwrap();
        assert!(matches!(writer.merge(&[&table]), Err(PbtError::OutOfOrderKey { .. })));
    }

    #[test]
    fn test_merge_into_finished_writer() {
        let dir = tempdir().unwrap();
        let table = build(&dir.path().join("src.pbt"), &[("a", "1")]);
        let mut writer = TableWriter::create(dir.path().join("dst.pbt")).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.merge(&[&table]), Err(PbtError::AlreadyFinished)));
    }

    #[test]
    fn test_merge_randomized_matches_btreemap() {
        let dir = tempdir().unwrap();
        let mut rng = rand::thread_rng();
        let mut expected: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut readers = Vec::new();

        for table in 0..5 {
            let mut entries = BTreeMap::new();
            for _ in 0..rng.gen_range(0..200) {
                let key = format!("{:04}", rng.gen_range(0..500)).into_bytes();
                entries.insert(key, format!("t{table}").into_bytes());
            }
            let path = dir.path().join(format!("input_{table}.pbt"));
            let options = TableOptions {
                index_interval: rng.gen_range(1..16),
                ..TableOptions::default()
            };
            let mut writer = TableWriter::with_options(&path, options).unwrap();
            for (key, value) in &entries {
                writer.add(key, value).unwrap();
            }
            writer.finish().unwrap();
            readers.push(TableReader::open(&path).unwrap());
            // Later tables overwrite earlier ones.
            expected.extend(entries);
        }

        let target = dir.path().join("merged.pbt");
        let mut writer = TableWriter::with_options(&target, TableOptions::with_comparator(Arc::new(Lexicographic))).unwrap();
        let inputs: Vec<&TableReader> = readers.iter().collect();
        assert_eq!(writer.merge(&inputs).unwrap(), expected.len() as u64);
        writer.finish().unwrap();

        let merged = TableReader::open(&target).unwrap();
        let actual: Vec<_> = merged.iter().map(|r| r.unwrap()).collect();
        let wanted: Vec<_> = expected.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        assert_eq!(actual, wanted);
    }
}
