//! Benchmark comparison: PBT vs Sled vs LevelDB
//!
//! Run with: cargo bench
//! Results will be in target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pbt_core::{TableReader, TableWriter};
use rand::Rng;
use tempfile::TempDir;

// ============================================================================
// Store Wrappers
// ============================================================================

/// A store that is bulk loaded once in key order and then only read.
trait BulkStore {
    fn load(entries: &[(Vec<u8>, Vec<u8>)]) -> Self;
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

// --- PBT ---
struct PbtStore {
    reader: TableReader,
    #[allow(dead_code)]
    dir: TempDir,
}

impl BulkStore for PbtStore {
    fn load(entries: &[(Vec<u8>, Vec<u8>)]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.pbt");
        let mut writer = TableWriter::create(&path).unwrap();
        for (key, value) in entries {
            writer.add(key, value).unwrap();
        }
        writer.finish().unwrap();
        let reader = TableReader::open(&path).unwrap();
        Self { reader, dir }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.reader.get(key).unwrap().map(<[u8]>::to_vec)
    }
}

// --- Sled ---
struct SledStore {
    db: sled::Db,
    #[allow(dead_code)]
    dir: TempDir,
}

impl BulkStore for SledStore {
    fn load(entries: &[(Vec<u8>, Vec<u8>)]) -> Self {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        for (key, value) in entries {
            db.insert(key.as_slice(), value.as_slice()).unwrap();
        }
        db.flush().unwrap();
        Self { db, dir }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).unwrap().map(|v| v.to_vec())
    }
}

// --- LevelDB (rusty-leveldb) ---
struct LevelDBStore {
    db: std::sync::Mutex<rusty_leveldb::DB>,
    #[allow(dead_code)]
    dir: TempDir,
}

impl BulkStore for LevelDBStore {
    fn load(entries: &[(Vec<u8>, Vec<u8>)]) -> Self {
        let dir = TempDir::new().unwrap();
        let mut db = rusty_leveldb::DB::open(dir.path(), rusty_leveldb::Options::default()).unwrap();
        for (key, value) in entries {
            db.put(key, value).unwrap();
        }
        db.flush().unwrap();
        Self {
            db: std::sync::Mutex::new(db),
            dir,
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.lock().unwrap().get(key)
    }
}

// ============================================================================
// Benchmark Helpers
// ============================================================================

fn generate_key(i: u64) -> Vec<u8> {
    format!("key_{:016}", i).into_bytes()
}

fn generate_value(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.r#gen::<u8>()).collect()
}

fn generate_random_key(max: u64) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    generate_key(rng.gen_range(0..max))
}

fn generate_entries(count: u64, value_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count).map(|i| (generate_key(i), generate_value(value_size))).collect()
}

/// Split `0..count` into `tables` sorted runs by striding, so every merge
/// input overlaps every other.
fn generate_runs(count: u64, tables: u64) -> Vec<Vec<(Vec<u8>, Vec<u8>)>> {
    (0..tables)
        .map(|t| {
            (t..count)
                .step_by(tables as usize)
                .map(|i| (generate_key(i), generate_value(100)))
                .collect()
        })
        .collect()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");

    for count in [1000u64, 10000].iter() {
        group.throughput(Throughput::Elements(*count));
        let entries = generate_entries(*count, 100);

        group.bench_with_input(BenchmarkId::new("PBT", count), &entries, |b, entries| {
            b.iter(|| black_box(PbtStore::load(entries)));
        });

        group.bench_with_input(BenchmarkId::new("Sled", count), &entries, |b, entries| {
            b.iter(|| black_box(SledStore::load(entries)));
        });

        group.bench_with_input(BenchmarkId::new("LevelDB", count), &entries, |b, entries| {
            b.iter(|| black_box(LevelDBStore::load(entries)));
        });
    }

    group.finish();
}

fn bench_random_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_read");
    group.throughput(Throughput::Elements(1));

    let count = 10000u64;
    let entries = generate_entries(count, 100);

    macro_rules! bench_store {
        ($name:expr, $store:ident) => {
            group.bench_function($name, |b| {
                let store = $store::load(&entries);
                b.iter(|| {
                    let key = generate_random_key(count);
                    black_box(store.get(&key));
                });
            });
        };
    }

    bench_store!("PBT", PbtStore);
    bench_store!("Sled", SledStore);
    bench_store!("LevelDB", LevelDBStore);

    group.finish();
}

fn bench_seek_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek_scan");

    let count = 10000u64;
    let store = PbtStore::load(&generate_entries(count, 100));

    for scan_len in [1usize, 16, 128].iter() {
        group.throughput(Throughput::Elements(*scan_len as u64));
        group.bench_with_input(
            BenchmarkId::new("PBT", scan_len),
            scan_len,
            |b, &scan| {
                b.iter(|| {
                    let key = generate_random_key(count);
                    let cursor = store.reader.seek(&key).unwrap();
                    for entry in cursor.entries().take(scan) {
                        black_box(entry.unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    let count = 10000u64;
    group.throughput(Throughput::Elements(count));

    for tables in [2u64, 8].iter() {
        let dir = TempDir::new().unwrap();
        let readers: Vec<TableReader> = generate_runs(count, *tables)
            .into_iter()
            .enumerate()
            .map(|(i, run)| {
                let path = dir.path().join(format!("run-{i}.pbt"));
                let mut writer = TableWriter::create(&path).unwrap();
                for (key, value) in &run {
                    writer.add(key, value).unwrap();
                }
                writer.finish().unwrap();
                TableReader::open(&path).unwrap()
            })
            .collect();
        let inputs: Vec<&TableReader> = readers.iter().collect();

        group.bench_with_input(BenchmarkId::new("PBT", tables), &inputs, |b, inputs| {
            b.iter_with_setup(
                || TempDir::new().unwrap(),
                |out| {
                    let mut writer = TableWriter::create(out.path().join("merged.pbt")).unwrap();
                    black_box(writer.merge(inputs).unwrap());
                    writer.finish().unwrap();
                },
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_load,
    bench_random_read,
    bench_seek_scan,
    bench_merge,
);

criterion_main!(benches);
