use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use harness_api::{HarnessConfig, Record, RecordKey, RecordTable, ScanPage, TableBackend, TableError};
use harness_store::{FileTable, MAX_TAKE_ATTEMPTS, MemoryTable, RecordStore, StoreError, open_table};
use serde_json::json;

const PARTITION: &str = "response";

fn rec(sk: i64) -> Record {
    Record::new(PARTITION, sk, 200, json!({ "sk": sk }))
}

async fn seeded_memory(page_size: usize, sks: &[i64]) -> Arc<MemoryTable> {
    let table = Arc::new(MemoryTable::new("harness", page_size));
    for &sk in sks {
        table.insert(rec(sk)).await;
    }
    table
}

// ═══════════════════════════════════════════════════════════════
//  Fault-injecting tables
// ═══════════════════════════════════════════════════════════════

/// Delegates to an inner table, failing scan or delete on demand.
struct FlakyTable {
    inner: MemoryTable,
    fail_scan: bool,
    fail_delete: bool,
}

impl RecordTable for FlakyTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn scan<'a>(
        &'a self,
        partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        if self.fail_scan {
            return Box::pin(async { Err(TableError::io("connection refused")) });
        }
        self.inner.scan(partition, after)
    }

    fn delete_if_present<'a>(
        &'a self,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>> {
        if self.fail_delete {
            return Box::pin(async { Err(TableError::io("throttled")) });
        }
        self.inner.delete_if_present(key)
    }
}

/// Simulates a competing taker that wins the first `steals` deletes.
struct RacingTable {
    inner: MemoryTable,
    steals: AtomicUsize,
}

impl RecordTable for RacingTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn scan<'a>(
        &'a self,
        partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        self.inner.scan(partition, after)
    }

    fn delete_if_present<'a>(
        &'a self,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>> {
        Box::pin(async move {
            let stolen = self
                .steals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if stolen {
                // The other taker deletes it; our conditional delete then misses.
                self.inner.delete_if_present(key).await?;
                return Ok(false);
            }
            self.inner.delete_if_present(key).await
        })
    }
}

/// Fixed pages in arbitrary key order; the cursor is the last key of the
/// page just returned.
struct UnorderedTable {
    pages: Vec<Vec<Record>>,
    deleted: Mutex<HashSet<RecordKey>>,
    scans: AtomicUsize,
}

impl UnorderedTable {
    fn new(pages: Vec<Vec<Record>>) -> Self {
        Self {
            pages,
            deleted: Mutex::new(HashSet::new()),
            scans: AtomicUsize::new(0),
        }
    }
}

impl RecordTable for UnorderedTable {
    fn name(&self) -> &str {
        "unordered"
    }

    fn scan<'a>(
        &'a self,
        _partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        Box::pin(async move {
            self.scans.fetch_add(1, Ordering::SeqCst);
            let idx = match after {
                None => 0,
                Some(key) => {
                    self.pages
                        .iter()
                        .position(|p| p.last().map(Record::key).as_ref() == Some(key))
                        .ok_or_else(|| TableError::io("unknown cursor"))?
                        + 1
                }
            };
            let page = &self.pages[idx];
            let deleted = self.deleted.lock().unwrap();
            Ok(ScanPage {
                records: page
                    .iter()
                    .filter(|r| !deleted.contains(&r.key()))
                    .cloned()
                    .collect(),
                next: (idx + 1 < self.pages.len()).then(|| page.last().map(Record::key)).flatten(),
            })
        })
    }

    fn delete_if_present<'a>(
        &'a self,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.deleted.lock().unwrap().insert(key.clone())) })
    }
}

/// Returns the same non-empty page forever.
struct StuckCursorTable;

impl RecordTable for StuckCursorTable {
    fn name(&self) -> &str {
        "stuck"
    }

    fn scan<'a>(
        &'a self,
        _partition: &'a str,
        _after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        Box::pin(async {
            Ok(ScanPage {
                records: vec![rec(1)],
                next: Some(RecordKey::new(PARTITION, 1)),
            })
        })
    }

    fn delete_if_present<'a>(
        &'a self,
        _key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>> {
        Box::pin(async { Ok(true) })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ordering & exhaustion
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn takes_in_ascending_sequence_order() {
    let table = seeded_memory(100, &[3, 1, 2]).await;
    let store = RecordStore::new(table.clone());

    for expected in [1, 2, 3] {
        let record = store.take_next(PARTITION).await.unwrap();
        assert_eq!(record.sequence_key, expected);
    }
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn exhaustion_reports_empty() {
    let table = seeded_memory(100, &[10, 20]).await;
    let store = RecordStore::new(table);

    store.take_next(PARTITION).await.unwrap();
    store.take_next(PARTITION).await.unwrap();

    let err = store.take_next(PARTITION).await.unwrap_err();
    assert!(err.is_empty(), "expected empty, got {err}");
}

#[tokio::test]
async fn pages_through_the_whole_partition() {
    // Lowest key on the last page, as a hash-ordered scan may return it.
    let table = Arc::new(UnorderedTable::new(vec![
        vec![rec(5), rec(9)],
        vec![rec(7)],
        vec![rec(-1), rec(6)],
    ]));
    let store = RecordStore::new(table.clone());

    let mut order = Vec::new();
    while let Ok(r) = store.take_next(PARTITION).await {
        order.push(r.sequence_key);
    }
    assert_eq!(order, vec![-1, 5, 6, 7, 9]);
    assert_eq!(table.scans.load(Ordering::SeqCst), 3 * 6);
}

#[tokio::test]
async fn partitions_are_independent_queues() {
    let table = seeded_memory(100, &[1]).await;
    table.insert(Record::new("other", 0, 201, json!(null))).await;
    let store = RecordStore::new(table.clone());

    assert_eq!(store.take_next(PARTITION).await.unwrap().sequence_key, 1);
    assert!(store.take_next(PARTITION).await.unwrap_err().is_empty());
    assert_eq!(table.len().await, 1);

    let other = store.take_next("other").await.unwrap();
    assert_eq!(other.status_code, 201);
}

#[tokio::test]
async fn record_is_returned_untouched() {
    let table = Arc::new(MemoryTable::new("harness", 100));
    let seeded = Record::new(PARTITION, 7, 999, json!([1, "two", {"three": null}]));
    table.insert(seeded.clone()).await;

    let store = RecordStore::new(table);
    assert_eq!(store.take_next(PARTITION).await.unwrap(), seeded);
}

// ═══════════════════════════════════════════════════════════════
//  Failures
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn scan_failure_is_unavailable() {
    let inner = MemoryTable::new("harness", 100);
    inner.insert(rec(1)).await;
    let store = RecordStore::new(Arc::new(FlakyTable {
        inner,
        fail_scan: true,
        fail_delete: false,
    }));

    let err = store.take_next(PARTITION).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { .. }));
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn delete_failure_is_unavailable_not_success() {
    let inner = MemoryTable::new("harness", 100);
    inner.insert(rec(1)).await;
    let table = Arc::new(FlakyTable {
        inner,
        fail_scan: false,
        fail_delete: true,
    });
    let store = RecordStore::new(table.clone());

    let err = store.take_next(PARTITION).await.unwrap_err();
    let StoreError::Unavailable { source, .. } = &err else {
        panic!("expected Unavailable, got {err:?}");
    };
    assert_eq!(source.key, Some(RecordKey::new(PARTITION, 1)));
    // Not deleted: the same record may be served by a later call.
    assert_eq!(table.inner.len().await, 1);
}

#[tokio::test]
async fn non_advancing_cursor_is_unavailable() {
    let store = RecordStore::new(Arc::new(StuckCursorTable));
    let err = store.take_next(PARTITION).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { .. }));
}

// ═══════════════════════════════════════════════════════════════
//  Concurrency
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn lost_race_moves_on_to_the_next_record() {
    let inner = MemoryTable::new("harness", 100);
    for sk in [1, 2] {
        inner.insert(rec(sk)).await;
    }
    let store = RecordStore::new(Arc::new(RacingTable {
        inner,
        steals: AtomicUsize::new(1),
    }));

    // sk=1 went to the competitor, so we must get sk=2, never sk=1.
    assert_eq!(store.take_next(PARTITION).await.unwrap().sequence_key, 2);
    assert!(store.take_next(PARTITION).await.unwrap_err().is_empty());
}

#[tokio::test]
async fn lost_race_on_last_record_is_empty() {
    let inner = MemoryTable::new("harness", 100);
    inner.insert(rec(1)).await;
    let store = RecordStore::new(Arc::new(RacingTable {
        inner,
        steals: AtomicUsize::new(1),
    }));

    assert!(store.take_next(PARTITION).await.unwrap_err().is_empty());
}

#[tokio::test]
async fn repeated_lost_races_give_up_as_contended() {
    let inner = MemoryTable::new("harness", 100);
    for sk in 0..(MAX_TAKE_ATTEMPTS as i64 + 1) {
        inner.insert(rec(sk)).await;
    }
    let store = RecordStore::new(Arc::new(RacingTable {
        inner,
        steals: AtomicUsize::new(MAX_TAKE_ATTEMPTS),
    }));

    let err = store.take_next(PARTITION).await.unwrap_err();
    assert!(matches!(err, StoreError::Contended { attempts, .. } if attempts == MAX_TAKE_ATTEMPTS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_takes_on_last_record_succeed_once() {
    for _ in 0..50 {
        let table = seeded_memory(100, &[1]).await;
        let store = RecordStore::new(table);

        let a = tokio::spawn({
            let store = store.clone();
            async move { store.take_next(PARTITION).await }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.take_next(PARTITION).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let served = results.iter().filter(|r| r.is_ok()).count();
        let empty = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_empty()))
            .count();
        assert_eq!((served, empty), (1, 1));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_takers_never_share_a_record() {
    let sks: Vec<i64> = (0..64).collect();
    let table = seeded_memory(7, &sks).await;
    let store = RecordStore::new(table.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Ok(r) = store.take_next(PARTITION).await {
                    taken.push(r.sequence_key);
                }
                taken
            })
        })
        .collect();

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, sks);
    assert!(table.is_empty().await);
}

// ═══════════════════════════════════════════════════════════════
//  File backend
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn file_table_serves_seeded_lines_once() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(FileTable::open(dir.path(), "harness", 2).unwrap());
    for sk in [3, 1, 2] {
        table.insert(&rec(sk)).await.unwrap();
    }
    let store = RecordStore::new(table.clone());

    for expected in [1, 2, 3] {
        assert_eq!(store.take_next(PARTITION).await.unwrap().sequence_key, expected);
    }
    assert!(store.take_next(PARTITION).await.unwrap_err().is_empty());
    assert_eq!(table.len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_table_keeps_lines_appended_during_takes() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(FileTable::open(dir.path(), "harness", 1000).unwrap());
    for sk in 0..200 {
        table.insert(&rec(sk)).await.unwrap();
    }
    let store = RecordStore::new(table.clone());

    // Separate writer, as an external seeder would be.
    let path = table.path().to_path_buf();
    let seeder = std::thread::spawn(move || {
        for sk in 200..400 {
            let mut line = serde_json::to_string(&rec(sk)).unwrap();
            line.push('\n');
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            f.write_all(line.as_bytes()).unwrap();
        }
    });

    let mut served = HashSet::new();
    for _ in 0..100 {
        let record = store.take_next(PARTITION).await.unwrap();
        assert!(served.insert(record.sequence_key));
    }
    seeder.join().unwrap();

    assert_eq!(table.len().await.unwrap(), 300);
    loop {
        match store.take_next(PARTITION).await {
            Ok(record) => assert!(served.insert(record.sequence_key)),
            Err(e) => {
                assert!(e.is_empty(), "unexpected error: {e}");
                break;
            }
        }
    }
    assert_eq!(served, (0..400).collect::<HashSet<i64>>());
}

#[tokio::test]
async fn open_table_follows_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HarnessConfig {
        table_name: "harness-table-dev".into(),
        api_key: "k".into(),
        ..HarnessConfig::default()
    };
    config.table.data_dir = dir.path().to_string_lossy().into_owned();

    let file = open_table(&config).unwrap();
    assert_eq!(file.name(), "harness-table-dev");
    assert!(dir.path().exists());

    config.table.backend = TableBackend::Memory;
    let memory = open_table(&config).unwrap();
    let store = RecordStore::new(memory);
    assert!(store.take_next(PARTITION).await.unwrap_err().is_empty());
}
