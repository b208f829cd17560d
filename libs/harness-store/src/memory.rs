use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::pin::Pin;

use tokio::sync::RwLock;

use harness_api::{Record, RecordKey, RecordTable, ScanPage, TableError};

// ═══════════════════════════════════════════════════════════════
//  MemoryTable
// ═══════════════════════════════════════════════════════════════

/// In-process table. Records live in key order, so one partition is a
/// contiguous range of the map.
pub struct MemoryTable {
    name: String,
    page_size: usize,
    records: RwLock<BTreeMap<RecordKey, Record>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, page_size: usize) -> Self {
        Self {
            name: name.into(),
            page_size: page_size.max(1),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seed a record. Replaces and returns any record with the same key.
    pub async fn insert(&self, record: Record) -> Option<Record> {
        self.records.write().await.insert(record.key(), record)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl RecordTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan<'a>(
        &'a self,
        partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        Box::pin(async move {
            let start = match after {
                Some(key) => Bound::Excluded(key.clone()),
                None => Bound::Included(RecordKey::new(partition, i64::MIN)),
            };

            let buf = self.records.read().await;
            // One extra record tells us whether another page follows.
            let mut records: Vec<Record> = buf
                .range((start, Bound::Unbounded))
                .take_while(|(key, _)| key.partition_key == partition)
                .take(self.page_size + 1)
                .map(|(_, record)| record.clone())
                .collect();

            let next = if records.len() > self.page_size {
                records.truncate(self.page_size);
                records.last().map(Record::key)
            } else {
                None
            };

            Ok(ScanPage { records, next })
        })
    }

    fn delete_if_present<'a>(
        &'a self,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.records.write().await.remove(key).is_some()) })
    }
}
