pub mod error;
mod file;
mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use harness_api::{HarnessConfig, Record, RecordKey, RecordTable, TableBackend, TableError};

pub use error::StoreError;
pub use file::FileTable;
pub use memory::MemoryTable;

/// Upper bound on rescans after losing a conditional delete to a
/// concurrent taker.
pub const MAX_TAKE_ATTEMPTS: usize = 8;

/// Build the table backend named by `config.table`.
pub fn open_table(config: &HarnessConfig) -> Result<Arc<dyn RecordTable>, TableError> {
    let table: Arc<dyn RecordTable> = match config.table.backend {
        TableBackend::Memory => Arc::new(MemoryTable::new(
            config.table_name.clone(),
            config.table.page_size,
        )),
        TableBackend::File => Arc::new(FileTable::open(
            &config.table.data_dir,
            &config.table_name,
            config.table.page_size,
        )?),
    };
    tracing::info!(
        table = %table.name(),
        backend = %config.table.backend,
        page_size = config.table.page_size,
        "opened record table"
    );
    Ok(table)
}

// ═══════════════════════════════════════════════════════════════
//  RecordStore
// ═══════════════════════════════════════════════════════════════

/// Ordered, consume-once view over a [`RecordTable`].
///
/// The only public operation is [`RecordStore::take_next`]; the scan that
/// precedes the delete is never exposed, so callers cannot split the
/// read from the removal.
#[derive(Clone)]
pub struct RecordStore {
    table: Arc<dyn RecordTable>,
}

impl RecordStore {
    pub fn new(table: Arc<dyn RecordTable>) -> Self {
        Self { table }
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Take the record with the lowest sequence key in `partition` and
    /// delete it.
    ///
    /// The delete is conditional: if another taker removed the same record
    /// between our scan and our delete, the partition is rescanned instead
    /// of reporting a record someone else already served. A delete that
    /// fails outright is an error, never a success, even though the record
    /// may then be served again by a later call.
    pub async fn take_next(&self, partition: &str) -> Result<Record, StoreError> {
        for attempt in 1..=MAX_TAKE_ATTEMPTS {
            let Some(record) = self.earliest(partition).await? else {
                return Err(StoreError::Empty {
                    table: self.table.name().to_string(),
                    partition: partition.to_string(),
                });
            };

            let key = record.key();
            match self.table.delete_if_present(&key).await {
                Ok(true) => {
                    tracing::debug!(table = %self.table.name(), key = %key, "took record");
                    return Ok(record);
                }
                Ok(false) => {
                    tracing::warn!(
                        table = %self.table.name(),
                        key = %key,
                        attempt,
                        "record taken concurrently, rescanning"
                    );
                }
                Err(e) => {
                    return Err(self.unavailable(e.at(key).with_context("delete")));
                }
            }
        }

        Err(StoreError::Contended {
            table: self.table.name().to_string(),
            partition: partition.to_string(),
            attempts: MAX_TAKE_ATTEMPTS,
        })
    }

    /// Scan every page of `partition` and keep the lowest sequence key.
    /// On equal keys the first one scanned wins. Pages may arrive in any
    /// key order, so nothing short of the last page is conclusive.
    async fn earliest(&self, partition: &str) -> Result<Option<Record>, StoreError> {
        let mut cursor: Option<RecordKey> = None;
        let mut seen_cursors: HashSet<RecordKey> = HashSet::new();
        let mut earliest: Option<Record> = None;
        let mut pages = 0usize;
        let mut scanned = 0usize;

        loop {
            let page = self
                .table
                .scan(partition, cursor.as_ref())
                .await
                .map_err(|e| self.unavailable(e.with_context(format!("scan '{partition}'"))))?;
            pages += 1;
            scanned += page.records.len();

            for record in page.records {
                if earliest
                    .as_ref()
                    .is_none_or(|e| record.sequence_key < e.sequence_key)
                {
                    earliest = Some(record);
                }
            }

            match page.next {
                Some(next) => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(self.unavailable(TableError::format(format!(
                            "scan '{partition}': cursor {next} returned twice"
                        ))));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        tracing::debug!(
            table = %self.table.name(),
            partition,
            pages,
            scanned,
            "scanned partition"
        );
        Ok(earliest)
    }

    fn unavailable(&self, source: TableError) -> StoreError {
        StoreError::Unavailable {
            table: self.table.name().to_string(),
            source,
        }
    }
}
