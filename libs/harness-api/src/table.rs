use std::future::Future;
use std::pin::Pin;

use crate::error::TableError;
use crate::record::{Record, RecordKey};

/// One page of a partition scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    /// Records of the page, ascending by key.
    pub records: Vec<Record>,
    /// Last evaluated key. `Some` means more records may follow and the
    /// caller must scan again starting after it.
    pub next: Option<RecordKey>,
}

/// Persistence backend holding seeded records.
///
/// The record store only ever talks to a table through this trait, so a
/// table is treated as an external resource that other processes may be
/// reading and deleting from at the same time.
pub trait RecordTable: Send + Sync {
    /// Human-readable table identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Read one page of `partition`, starting strictly after `after`.
    fn scan<'a>(
        &'a self,
        partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>>;

    /// Remove the record with exactly this key.
    ///
    /// Returns `true` only when this call removed it. `false` means the
    /// record was already gone, e.g. a concurrent taker deleted it first.
    fn delete_if_present<'a>(
        &'a self,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, TableError>> + Send + 'a>>;
}
