use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use harness_api::{Record, RecordKey, RecordTable, ScanPage, TableError};

// ════════════════════════════════════════════════════════════════
//  Line format
// ════════════════════════════════════════════════════════════════

/// Marks one earlier record line with the same key as served:
/// `{"deleted":{"pk":"response","sk":1}}`.
#[derive(Debug, Serialize, Deserialize)]
struct Tombstone {
    deleted: TombstoneKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct TombstoneKey {
    pk: String,
    sk: i64,
}

enum Line {
    Record(Record),
    Tombstone(RecordKey),
}

fn parse_line(line: &str) -> Result<Line, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("deleted").is_some() {
        let t: Tombstone = serde_json::from_value(value)?;
        Ok(Line::Tombstone(RecordKey::new(t.deleted.pk, t.deleted.sk)))
    } else {
        Ok(Line::Record(serde_json::from_value(value)?))
    }
}

// ════════════════════════════════════════════════════════════════
//  FileTable
// ════════════════════════════════════════════════════════════════

/// JSON-lines table: one record per line in `{data_dir}/{table_name}.jsonl`.
///
/// The file is append-only. A delete appends a tombstone instead of
/// rewriting, so lines a seeder appends while the server runs are never
/// lost. Seeders must write each line (newline included) in a single
/// append; a trailing line without its newline is treated as still being
/// written and skipped.
///
/// Conditional delete is atomic only among tasks sharing this `FileTable`.
pub struct FileTable {
    name: String,
    path: PathBuf,
    page_size: usize,
    /// Serialises check-then-tombstone within this process.
    lock: Mutex<()>,
}

impl FileTable {
    pub fn open(data_dir: impl AsRef<Path>, table_name: &str, page_size: usize) -> Result<Self, TableError> {
        if table_name.is_empty()
            || table_name.contains(['/', '\\'])
            || table_name == "."
            || table_name == ".."
        {
            return Err(TableError::config(format!(
                "table name '{table_name}' is not usable as a file name"
            )));
        }

        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| TableError::io(format!("mkdir {}: {e}", data_dir.display())))?;

        Ok(Self {
            name: table_name.to_string(),
            path: data_dir.join(format!("{table_name}.jsonl")),
            page_size: page_size.max(1),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record, as an external seeder would.
    pub async fn insert(&self, record: &Record) -> Result<(), TableError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.lock.lock().await;
        self.append_line(line)
    }

    /// Number of unserved records.
    pub async fn len(&self) -> Result<usize, TableError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_live()?.len())
    }

    // ── Disk access (caller holds `lock`) ──

    /// Unserved records in file order. Each tombstone cancels the oldest
    /// live record with its key that precedes it.
    fn read_live(&self) -> Result<Vec<Record>, TableError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TableError::io(format!("read {}: {e}", self.path.display())));
            }
        };
        let complete = content.ends_with('\n');
        let total = content.lines().count();

        let mut slots: Vec<Option<Record>> = Vec::new();
        let mut live: HashMap<RecordKey, VecDeque<usize>> = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let parsed = match parse_line(line) {
                Ok(parsed) => parsed,
                Err(_) if idx + 1 == total && !complete => break,
                Err(e) => {
                    return Err(TableError::from(e)
                        .with_context(format!("{} line {}", self.path.display(), idx + 1)));
                }
            };
            match parsed {
                Line::Record(record) => {
                    live.entry(record.key()).or_default().push_back(slots.len());
                    slots.push(Some(record));
                }
                Line::Tombstone(key) => {
                    if let Some(pos) = live.get_mut(&key).and_then(VecDeque::pop_front) {
                        slots[pos] = None;
                    }
                }
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// One `O_APPEND` write per line, so concurrent appenders never interleave.
    fn append_line(&self, mut line: String) -> Result<(), TableError> {
        line.push('\n');
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TableError::io(format!("open {}: {e}", self.path.display())))?;
        f.write_all(line.as_bytes())
            .map_err(|e| TableError::io(format!("append {}: {e}", self.path.display())))
    }
}

impl RecordTable for FileTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan<'a>(
        &'a self,
        partition: &'a str,
        after: Option<&'a RecordKey>,
    ) -> Pin<Box<dyn Future<Output = Result<ScanPage, TableError>> + Send + 'a>> {
        Box::pin(async move {
            let records = {
                let _guard = self.lock.lock().await;
                self.read_live()?
            };

            let mut records: Vec<Record> = records
                .into_iter()
                .filter(|r| r.partition_key == partition)
                .filter(|r| after.is_none_or(|a| r.key() > *a))
                .collect();
            // Stable: equal keys keep file order.
            records.sort_by_key(|r| r.sequence_key);

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
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            if !self.read_live()?.iter().any(|r| r.key() == *key) {
                return Ok(false);
            }
            let tombstone = Tombstone {
                deleted: TombstoneKey {
                    pk: key.partition_key.clone(),
                    sk: key.sequence_key,
                },
            };
            self.append_line(serde_json::to_string(&tombstone)?)?;
            Ok(true)
        })
    }
}
