pub mod config;
pub mod error;
pub mod record;
pub mod table;

pub use config::{ConfigError, HarnessConfig, TableBackend, TableConfig};
pub use error::{ErrorKind, TableError};
pub use record::{Record, RecordKey};
pub use table::{RecordTable, ScanPage};
