use harness_api::TableError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table '{table}' has no records left in partition '{partition}'")]
    Empty { table: String, partition: String },

    #[error("table '{table}' unavailable: {source}")]
    Unavailable {
        table: String,
        #[source]
        source: TableError,
    },

    #[error("table '{table}': lost the delete race {attempts} times in partition '{partition}'")]
    Contended {
        table: String,
        partition: String,
        attempts: usize,
    },
}

impl StoreError {
    pub fn is_empty(&self) -> bool {
        matches!(self, StoreError::Empty { .. })
    }
}
