use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("'{0}' is required and must not be empty")]
    Missing(&'static str),

    #[error("'{field}': {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// Root configuration, built once at startup and handed by reference to
/// the table, the record store and the dispatcher.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Store identifier. For the file backend this names the data file.
    #[serde(default)]
    pub table_name: String,

    /// Secret expected in the `x-api-key` header.
    #[serde(default)]
    pub api_key: String,

    /// Per-request diagnostic logging. No effect on responses.
    #[serde(default)]
    pub logger_enabled: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_stage")]
    pub stage: String,

    /// Partition the dispatcher consumes from.
    #[serde(default = "default_partition_key")]
    pub partition_key: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub table: TableConfig,
}

fn default_service_name() -> String {
    "api-test-harness".into()
}

fn default_stage() -> String {
    "develop".into()
}

fn default_partition_key() -> String {
    "response".into()
}

fn default_api_port() -> u16 {
    9300
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            api_key: String::new(),
            logger_enabled: false,
            service_name: default_service_name(),
            stage: default_stage(),
            partition_key: default_partition_key(),
            api_port: default_api_port(),
            table: TableConfig::default(),
        }
    }
}

// api_key stays out of logs.
impl std::fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("table_name", &self.table_name)
            .field("api_key", &"<redacted>")
            .field("logger_enabled", &self.logger_enabled)
            .field("service_name", &self.service_name)
            .field("stage", &self.stage)
            .field("partition_key", &self.partition_key)
            .field("api_port", &self.api_port)
            .field("table", &self.table)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableBackend {
    /// Process-local table, lost on exit. Seeded in-process.
    Memory,
    /// JSON-lines file `{data_dir}/{table_name}.jsonl`.
    #[default]
    File,
}

impl std::fmt::Display for TableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableBackend::Memory => f.write_str("memory"),
            TableBackend::File => f.write_str("file"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default)]
    pub backend: TableBackend,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum records returned by one scan page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_data_dir() -> String {
    "data".into()
}

fn default_page_size() -> usize {
    100
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            backend: TableBackend::default(),
            data_dir: default_data_dir(),
            page_size: default_page_size(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file. Does not validate.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Unknown keys are rejected.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::Missing("table_name"));
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if self.partition_key.is_empty() {
            return Err(ConfigError::Missing("partition_key"));
        }
        if self.table.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "table.page_size",
                detail: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
