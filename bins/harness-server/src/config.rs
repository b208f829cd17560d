use clap::{Args, Parser, Subcommand, ValueEnum};
use harness_api::{ConfigError, HarnessConfig, TableBackend};

pub const DEFAULT_CONFIG_PATH: &str = "harness.toml";

#[derive(Parser)]
#[command(name = "harness-server", about = "Serves pre-seeded HTTP responses in order")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP endpoint
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Memory,
    File,
}

impl From<BackendArg> for TableBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => TableBackend::Memory,
            BackendArg::File => TableBackend::File,
        }
    }
}

/// Flags override the TOML file. Unset flags leave file values alone.
#[derive(Args, Clone, Debug, Default)]
pub struct ServeArgs {
    /// Path to TOML config file [default: harness.toml]
    #[arg(long, env = "HARNESS_CONFIG")]
    pub config: Option<String>,

    #[arg(long, env = "TABLE_NAME")]
    pub table_name: Option<String>,

    #[arg(long, env = "X_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Per-request diagnostic logging
    #[arg(long, env = "LOGGER_ENABLED", value_parser = clap::builder::BoolishValueParser::new())]
    pub logger_enabled: Option<bool>,

    #[arg(long, env = "POWERTOOLS_SERVICE_NAME")]
    pub service_name: Option<String>,

    #[arg(long, env = "STAGE")]
    pub stage: Option<String>,

    /// Partition the endpoint consumes from
    #[arg(long, env = "PARTITION_KEY")]
    pub partition_key: Option<String>,

    #[arg(long, env = "API_PORT")]
    pub api_port: Option<u16>,

    /// Directory holding `{table_name}.jsonl` for the file backend
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,

    #[arg(long, env = "TABLE_BACKEND", value_enum)]
    pub backend: Option<BackendArg>,
}

impl ServeArgs {
    pub fn config_path(&self) -> &str {
        self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }

    /// defaults < TOML file < env/CLI, then validate.
    pub fn resolve(&self) -> Result<HarnessConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => HarnessConfig::load(path)?,
            None => match HarnessConfig::load(DEFAULT_CONFIG_PATH) {
                Ok(cfg) => cfg,
                Err(ConfigError::Read { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    HarnessConfig::default()
                }
                Err(e) => return Err(e),
            },
        };
        self.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut HarnessConfig) {
        if let Some(v) = &self.table_name {
            cfg.table_name = v.clone();
        }
        if let Some(v) = &self.api_key {
            cfg.api_key = v.clone();
        }
        if let Some(v) = self.logger_enabled {
            cfg.logger_enabled = v;
        }
        if let Some(v) = &self.service_name {
            cfg.service_name = v.clone();
        }
        if let Some(v) = &self.stage {
            cfg.stage = v.clone();
        }
        if let Some(v) = &self.partition_key {
            cfg.partition_key = v.clone();
        }
        if let Some(v) = self.api_port {
            cfg.api_port = v;
        }
        if let Some(v) = &self.data_dir {
            cfg.table.data_dir = v.clone();
        }
        if let Some(v) = self.backend {
            cfg.table.backend = v.into();
        }
    }
}
