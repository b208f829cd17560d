#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config: {0}")]
    Config(#[from] harness_api::ConfigError),

    #[error("table: {0}")]
    Table(#[from] harness_api::TableError),

    #[error("{0}")]
    Api(#[from] harness_api_server::ApiServerError),

    #[error("api task: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
