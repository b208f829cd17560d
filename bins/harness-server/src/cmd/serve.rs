use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ServeArgs;
use crate::error::ServerError;
use harness_api::TableBackend;
use harness_api_server::Dispatcher;
use harness_store::RecordStore;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("harness-server starting");

    // --- Load config ---
    let config = args.resolve()?;
    tracing::info!(
        config = %args.config_path(),
        stage = %config.stage,
        service = %config.service_name,
        table = %config.table_name,
        partition = %config.partition_key,
        backend = %config.table.backend,
        "loaded config"
    );

    // --- Table & store ---
    let table = harness_store::open_table(&config)?;
    if config.table.backend == TableBackend::Memory {
        tracing::warn!(
            table = %config.table_name,
            "memory table starts empty, every request answers 500 until it is seeded"
        );
    }
    let store = RecordStore::new(table);
    let dispatcher = Arc::new(Dispatcher::new(&config, store));

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let mut api_handle = tokio::spawn(harness_api_server::run(
        config.api_port,
        dispatcher,
        token.clone(),
    ));

    tokio::select! {
        joined = &mut api_handle => {
            // Server stopped before any signal, e.g. the port was taken.
            joined??;
            return Ok(());
        }
        signal = shutdown_signal() => signal?,
    }
    tracing::info!("shutting down...");

    token.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut api_handle).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "drain timed out, aborting api server");
            api_handle.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
