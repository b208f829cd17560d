mod dispatcher;
mod error;
mod http;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use dispatcher::{
    API_KEY_HEADER, DispatchFault, DispatchOutcome, Dispatcher, GENERIC_ERROR_BODY,
    MISSING_KEY_BODY, NOT_AUTHORISED_BODY,
};
pub use error::ApiServerError;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Catch-all router: every method on every path goes to the dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(http::handle_any)
        .with_state(AppState { dispatcher })
}

/// Bind `0.0.0.0:{port}` and serve until `shutdown` is cancelled.
pub async fn run(
    port: u16,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiServerError::Bind { addr, source })?;
    serve(listener, dispatcher, shutdown).await
}

/// Serve on an already bound listener. In-flight requests are drained
/// after `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "api server listening");
    }

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiServerError::Serve)
}
