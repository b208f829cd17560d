use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  ANY /*
// ═══════════════════════════════════════════════════════════════

/// Method, path and body play no part in what is served.
pub(crate) async fn handle_any(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let span = tracing::info_span!(
        "request",
        service = %state.dispatcher.service_name(),
        table = %state.dispatcher.table_name(),
        %method,
        path = %uri.path(),
    );
    state
        .dispatcher
        .dispatch(&headers)
        .instrument(span)
        .await
        .into_response()
}
