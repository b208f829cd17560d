use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use harness_api::{HarnessConfig, Record, RecordKey};
use harness_store::{RecordStore, StoreError};

pub const API_KEY_HEADER: &str = "x-api-key";

pub const MISSING_KEY_BODY: &str = "API key is missing";
pub const NOT_AUTHORISED_BODY: &str = "Not authorised";
pub const GENERIC_ERROR_BODY: &str = "An error has occured";

// ═══════════════════════════════════════════════════════════════
//  Outcomes
// ═══════════════════════════════════════════════════════════════

/// Anything that turns a served request into a 500.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFault {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("take task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("record {key} carries unusable status code {status_code}")]
    InvalidStatus { key: RecordKey, status_code: i64 },
}

/// Terminal state of one request.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No credential header, or an empty one.
    Unauthenticated,
    /// Credential present but not the configured key.
    Unauthorized,
    /// A record was consumed and is served as-is.
    Responded { status: StatusCode, record: Record },
    Faulted(DispatchFault),
}

impl DispatchOutcome {
    /// HTTP status this outcome is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchOutcome::Unauthenticated => StatusCode::UNAUTHORIZED,
            DispatchOutcome::Unauthorized => StatusCode::FORBIDDEN,
            DispatchOutcome::Responded { status, .. } => *status,
            DispatchOutcome::Faulted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Unauthenticated => "unauthenticated",
            DispatchOutcome::Unauthorized => "unauthorized",
            DispatchOutcome::Responded { .. } => "responded",
            DispatchOutcome::Faulted(_) => "faulted",
        }
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        match self {
            DispatchOutcome::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, MISSING_KEY_BODY).into_response()
            }
            DispatchOutcome::Unauthorized => {
                (StatusCode::FORBIDDEN, NOT_AUTHORISED_BODY).into_response()
            }
            // Fault details never reach the caller.
            DispatchOutcome::Faulted(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY).into_response()
            }
            DispatchOutcome::Responded { status, record } => payload_response(status, record.payload),
        }
    }
}

/// Strings go out as plain text, `null` as an empty body, everything else
/// as JSON.
fn payload_response(status: StatusCode, payload: serde_json::Value) -> Response {
    match payload {
        serde_json::Value::Null => status.into_response(),
        serde_json::Value::String(text) => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        other => (status, axum::Json(other)).into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Dispatcher
// ═══════════════════════════════════════════════════════════════

/// Per-request state machine: authenticate, take the next record, map the
/// result. Holds no state that changes between requests.
pub struct Dispatcher {
    api_key: String,
    partition: String,
    service_name: String,
    diagnostics: bool,
    store: RecordStore,
}

impl Dispatcher {
    pub fn new(config: &HarnessConfig, store: RecordStore) -> Self {
        Self {
            api_key: config.api_key.clone(),
            partition: config.partition_key.clone(),
            service_name: config.service_name.clone(),
            diagnostics: config.logger_enabled,
            store,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn table_name(&self) -> &str {
        self.store.table_name()
    }

    pub async fn dispatch(&self, headers: &HeaderMap) -> DispatchOutcome {
        let outcome = match self.authenticate(headers) {
            Err(rejected) => rejected,
            Ok(()) => self.serve().await,
        };
        self.log(&outcome);
        outcome
    }

    /// Exact comparison against the configured key. Runs before any store
    /// access, so rejected requests have no side effects.
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), DispatchOutcome> {
        match headers.get(API_KEY_HEADER) {
            None => Err(DispatchOutcome::Unauthenticated),
            Some(value) if value.is_empty() => Err(DispatchOutcome::Unauthenticated),
            Some(value) if value.as_bytes() != self.api_key.as_bytes() => {
                Err(DispatchOutcome::Unauthorized)
            }
            Some(_) => Ok(()),
        }
    }

    async fn serve(&self) -> DispatchOutcome {
        // Own task: a panic below surfaces as JoinError instead of tearing
        // down the connection.
        let store = self.store.clone();
        let partition = self.partition.clone();
        let taken = tokio::spawn(async move { store.take_next(&partition).await }).await;

        let record = match taken {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => return DispatchOutcome::Faulted(e.into()),
            Err(e) => return DispatchOutcome::Faulted(e.into()),
        };

        match http_status(record.status_code) {
            Some(status) => DispatchOutcome::Responded { status, record },
            None => DispatchOutcome::Faulted(DispatchFault::InvalidStatus {
                key: record.key(),
                status_code: record.status_code,
            }),
        }
    }

    fn log(&self, outcome: &DispatchOutcome) {
        if let DispatchOutcome::Faulted(fault) = outcome {
            tracing::error!(error = %fault, "dispatch failed");
        }
        if !self.diagnostics {
            return;
        }
        if let DispatchOutcome::Responded { status, record } = outcome {
            tracing::debug!(
                status_code = status.as_u16(),
                response = %record.payload,
                "serving record"
            );
        }
        tracing::info!(
            outcome = outcome.label(),
            status = outcome.status().as_u16(),
            "request dispatched"
        );
    }
}

/// Final-response status for a stored code. 1xx codes cannot end an
/// HTTP exchange, so they are unusable too.
fn http_status(code: i64) -> Option<StatusCode> {
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| !status.is_informational())
}
