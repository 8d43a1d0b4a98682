use axum::http::StatusCode;
use ramp_core::CoreError;
use tracing::{error, warn};

/// Map a core error onto the transport. Conflict-shaped errors (illegal
/// transition, live references, lost optimistic-concurrency race) all
/// surface as 409; storage and corruption problems are logged and hidden
/// behind a 500.
pub(crate) fn map_core(err: CoreError) -> StatusCode {
    match &err {
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::InvalidStateTransition { .. }
        | CoreError::VersionInUse { .. }
        | CoreError::ConcurrencyConflict { .. } => {
            warn!("conflict: {}", err);
            StatusCode::CONFLICT
        }
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Corrupt(_) | CoreError::Db(_) => {
            error!("internal error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run blocking core/database work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(map_core)
}
