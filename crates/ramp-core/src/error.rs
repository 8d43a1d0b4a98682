use ramp_types::models::AssignmentStatus;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Everything the core can fail with. Nothing here is caught-and-swallowed;
/// callers decide what each variant means for their transport.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("invalid assignment transition: {from} -> {to}")]
    InvalidStateTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("{what} {id} is still referenced by assignments {assignment_ids:?}")]
    VersionInUse {
        what: &'static str,
        id: String,
        assignment_ids: Vec<String>,
    },

    #[error("concurrent update on {what} {id}")]
    ConcurrencyConflict { what: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// A stored row that should be well-formed is not (bad uuid, bad rank,
    /// unparsable payload). Operator-facing, never the caller's fault.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            what,
            id: id.into(),
        }
    }
}
