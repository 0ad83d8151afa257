use crate::model::BookingStatus;
use crate::store::StoreError;

/// Everything here is recoverable and reported to the caller with enough
/// detail to explain why; the core never swallows or retries.
#[derive(Debug)]
pub enum EngineError {
    /// Referenced tutor/student/booking absent.
    NotFound(String),
    /// Actor lacks authority over the target booking.
    Forbidden(String),
    /// Target status unreachable from the current status.
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Interval overlaps an active booking, or falls outside availability.
    /// Always carries a human-readable reason.
    Conflict(String),
    /// Malformed input: bad interval, bad duration, bad price, bad blocks.
    Validation(String),
    /// Durable write failed; in-memory state was rolled back.
    StorageUnavailable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::Forbidden(why) => write!(f, "forbidden: {why}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            EngineError::Conflict(reason) => write!(f, "conflict: {reason}"),
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::DuplicateEmail(email) => {
                EngineError::Validation(format!("email already registered: {email}"))
            }
            StoreError::LimitExceeded(msg) => EngineError::Validation(msg.to_string()),
            StoreError::Unavailable(e) => EngineError::StorageUnavailable(e),
        }
    }
}
