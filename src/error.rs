use thiserror::Error;

/// Everything that can go wrong while servicing a relay event. Each variant
/// maps to exactly one `error` frame on the wire; nothing else leaks out.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid token")]
    AuthInvalid,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Conversation not found or access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    /// Store unavailable. Retry is the client's call, not ours.
    #[error("Service temporarily unavailable")]
    Transient(#[from] sqlx::Error),
}
