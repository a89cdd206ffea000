use thiserror::Error;

/// Business outcomes and failures surfaced by the services.
///
/// Expected outcomes (`AlreadyVoted`, `NotAvailable`, ...) are ordinary
/// values here, not panics. `Transient` marks a retryable backend hiccup;
/// `Internal` is everything unexpected and its detail stays server-side.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("meeting not found")]
    NotFound,

    #[error("invalid meeting code")]
    InvalidCode,

    #[error("invalid poll for this meeting")]
    InvalidPoll,

    #[error("invalid token for this meeting")]
    InvalidToken,

    #[error("{0}")]
    InvalidInput(String),

    #[error("meeting is not available")]
    NotAvailable,

    #[error("already voted in this poll")]
    AlreadyVoted,

    #[error("backend temporarily unavailable")]
    Transient(#[source] anyhow::Error),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ServiceError {
    /// Retryable backend hiccup — stream publishers skip the tick and
    /// try again instead of closing the connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}
