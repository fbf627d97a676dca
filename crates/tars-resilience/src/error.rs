use thiserror::Error;

/// Returned by a circuit breaker call.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("unavailable: breaker open for {0}")]
    Open(String),

    #[error("too many requests: breaker half-open for {0}")]
    TooManyRequests(String),

    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the call was rejected without running the operation.
    pub fn is_rejected(&self) -> bool {
        !matches!(self, BreakerError::Operation(_))
    }
}

/// Returned by [`crate::retry::retry`] when no attempt succeeded.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },
}
