use crate::error::{ActivityError, ErrorKind};

/// What the orchestrator does with a failed activity attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Wait for the retry interval, or for a newer job, and try again.
    Retry,
    /// Terminate the instance with the error.
    Fatal,
}

/// Decide whether a failed attempt is retried.
///
/// The error's own kind tag is authoritative. Errors that were converted
/// from untagged sources carry [`ErrorKind::Fatal`], so the default is to
/// fail closed.
pub fn evaluate(error: &ActivityError) -> RetryDecision {
    match error.kind() {
        ErrorKind::Retryable => RetryDecision::Retry,
        ErrorKind::Fatal => RetryDecision::Fatal,
    }
}
