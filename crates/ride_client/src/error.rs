//! Failure taxonomy shared by every client component.

use std::fmt;

/// How a caller should treat a surfaced failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// User action required; never retried automatically.
    Permission,
    /// Timeouts and unavailable network or position; retried within a budget.
    Transient,
    /// Expected result of the business flow, such as a cancelled operation.
    BusinessOutcome,
    /// Malformed or unexpected data from a peer.
    Protocol,
    /// The operation cannot continue without the caller starting over.
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Permission => "permission",
            ErrorKind::Transient => "transient",
            ErrorKind::BusinessOutcome => "business-outcome",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(label)
    }
}
