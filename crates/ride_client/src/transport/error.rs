use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect to matching service: {0}")]
    ConnectFailed(String),
    #[error("transport is not open")]
    NotConnected,
    #[error("failed to send frame: {0}")]
    Send(String),
    /// Reconnect budget spent; the caller must open a new connection.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectBudgetExhausted { attempts: u32 },
    #[error("connection closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::ConnectFailed(_)
            | TransportError::NotConnected
            | TransportError::Send(_) => ErrorKind::Transient,
            TransportError::ReconnectBudgetExhausted { .. } | TransportError::Closed { .. } => {
                ErrorKind::Fatal
            }
            TransportError::Encode(_) => ErrorKind::Protocol,
        }
    }
}
