use thiserror::Error;

use crate::core::realtime::RealtimeError;
use crate::core::telephony::TelephonyError;

/// Errors raised while relaying a call.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport WebSocket unreachable after all attempts
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed call-create response or control frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Audio bridge session failed
    #[error("Stream error: {0}")]
    Stream(#[from] RealtimeError),

    /// Telephony REST API failure
    #[error("Upstream API error: {0}")]
    UpstreamApi(TelephonyError),

    /// I/O failure on an open transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// No active session with this call id
    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// Admission limit reached
    #[error("Too many concurrent calls (limit {0})")]
    CapacityExceeded(usize),
}

impl From<TelephonyError> for RelayError {
    fn from(err: TelephonyError) -> Self {
        match err {
            TelephonyError::InvalidResponse(msg) => RelayError::Protocol(msg),
            other => RelayError::UpstreamApi(other),
        }
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
