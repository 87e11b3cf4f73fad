//! Telephony platform abstraction.

use async_trait::async_trait;
use thiserror::Error;

use super::messages::{Call, CreateCallRequest};

/// Errors from the telephony REST API.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// Non-2xx response
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Request could not be sent or the response could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Response body missing required fields
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type TelephonyResult<T> = Result<T, TelephonyError>;

/// Call management operations of a telephony platform.
#[async_trait]
pub trait TelephonyApi: Send + Sync {
    /// Create a call whose audio is delivered over a WebSocket transport.
    async fn create_call(&self, request: &CreateCallRequest) -> TelephonyResult<Call>;

    /// Fetch a call by id.
    async fn get_call(&self, call_id: &str) -> TelephonyResult<Call>;
}
