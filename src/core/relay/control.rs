//! Control messages exchanged on the call transport.
//!
//! Every text frame is a JSON object with a `type` discriminator. The
//! telephony platform sends `call-started`, `call-ended` and `error`; the
//! relay sends `end-call` to hang up.

use serde::{Deserialize, Serialize};

use super::error::{RelayError, RelayResult};
use super::session::{CallSession, CallStatus};

/// A control message on the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    CallStarted,
    CallEnded,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Sent by the relay to end the call
    EndCall,
    /// Any type this relay does not act on
    #[serde(other, skip_serializing)]
    Unknown,
}

impl ControlMessage {
    /// Parse a control frame.
    ///
    /// Fails with [`RelayError::Protocol`] when the frame is not a JSON object
    /// with a string `type` field.
    pub fn parse(text: &str) -> RelayResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| RelayError::Protocol(format!("invalid control JSON: {e}")))?;

        let type_name = value
            .as_object()
            .ok_or_else(|| RelayError::Protocol("control frame is not a JSON object".to_string()))?
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| RelayError::Protocol("control frame has no 'type' field".to_string()))?
            .to_string();

        let message: ControlMessage = serde_json::from_value(value)
            .map_err(|e| RelayError::Protocol(format!("invalid '{type_name}' frame: {e}")))?;

        if message == ControlMessage::Unknown {
            tracing::debug!("Unhandled control message type: {}", type_name);
        }
        Ok(message)
    }

    /// Serialize to the JSON text sent on the transport.
    pub fn to_json(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Protocol(e.to_string()))
    }
}

/// Apply a parsed control message to a session.
pub fn handle_control_message(session: &CallSession, message: &ControlMessage) {
    let call_id = session.call_id();
    match message {
        ControlMessage::CallStarted => {
            tracing::info!(call_id = %call_id, "Call started");
        }
        ControlMessage::CallEnded => {
            tracing::info!(call_id = %call_id, "Call ended by remote");
            session.transition(CallStatus::Ending);
        }
        ControlMessage::Error { message } => {
            tracing::error!(
                call_id = %call_id,
                "Call error: {}",
                message.as_deref().unwrap_or("unknown error")
            );
            session.transition(CallStatus::Error);
        }
        ControlMessage::EndCall | ControlMessage::Unknown => {
            tracing::debug!(call_id = %call_id, "Ignoring control message {:?}", message);
        }
    }
}

/// Parse and apply a raw control frame. Malformed frames are logged and dropped.
pub fn handle_control_frame(session: &CallSession, text: &str) {
    match ControlMessage::parse(text) {
        Ok(message) => handle_control_message(session, &message),
        Err(e) => {
            tracing::warn!(call_id = %session.call_id(), "Dropping control frame: {}", e);
        }
    }
}
