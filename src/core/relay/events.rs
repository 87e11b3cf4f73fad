//! Call lifecycle events published by the orchestrator.

use serde::Serialize;

use super::session::CallStatus;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle event for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    /// All loops scheduled, audio is flowing
    CallStarted { call_id: String },
    /// Cleanup finished
    CallEnded {
        call_id: String,
        final_status: CallStatus,
    },
    /// A loop failed; cleanup follows
    CallFailed { call_id: String, error: String },
}

impl RelayEvent {
    pub fn call_id(&self) -> &str {
        match self {
            RelayEvent::CallStarted { call_id }
            | RelayEvent::CallEnded { call_id, .. }
            | RelayEvent::CallFailed { call_id, .. } => call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RelayEvent::CallEnded {
            call_id: "c1".to_string(),
            final_status: CallStatus::Ended,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "call_ended");
        assert_eq!(json["final_status"], "ended");
        assert_eq!(event.call_id(), "c1");
    }
}
