//! Telephony platform (Vapi) REST integration.
//!
//! The relay only needs two operations: create a call with a WebSocket
//! transport, and look a call up by id.

mod base;
mod client;
mod messages;

pub use base::{TelephonyApi, TelephonyError, TelephonyResult};
pub use client::{VAPI_DEFAULT_BASE_URL, VapiClient};
pub use messages::{Call, CreateCallRequest, TransportRequest, WEBSOCKET_TRANSPORT_PROVIDER};
