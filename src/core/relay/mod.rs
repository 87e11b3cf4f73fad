//! Call relay between the telephony transport and the audio bridge.
//!
//! # Data Flow
//!
//! ```text
//! transport (binary) -> input queue -> audio bridge -> model
//! model -> audio bridge -> output queue -> transport (binary)
//! transport (text) -> control-message handler -> session status
//! ```
//!
//! # Call States
//!
//! `initializing -> connected -> active -> ending -> ended`, with `error`
//! reachable from any state before `ended`.

mod config;
mod control;
mod error;
mod events;
mod orchestrator;
mod queue;
mod registry;
mod session;
mod transport;

pub use config::RelayConfig;
pub use control::{ControlMessage, handle_control_frame, handle_control_message};
pub use error::{RelayError, RelayResult};
pub use events::{EVENT_CHANNEL_CAPACITY, RelayEvent};
pub use orchestrator::RelayOrchestrator;
pub use queue::{AudioQueue, DEFAULT_QUEUE_CAPACITY, QueueClosed};
pub use registry::SessionRegistry;
pub use session::{CallSession, CallStatus, SessionQueues};
pub use transport::{
    Keepalive, RetryPolicy, TransportConnection, TransportConnector, TransportFrame,
    TransportSink, TransportStream, WebSocketConnector, connect_with_retry,
};
