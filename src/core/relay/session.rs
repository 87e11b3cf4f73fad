//! Per-call session record and status state machine.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, mpsc, watch};
use tokio::task::AbortHandle;

use super::error::{RelayError, RelayResult};
use super::queue::AudioQueue;
use super::transport::{TransportFrame, TransportSink};

// =============================================================================
// Call Status
// =============================================================================

/// Lifecycle state of a relayed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initializing,
    Connected,
    Active,
    Ending,
    Ended,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initializing => "initializing",
            CallStatus::Connected => "connected",
            CallStatus::Active => "active",
            CallStatus::Ending => "ending",
            CallStatus::Ended => "ended",
            CallStatus::Error => "error",
        }
    }

    /// Audio flows only in these states.
    pub fn is_live(&self) -> bool {
        matches!(self, CallStatus::Connected | CallStatus::Active)
    }

    /// The call has been asked to stop but is not cleaned up yet.
    pub fn is_winding_down(&self) -> bool {
        matches!(self, CallStatus::Ending | CallStatus::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, next),
            (Initializing, Connected)
                | (Connected, Active)
                | (Initializing | Connected | Active, Ending)
                | (Ending | Error, Ended)
                | (Initializing | Connected | Active | Ending, Error)
        )
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Call Session
// =============================================================================

/// Consumer halves of a session's queues, handed to the loops that drain them.
pub struct SessionQueues {
    /// Caller audio, drained by the audio bridge
    pub input: mpsc::Receiver<Bytes>,
    /// Model audio, drained by the transport send loop
    pub output: mpsc::Receiver<Bytes>,
}

/// State of one active call.
///
/// Owned by the orchestrator through an `Arc`; the control-message handler
/// only ever changes the status.
pub struct CallSession {
    call_id: String,
    transport_url: String,
    status: watch::Sender<CallStatus>,
    transport: tokio::sync::Mutex<Option<TransportSink>>,
    ai_task: parking_lot::Mutex<Option<AbortHandle>>,
    call_task: parking_lot::Mutex<Option<AbortHandle>>,
    admission: parking_lot::Mutex<Option<OwnedSemaphorePermit>>,
    input: AudioQueue,
    output: AudioQueue,
    cleaned_up: AtomicBool,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.call_id)
            .field("transport_url", &self.transport_url)
            .field("status", &self.status())
            .finish()
    }
}

impl CallSession {
    pub fn new(
        call_id: impl Into<String>,
        transport_url: impl Into<String>,
        queue_capacity: usize,
    ) -> (Self, SessionQueues) {
        let (input, input_rx) = AudioQueue::bounded(queue_capacity);
        let (output, output_rx) = AudioQueue::bounded(queue_capacity);

        let session = Self {
            call_id: call_id.into(),
            transport_url: transport_url.into(),
            status: watch::Sender::new(CallStatus::Initializing),
            transport: tokio::sync::Mutex::new(None),
            ai_task: parking_lot::Mutex::new(None),
            call_task: parking_lot::Mutex::new(None),
            admission: parking_lot::Mutex::new(None),
            input,
            output,
            cleaned_up: AtomicBool::new(false),
        };

        (
            session,
            SessionQueues {
                input: input_rx,
                output: output_rx,
            },
        )
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn transport_url(&self) -> &str {
        &self.transport_url
    }

    pub fn status(&self) -> CallStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<CallStatus> {
        self.status.subscribe()
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns `true` if the status changed. Illegal transitions are ignored.
    pub fn transition(&self, next: CallStatus) -> bool {
        let mut rejected_from = None;
        let changed = self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                rejected_from = Some(*current);
                false
            }
        });

        if let Some(from) = rejected_from
            && from != next
        {
            tracing::debug!(
                call_id = %self.call_id,
                "Ignoring status transition {} -> {}", from, next
            );
        }
        changed
    }

    /// Producer for caller audio.
    pub fn input_queue(&self) -> &AudioQueue {
        &self.input
    }

    /// Producer for model audio.
    pub fn output_queue(&self) -> &AudioQueue {
        &self.output
    }

    /// Close both queues. Each queue is closed at most once.
    pub fn close_queues(&self) {
        self.input.close();
        self.output.close();
    }

    pub async fn set_transport(&self, sink: TransportSink) {
        *self.transport.lock().await = Some(sink);
    }

    pub async fn has_transport(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Write one frame to the transport.
    pub async fn send_frame(&self, frame: TransportFrame) -> RelayResult<()> {
        let mut guard = self.transport.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| RelayError::Transport("transport is not connected".to_string()))?;
        sink.send(frame).await
    }

    /// Close and drop the transport, if still open.
    pub async fn close_transport(&self) {
        let sink = self.transport.lock().await.take();
        if let Some(mut sink) = sink
            && let Err(e) = sink.close().await
        {
            tracing::debug!(call_id = %self.call_id, "Error closing transport: {}", e);
        }
    }

    pub fn set_ai_task(&self, handle: AbortHandle) {
        *self.ai_task.lock() = Some(handle);
    }

    /// Cancel the audio bridge task. Returns `true` if a task was cancelled.
    pub fn abort_ai_task(&self) -> bool {
        match self.ai_task.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn set_call_task(&self, handle: AbortHandle) {
        *self.call_task.lock() = Some(handle);
    }

    pub fn abort_call_task(&self) {
        if let Some(handle) = self.call_task.lock().take() {
            handle.abort();
        }
    }

    /// Hold a slot of the concurrent-call limit for the session's lifetime.
    pub fn set_admission(&self, permit: OwnedSemaphorePermit) {
        *self.admission.lock() = Some(permit);
    }

    pub fn release_admission(&self) {
        drop(self.admission.lock().take());
    }

    /// Claim the cleanup. Only the first caller gets `true`.
    pub fn begin_cleanup(&self) -> bool {
        !self.cleaned_up.swap(true, Ordering::SeqCst)
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use CallStatus::*;
        assert!(Initializing.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Active));
        assert!(Active.can_transition_to(Ending));
        assert!(Ending.can_transition_to(Ended));
        assert!(Error.can_transition_to(Ended));
        for from in [Initializing, Connected, Active, Ending] {
            assert!(from.can_transition_to(Error), "{from} -> error");
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use CallStatus::*;
        assert!(!Initializing.can_transition_to(Active));
        assert!(!Active.can_transition_to(Ended));
        assert!(!Active.can_transition_to(Connected));
        assert!(!Ending.can_transition_to(Active));
        assert!(!Error.can_transition_to(Ending));
        for next in [Initializing, Connected, Active, Ending, Ended, Error] {
            assert!(!Ended.can_transition_to(next), "ended -> {next}");
        }
    }

    #[test]
    fn test_status_predicates() {
        assert!(CallStatus::Connected.is_live());
        assert!(CallStatus::Active.is_live());
        assert!(!CallStatus::Ending.is_live());
        assert!(CallStatus::Error.is_winding_down());
        assert!(CallStatus::Ended.is_terminal());
        assert_eq!(
            serde_json::to_string(&CallStatus::Active).unwrap(),
            "\"active\""
        );
    }

    #[tokio::test]
    async fn test_session_transition_and_watch() {
        let (session, _queues) = CallSession::new("call-1", "wss://example.com/ws", 8);
        let mut rx = session.subscribe_status();

        assert_eq!(session.status(), CallStatus::Initializing);
        assert!(!session.transition(CallStatus::Active));
        assert!(session.transition(CallStatus::Connected));
        assert!(session.transition(CallStatus::Active));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), CallStatus::Active);

        assert!(session.transition(CallStatus::Ending));
        assert!(!session.transition(CallStatus::Ending));
        assert!(session.transition(CallStatus::Ended));
        assert!(!session.transition(CallStatus::Error));
        assert_eq!(session.status(), CallStatus::Ended);
    }

    #[tokio::test]
    async fn test_cleanup_claimed_once() {
        let (session, _queues) = CallSession::new("call-1", "wss://example.com/ws", 8);
        assert!(session.begin_cleanup());
        assert!(!session.begin_cleanup());
        assert!(session.is_cleaned_up());
    }

    #[tokio::test]
    async fn test_close_queues_ends_consumers() {
        let (session, mut queues) = CallSession::new("call-1", "wss://example.com/ws", 8);
        session
            .input_queue()
            .push(Bytes::from_static(b"pcm"))
            .await
            .unwrap();
        session.close_queues();
        session.close_queues();

        assert_eq!(queues.input.recv().await.unwrap(), Bytes::from_static(b"pcm"));
        assert!(queues.input.recv().await.is_none());
        assert!(queues.output.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_frame_without_transport() {
        let (session, _queues) = CallSession::new("call-1", "wss://example.com/ws", 8);
        assert!(!session.has_transport().await);
        let result = session
            .send_frame(TransportFrame::Control("{}".to_string()))
            .await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_abort_ai_task() {
        let (session, _queues) = CallSession::new("call-1", "wss://example.com/ws", 8);
        assert!(!session.abort_ai_task());

        let task = tokio::spawn(std::future::pending::<()>());
        session.set_ai_task(task.abort_handle());
        assert!(session.abort_ai_task());
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
