//! Relay orchestrator: owns the lifecycle of every relayed call.
//!
//! For each call the orchestrator creates the call through the telephony API,
//! connects the call transport with bounded retry, then runs three loops in a
//! task group scoped to the call:
//!
//! - audio bridge driver: caller audio from the input queue to the model,
//!   model audio into the output queue
//! - transport send loop: output queue to the transport, plus keepalive pings
//! - transport receive loop: binary frames to the input queue, text frames
//!   to the control-message handler
//!
//! Whatever ends the call (explicit end, remote hang-up, a failed loop), the
//! group is cancelled and cleanup runs exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use futures_util::StreamExt;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::RelayConfig;
use super::control::{ControlMessage, handle_control_frame};
use super::error::{RelayError, RelayResult};
use super::events::{EVENT_CHANNEL_CAPACITY, RelayEvent};
use super::registry::SessionRegistry;
use super::session::{CallSession, CallStatus, SessionQueues};
use super::transport::{
    Keepalive, TransportConnector, TransportFrame, TransportStream, connect_with_retry,
};
use crate::core::realtime::{AudioBridge, AudioSource};
use crate::core::telephony::{Call, CreateCallRequest, TelephonyApi};

/// The three concurrent loops of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallLoop {
    Bridge,
    TransportSend,
    TransportReceive,
}

/// Coordinates calls between the telephony platform and the audio bridge.
pub struct RelayOrchestrator {
    config: RelayConfig,
    assistant_id: String,
    telephony: Arc<dyn TelephonyApi>,
    connector: Arc<dyn TransportConnector>,
    bridge: Arc<dyn AudioBridge>,
    registry: SessionRegistry,
    admission: Arc<Semaphore>,
    events: broadcast::Sender<RelayEvent>,
}

impl RelayOrchestrator {
    pub fn new(
        config: RelayConfig,
        assistant_id: impl Into<String>,
        telephony: Arc<dyn TelephonyApi>,
        connector: Arc<dyn TransportConnector>,
        bridge: Arc<dyn AudioBridge>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let admission = Arc::new(Semaphore::new(config.max_concurrent_calls));
        Self {
            admission,
            config,
            assistant_id: assistant_id.into(),
            telephony,
            connector,
            bridge,
            registry: SessionRegistry::new(),
            events,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Subscribe to call lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    pub fn active_calls(&self) -> usize {
        self.registry.len()
    }

    pub fn list_statuses(&self) -> HashMap<String, CallStatus> {
        self.registry.list_statuses()
    }

    pub fn call_status(&self, call_id: &str) -> Option<CallStatus> {
        self.registry.get(call_id).map(|session| session.status())
    }

    /// Look a call up on the telephony platform.
    pub async fn get_call(&self, call_id: &str) -> RelayResult<Call> {
        Ok(self.telephony.get_call(call_id).await?)
    }

    // =========================================================================
    // Call lifecycle
    // =========================================================================

    /// Create a call and start relaying it in the background.
    ///
    /// Returns the call id once the session is registered. Connection and
    /// streaming happen asynchronously; watch [`subscribe`](Self::subscribe)
    /// or the registry for progress.
    pub async fn start_call(self: &Arc<Self>) -> RelayResult<String> {
        // The permit is held by the session until cleanup.
        let permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| RelayError::CapacityExceeded(self.config.max_concurrent_calls))?;

        let request = CreateCallRequest::websocket(&self.assistant_id);
        let call = self.telephony.create_call(&request).await.map_err(|e| {
            tracing::error!("Failed to create call: {}", e);
            RelayError::from(e)
        })?;

        let call_id = call.call_id()?.to_string();
        let transport_url = call.websocket_call_url()?;

        let (session, queues) =
            CallSession::new(&call_id, transport_url.as_str(), self.config.queue_capacity);
        session.set_admission(permit);
        let session = Arc::new(session);
        self.registry.register(session.clone())?;

        tracing::info!(call_id = %call_id, transport_url = %transport_url, "Call session created");

        let this = Arc::clone(self);
        let task_session = session.clone();
        let handle = tokio::spawn(async move { this.run_call(task_session, queues).await });
        session.set_call_task(handle.abort_handle());

        Ok(call_id)
    }

    /// End a call: send `end-call` on the transport, then close both queues.
    ///
    /// The frame goes out before the status moves to Ending, since Ending
    /// starts teardown of the transport.
    pub async fn end_call(&self, call_id: &str) -> RelayResult<()> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| RelayError::CallNotFound(call_id.to_string()))?;

        tracing::info!(call_id = %call_id, "Ending call");

        if session.status().is_live() && session.has_transport().await {
            let frame = TransportFrame::Control(ControlMessage::EndCall.to_json()?);
            if let Err(e) = session.send_frame(frame).await {
                tracing::warn!(call_id = %call_id, "Failed to send end-call message: {}", e);
            }
        }

        session.transition(CallStatus::Ending);
        session.close_queues();
        Ok(())
    }

    /// End every active call and wait for the grace period.
    ///
    /// Sessions still registered after the grace period are cleaned up
    /// forcibly, so the registry is empty on return.
    pub async fn end_all(&self) {
        let call_ids = self.registry.call_ids();
        if call_ids.is_empty() {
            return;
        }

        tracing::info!("Ending {} active calls", call_ids.len());
        for call_id in &call_ids {
            if let Err(e) = self.end_call(call_id).await {
                tracing::debug!(call_id = %call_id, "Call already gone: {}", e);
            }
        }

        tokio::time::sleep(self.config.shutdown_grace).await;

        for call_id in self.registry.call_ids() {
            let Some(session) = self.registry.get(&call_id) else {
                continue;
            };
            if session.begin_cleanup() {
                tracing::warn!(call_id = %call_id, "Forcing cleanup after grace period");
                session.abort_call_task();
                self.finish_cleanup(&session).await;
                continue;
            }

            // Cleanup is already running on the call task.
            let mut status = session.subscribe_status();
            let finished = tokio::time::timeout(
                self.config.shutdown_grace,
                status.wait_for(|s| s.is_terminal()),
            )
            .await;
            if !matches!(finished, Ok(Ok(_))) {
                tracing::warn!(call_id = %call_id, "Cleanup did not finish in time, dropping session");
                self.registry.unregister(&call_id);
                session.release_admission();
            }
        }
    }

    pub async fn shutdown(&self) {
        self.end_all().await;
        tracing::info!("Relay orchestrator shut down");
    }

    async fn run_call(self: Arc<Self>, session: Arc<CallSession>, queues: SessionQueues) {
        if let Err(e) = self.drive_call(&session, queues).await {
            tracing::error!(call_id = %session.call_id(), "Call failed: {}", e);
            session.transition(CallStatus::Error);
            let _ = self.events.send(RelayEvent::CallFailed {
                call_id: session.call_id().to_string(),
                error: e.to_string(),
            });
        }
        self.cleanup(&session).await;
    }

    async fn drive_call(
        &self,
        session: &Arc<CallSession>,
        queues: SessionQueues,
    ) -> RelayResult<()> {
        let call_id = session.call_id();
        let mut status_rx = session.subscribe_status();
        let policy = self.config.retry_policy();

        let connection = tokio::select! {
            result = connect_with_retry(
                self.connector.as_ref(),
                session.transport_url(),
                &policy,
            ) => result?,
            _ = status_rx.wait_for(|status| status.is_winding_down()) => {
                tracing::info!(call_id = %call_id, "Call ended before transport connected");
                return Ok(());
            }
        };

        session.set_transport(connection.sink).await;
        if !session.transition(CallStatus::Connected) {
            return Ok(());
        }
        tracing::info!(call_id = %call_id, "Transport connected");

        let poll = self.config.queue_poll_timeout;
        let keepalive = Arc::new(Keepalive::new(
            self.config.ping_interval,
            self.config.ping_timeout,
        ));
        let mut tasks: JoinSet<(CallLoop, RelayResult<()>)> = JoinSet::new();

        let bridge = self.bridge.clone();
        let audio_source = caller_audio(session.clone(), queues.input, poll);
        let audio_out = session.output_queue().clone();
        let ai_task = tasks.spawn(async move {
            let result = bridge.run_session(audio_source, audio_out).await;
            (CallLoop::Bridge, result.map_err(RelayError::from))
        });
        session.set_ai_task(ai_task);

        let send_session = session.clone();
        let send_keepalive = keepalive.clone();
        let output = queues.output;
        tasks.spawn(async move {
            let result = transport_send_loop(send_session, output, send_keepalive, poll).await;
            (CallLoop::TransportSend, result)
        });

        let recv_session = session.clone();
        let stream = connection.stream;
        tasks.spawn(async move {
            let result = transport_receive_loop(recv_session, stream, keepalive).await;
            (CallLoop::TransportReceive, result)
        });

        if session.transition(CallStatus::Active) {
            tracing::info!(call_id = %call_id, "Call active");
            let _ = self.events.send(RelayEvent::CallStarted {
                call_id: call_id.to_string(),
            });
        }

        let result = loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok((kind, Ok(())))) => {
                        tracing::debug!(call_id = %call_id, "{:?} loop finished", kind);
                        if kind != CallLoop::TransportSend {
                            session.transition(CallStatus::Ending);
                        }
                    }
                    Some(Ok((kind, Err(e)))) => {
                        tracing::error!(call_id = %call_id, "{:?} loop failed: {}", kind, e);
                        break Err(e);
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        break Err(RelayError::Transport(format!("call task panicked: {e}")));
                    }
                },
                _ = status_rx.wait_for(|status| status.is_winding_down()) => break Ok(()),
            }
        };

        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Err(e))) => {
                    tracing::debug!(call_id = %call_id, "{:?} loop ended during teardown: {}", kind, e);
                }
                Err(e) if !e.is_cancelled() => {
                    tracing::warn!(call_id = %call_id, "Call task failed during teardown: {}", e);
                }
                _ => {}
            }
        }

        result
    }

    /// Tear a session down. Only the first call for a session does anything.
    async fn cleanup(&self, session: &CallSession) {
        if session.begin_cleanup() {
            self.finish_cleanup(session).await;
        }
    }

    async fn finish_cleanup(&self, session: &CallSession) {
        let call_id = session.call_id();

        if session.abort_ai_task() {
            tracing::debug!(call_id = %call_id, "Audio bridge task cancelled");
        }
        session.close_transport().await;
        session.close_queues();

        let status = session.status();
        if status != CallStatus::Error {
            session.transition(CallStatus::Ending);
        }
        let final_status = if status == CallStatus::Error {
            CallStatus::Error
        } else {
            CallStatus::Ended
        };

        self.registry.unregister(call_id);
        session.release_admission();
        session.transition(CallStatus::Ended);

        tracing::info!(call_id = %call_id, final_status = %final_status, "Call cleaned up");
        let _ = self.events.send(RelayEvent::CallEnded {
            call_id: call_id.to_string(),
            final_status,
        });
    }
}

// =============================================================================
// Per-call loops
// =============================================================================

/// Caller audio as a lazy stream: yields while the call is live and ends when
/// the input queue is closed.
fn caller_audio(
    session: Arc<CallSession>,
    input: mpsc::Receiver<Bytes>,
    poll: Duration,
) -> AudioSource {
    stream::unfold((session, input), move |(session, mut input)| async move {
        loop {
            if !session.status().is_live() {
                return None;
            }
            match tokio::time::timeout(poll, input.recv()).await {
                Ok(Some(chunk)) => return Some((chunk, (session, input))),
                Ok(None) => return None,
                Err(_) => continue,
            }
        }
    })
    .boxed()
}

async fn transport_send_loop(
    session: Arc<CallSession>,
    mut output: mpsc::Receiver<Bytes>,
    keepalive: Arc<Keepalive>,
    poll: Duration,
) -> RelayResult<()> {
    let mut ping = tokio::time::interval_at(
        Instant::now() + keepalive.interval(),
        keepalive.interval(),
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if !session.status().is_live() {
            return Ok(());
        }

        tokio::select! {
            received = tokio::time::timeout(poll, output.recv()) => match received {
                Ok(Some(chunk)) => session.send_frame(TransportFrame::Audio(chunk)).await?,
                Ok(None) => {
                    tracing::debug!(call_id = %session.call_id(), "Output queue closed");
                    return Ok(());
                }
                Err(_) => {}
            },
            now = ping.tick() => {
                if keepalive.on_tick(now)? {
                    session.send_frame(TransportFrame::Ping(Bytes::new())).await?;
                }
            }
            _ = sleep_until_deadline(keepalive.pong_deadline()) => {
                keepalive.check_pong(Instant::now())?;
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn transport_receive_loop(
    session: Arc<CallSession>,
    mut stream: TransportStream,
    keepalive: Arc<Keepalive>,
) -> RelayResult<()> {
    while let Some(frame) = stream.next().await {
        match frame? {
            TransportFrame::Audio(chunk) => {
                if session.input_queue().push(chunk).await.is_err() {
                    tracing::trace!(call_id = %session.call_id(), "Input queue closed, dropping audio");
                }
            }
            TransportFrame::Control(text) => handle_control_frame(&session, &text),
            TransportFrame::Pong(_) => keepalive.on_pong(),
            TransportFrame::Ping(_) => {}
        }
    }

    tracing::info!(call_id = %session.call_id(), "Transport closed by remote");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::{RealtimeError, RealtimeResult};
    use crate::core::relay::queue::AudioQueue;
    use crate::core::relay::transport::TransportConnection;
    use crate::core::telephony::{TelephonyError, TelephonyResult};
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use futures_util::SinkExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::broadcast::error::TryRecvError;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    enum CreateBehavior {
        Ok,
        /// Succeeds after a delay
        Slow(Duration),
        NoTransport,
        Unauthorized,
    }

    struct FakeTelephony {
        behavior: CreateBehavior,
        counter: AtomicU32,
    }

    impl FakeTelephony {
        fn new(behavior: CreateBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                counter: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TelephonyApi for FakeTelephony {
        async fn create_call(&self, request: &CreateCallRequest) -> TelephonyResult<Call> {
            assert_eq!(request.transport.provider, "vapi.websocket");
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let id = format!("call-{n}");
            if let CreateBehavior::Slow(delay) = self.behavior {
                tokio::time::sleep(delay).await;
            }
            match self.behavior {
                CreateBehavior::Ok | CreateBehavior::Slow(_) => Ok(Call {
                    id: Some(id.clone()),
                    transport: Some(serde_json::json!({
                        "websocketCallUrl": format!("wss://fake.test/{id}")
                    })),
                    ..Default::default()
                }),
                CreateBehavior::NoTransport => Ok(Call {
                    id: Some(id),
                    ..Default::default()
                }),
                CreateBehavior::Unauthorized => Err(TelephonyError::Api {
                    status: 401,
                    body: "unauthorized".to_string(),
                }),
            }
        }

        async fn get_call(&self, call_id: &str) -> TelephonyResult<Call> {
            Ok(Call {
                id: Some(call_id.to_string()),
                status: Some("in-progress".to_string()),
                ..Default::default()
            })
        }
    }

    /// Remote end of an in-memory transport.
    struct FakePeer {
        to_relay: fmpsc::UnboundedSender<RelayResult<TransportFrame>>,
        from_relay: fmpsc::UnboundedReceiver<TransportFrame>,
    }

    impl FakePeer {
        async fn send(&mut self, frame: TransportFrame) {
            self.to_relay.send(Ok(frame)).await.unwrap();
        }

        /// Next non-ping frame written by the relay.
        async fn next_frame(&mut self) -> Option<TransportFrame> {
            loop {
                match self.from_relay.next().await {
                    Some(TransportFrame::Ping(_)) => continue,
                    other => return other,
                }
            }
        }
    }

    struct ChannelConnector {
        failures: u32,
        attempts: AtomicU32,
        peers: mpsc::UnboundedSender<FakePeer>,
    }

    impl ChannelConnector {
        fn new(failures: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
            let (peers, peers_rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    failures,
                    attempts: AtomicU32::new(0),
                    peers,
                }),
                peers_rx,
            )
        }
    }

    #[async_trait]
    impl TransportConnector for ChannelConnector {
        async fn connect(&self, url: &str) -> RelayResult<TransportConnection> {
            assert!(url.starts_with("wss://fake.test/"));
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(RelayError::Connection("refused".to_string()));
            }

            let (out_tx, out_rx) = fmpsc::unbounded::<TransportFrame>();
            let (in_tx, in_rx) = fmpsc::unbounded::<RelayResult<TransportFrame>>();
            let _ = self.peers.send(FakePeer {
                to_relay: in_tx,
                from_relay: out_rx,
            });

            Ok(TransportConnection {
                sink: Box::pin(out_tx.sink_map_err(|e| RelayError::Transport(e.to_string()))),
                stream: in_rx.boxed(),
            })
        }
    }

    struct EchoBridge;

    #[async_trait]
    impl AudioBridge for EchoBridge {
        async fn run_session(
            &self,
            mut audio_source: AudioSource,
            audio_out: AudioQueue,
        ) -> RealtimeResult<()> {
            while let Some(chunk) = audio_source.next().await {
                if audio_out.push(chunk).await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        fn get_provider_info(&self) -> serde_json::Value {
            serde_json::json!({"provider": "echo"})
        }
    }

    struct FailingBridge;

    #[async_trait]
    impl AudioBridge for FailingBridge {
        async fn run_session(&self, _: AudioSource, _: AudioQueue) -> RealtimeResult<()> {
            Err(RealtimeError::ProviderError("model unavailable".to_string()))
        }

        fn get_provider_info(&self) -> serde_json::Value {
            serde_json::json!({"provider": "failing"})
        }
    }

    fn test_config() -> RelayConfig {
        RelayConfig {
            ping_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn orchestrator(
        telephony: Arc<dyn TelephonyApi>,
        connector: Arc<dyn TransportConnector>,
        bridge: Arc<dyn AudioBridge>,
        config: RelayConfig,
    ) -> Arc<RelayOrchestrator> {
        Arc::new(RelayOrchestrator::new(
            config, "asst_test", telephony, connector, bridge,
        ))
    }

    async fn next_event(events: &mut broadcast::Receiver<RelayEvent>) -> RelayEvent {
        events.recv().await.unwrap()
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_audio_relayed_and_end_call() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        assert_eq!(call_id, "call-0");

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallStarted {
                call_id: call_id.clone()
            }
        );
        assert_eq!(relay.call_status(&call_id), Some(CallStatus::Active));

        peer.send(TransportFrame::Audio(Bytes::from_static(b"hello")))
            .await;
        assert_eq!(
            peer.next_frame().await,
            Some(TransportFrame::Audio(Bytes::from_static(b"hello")))
        );

        relay.end_call(&call_id).await.unwrap();
        assert_eq!(
            peer.next_frame().await,
            Some(TransportFrame::Control(r#"{"type":"end-call"}"#.to_string()))
        );

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                call_id: call_id.clone(),
                final_status: CallStatus::Ended,
            }
        );
        assert!(relay.registry().is_empty());
        assert_eq!(peer.next_frame().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_call_ended() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        next_event(&mut events).await;

        peer.send(TransportFrame::Control(r#"{"type":"call-ended"}"#.to_string()))
            .await;

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                call_id,
                final_status: CallStatus::Ended,
            }
        );
        assert!(relay.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_frame() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        next_event(&mut events).await;

        peer.send(TransportFrame::Control("{broken".to_string()))
            .await;
        peer.send(TransportFrame::Control(
            r#"{"type":"error","message":"x"}"#.to_string(),
        ))
        .await;

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                call_id,
                final_status: CallStatus::Error,
            }
        );
        assert!(relay.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_closed_by_remote() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        relay.start_call().await.unwrap();
        let peer = peers.recv().await.unwrap();
        next_event(&mut events).await;

        drop(peer);

        assert!(matches!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                final_status: CallStatus::Ended,
                ..
            }
        ));
        assert!(relay.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_failure_fails_call() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(FailingBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        let _peer = peers.recv().await.unwrap();

        let mut failed = false;
        loop {
            match next_event(&mut events).await {
                RelayEvent::CallFailed { error, .. } => {
                    assert!(error.contains("model unavailable"));
                    failed = true;
                }
                RelayEvent::CallEnded { final_status, .. } => {
                    assert_eq!(final_status, CallStatus::Error);
                    break;
                }
                RelayEvent::CallStarted { .. } => {}
            }
        }
        assert!(failed);
        assert!(!relay.registry().contains(&call_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_after_retries() {
        let (connector, _peers) = ChannelConnector::new(u32::MAX);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector.clone(),
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let started = Instant::now();
        relay.start_call().await.unwrap();

        match next_event(&mut events).await {
            RelayEvent::CallFailed { error, .. } => assert!(error.contains("Connection error")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                final_status: CallStatus::Error,
                ..
            }
        ));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert!(relay.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_after_two_failures() {
        let (connector, mut peers) = ChannelConnector::new(2);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector.clone(),
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let started = Instant::now();
        relay.start_call().await.unwrap();
        let _peer = peers.recv().await.unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            RelayEvent::CallStarted { .. }
        ));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_during_connect() {
        let (connector, _peers) = ChannelConnector::new(u32::MAX);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector.clone(),
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        relay.end_call(&call_id).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                call_id,
                final_status: CallStatus::Ended,
            }
        );
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_create_response() {
        let (connector, _peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::NoTransport),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );

        let result = relay.start_call().await;
        assert!(matches!(result, Err(RelayError::Protocol(_))));
        assert!(relay.registry().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_is_returned() {
        let (connector, _peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Unauthorized),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );

        let result = relay.start_call().await;
        assert!(matches!(
            result,
            Err(RelayError::UpstreamApi(TelephonyError::Api { status: 401, .. }))
        ));
        assert!(relay.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_limit() {
        let (connector, _peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            RelayConfig {
                max_concurrent_calls: 1,
                ..test_config()
            },
        );

        relay.start_call().await.unwrap();
        assert!(matches!(
            relay.start_call().await,
            Err(RelayError::CapacityExceeded(1))
        ));
        relay.end_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_respect_capacity() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Slow(Duration::from_millis(100))),
            connector,
            Arc::new(EchoBridge),
            RelayConfig {
                max_concurrent_calls: 1,
                ..test_config()
            },
        );
        let mut events = relay.subscribe();

        let (a, b) = tokio::join!(relay.start_call(), relay.start_call());
        let (admitted, rejected) = if a.is_ok() { (a, b) } else { (b, a) };
        let call_id = admitted.unwrap();
        assert!(matches!(rejected, Err(RelayError::CapacityExceeded(1))));
        assert_eq!(relay.active_calls(), 1);

        let _peer = peers.recv().await.unwrap();
        next_event(&mut events).await;
        relay.end_call(&call_id).await.unwrap();
        while !matches!(next_event(&mut events).await, RelayEvent::CallEnded { .. }) {}

        // The slot is free again once the call is cleaned up
        let next_call = relay.start_call().await.unwrap();
        assert_ne!(next_call, call_id);
        relay.end_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_pong_fails_call() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            RelayConfig::default(),
        );
        let mut events = relay.subscribe();

        let started = Instant::now();
        let call_id = relay.start_call().await.unwrap();
        // Held open but never answers pings
        let _peer = peers.recv().await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            RelayEvent::CallStarted { .. }
        ));

        match next_event(&mut events).await {
            RelayEvent::CallFailed { error, .. } => assert!(error.contains("keepalive")),
            other => panic!("unexpected event {other:?}"),
        }
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(40) && elapsed < Duration::from_secs(41),
            "failed after {elapsed:?}"
        );

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::CallEnded {
                call_id,
                final_status: CallStatus::Error,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_call_frame_reaches_transport() {
        for _ in 0..50 {
            let (connector, mut peers) = ChannelConnector::new(0);
            let relay = orchestrator(
                FakeTelephony::new(CreateBehavior::Ok),
                connector,
                Arc::new(EchoBridge),
                test_config(),
            );
            let mut events = relay.subscribe();

            let call_id = relay.start_call().await.unwrap();
            let mut peer = peers.recv().await.unwrap();
            assert!(matches!(
                next_event(&mut events).await,
                RelayEvent::CallStarted { .. }
            ));

            relay.end_call(&call_id).await.unwrap();
            let frame = tokio::time::timeout(Duration::from_secs(5), peer.next_frame())
                .await
                .expect("transport not closed");
            assert_eq!(
                frame,
                Some(TransportFrame::Control(r#"{"type":"end-call"}"#.to_string()))
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_forced_and_own_cleanup_end_call_once() {
        for _ in 0..20 {
            let (connector, mut peers) = ChannelConnector::new(0);
            let relay = orchestrator(
                FakeTelephony::new(CreateBehavior::Ok),
                connector,
                Arc::new(EchoBridge),
                RelayConfig {
                    shutdown_grace: Duration::ZERO,
                    ..test_config()
                },
            );
            let mut events = relay.subscribe();

            let mut held_peers = Vec::new();
            for _ in 0..3 {
                relay.start_call().await.unwrap();
                held_peers.push(peers.recv().await.unwrap());
            }
            let mut started = 0;
            while started < 3 {
                if let RelayEvent::CallStarted { .. } = next_event(&mut events).await {
                    started += 1;
                }
            }

            // No grace period: forced cleanup races each call's own cleanup
            relay.end_all().await;
            assert!(relay.registry().is_empty());

            let mut ended: HashMap<String, usize> = HashMap::new();
            let quiet = tokio::time::sleep(Duration::from_millis(200));
            tokio::pin!(quiet);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(RelayEvent::CallEnded { call_id, .. }) => {
                            *ended.entry(call_id).or_default() += 1;
                        }
                        Ok(_) => {}
                        Err(e) => panic!("event channel failed: {e}"),
                    },
                    _ = &mut quiet => break,
                }
            }

            assert_eq!(ended.len(), 3, "{ended:?}");
            assert!(ended.values().all(|&count| count == 1), "{ended:?}");
        }
    }

    #[tokio::test]
    async fn test_end_unknown_call() {
        let (connector, _peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        assert!(matches!(
            relay.end_call("nope").await,
            Err(RelayError::CallNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_all_empties_registry() {
        for count in [0usize, 1, 5] {
            let (connector, mut peers) = ChannelConnector::new(0);
            let relay = orchestrator(
                FakeTelephony::new(CreateBehavior::Ok),
                connector,
                Arc::new(EchoBridge),
                test_config(),
            );
            let mut events = relay.subscribe();

            let mut held_peers = Vec::new();
            for _ in 0..count {
                relay.start_call().await.unwrap();
                held_peers.push(peers.recv().await.unwrap());
                next_event(&mut events).await;
            }
            assert_eq!(relay.active_calls(), count);

            relay.end_all().await;
            assert!(relay.registry().is_empty(), "{count} calls");
            assert!(relay.list_statuses().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_once() {
        let (connector, mut peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let mut events = relay.subscribe();

        let call_id = relay.start_call().await.unwrap();
        let _peer = peers.recv().await.unwrap();
        next_event(&mut events).await;
        let session = relay.registry().get(&call_id).unwrap();

        relay.end_call(&call_id).await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            RelayEvent::CallEnded { .. }
        ));

        relay.cleanup(&session).await;
        relay.cleanup(&session).await;
        assert_eq!(session.status(), CallStatus::Ended);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_get_call_delegates() {
        let (connector, _peers) = ChannelConnector::new(0);
        let relay = orchestrator(
            FakeTelephony::new(CreateBehavior::Ok),
            connector,
            Arc::new(EchoBridge),
            test_config(),
        );
        let call = relay.get_call("call-42").await.unwrap();
        assert_eq!(call.id.as_deref(), Some("call-42"));
        assert_eq!(call.status.as_deref(), Some("in-progress"));
    }
}
