//! Gemini Live API bridge implementation.
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON messages (text or binary frames)
//! - Input audio: PCM 16-bit, 16kHz, mono, base64 encoded
//! - Output audio: PCM 16-bit, 24kHz, mono, base64 encoded

use std::ops::ControlFlow;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::{GEMINI_OUTPUT_SAMPLE_RATE, GeminiBridgeConfig};
use super::messages::{ClientMessage, ServerMessage};
use crate::core::realtime::base::{AudioBridge, AudioSource, RealtimeError, RealtimeResult};
use crate::core::relay::AudioQueue;

type GeminiSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Gemini Live Bridge
// =============================================================================

/// Audio bridge backed by the Gemini Live API.
///
/// Each call to [`AudioBridge::run_session`] opens a fresh WebSocket session,
/// so one bridge instance can serve any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct GeminiLiveBridge {
    config: GeminiBridgeConfig,
}

impl GeminiLiveBridge {
    /// Create a bridge after validating the config.
    pub fn new(config: GeminiBridgeConfig) -> RealtimeResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the bridge configuration.
    pub fn config(&self) -> &GeminiBridgeConfig {
        &self.config
    }

    fn build_ws_url(&self) -> String {
        let separator = if self.config.url.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.config.url, separator, self.config.api_key)
    }

    /// Connect and complete the setup handshake.
    async fn open_session(&self) -> RealtimeResult<GeminiSocket> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(self.build_ws_url())
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        tracing::info!("Connected to Gemini Live API (model: {})", self.config.model);

        let setup = ClientMessage::setup(
            &self.config.model,
            &self.config.instructions,
            self.config.voice.as_deref(),
        );
        let json = serde_json::to_string(&setup)
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;

        tokio::time::timeout(self.config.setup_timeout, wait_for_setup_complete(&mut ws))
            .await
            .map_err(|_| RealtimeError::Timeout("Gemini Live setup handshake".to_string()))??;

        tracing::debug!("Gemini Live session setup complete");
        Ok(ws)
    }
}

async fn wait_for_setup_complete(ws: &mut GeminiSocket) -> RealtimeResult<()> {
    while let Some(msg) = ws.next().await {
        let payload = match msg {
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_bytes()),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(RealtimeError::ConnectionFailed(format!(
                    "Session closed during setup: {reason}"
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(RealtimeError::WebSocketError(e.to_string())),
        };

        match serde_json::from_slice::<ServerMessage>(&payload) {
            Ok(message) if message.is_setup_complete() => return Ok(()),
            Ok(_) => tracing::debug!("Ignoring Gemini message received before setupComplete"),
            Err(e) => tracing::warn!("Failed to parse Gemini setup response: {}", e),
        }
    }

    Err(RealtimeError::ConnectionFailed(
        "Session ended before setupComplete".to_string(),
    ))
}

/// Forward every caller chunk, then mark the end of the audio stream.
async fn send_loop<S>(
    mut sink: S,
    mut audio_source: AudioSource,
    mime_type: String,
) -> RealtimeResult<()>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut chunks_sent = 0usize;
    while let Some(chunk) = audio_source.next().await {
        send_client_message(&mut sink, &ClientMessage::audio(&chunk, &mime_type)).await?;
        chunks_sent += 1;
    }

    tracing::debug!("Caller audio ended after {} chunks", chunks_sent);
    send_client_message(&mut sink, &ClientMessage::audio_stream_end()).await?;
    if let Err(e) = sink.close().await {
        tracing::debug!("Error closing Gemini send half: {}", e);
    }
    Ok(())
}

async fn send_client_message<S>(sink: &mut S, message: &ClientMessage) -> RealtimeResult<()>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(message)
        .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
    sink.send(Message::Text(json.into())).await.map_err(|e| match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            RealtimeError::ConnectionFailed("Session closed by provider".to_string())
        }
        other => RealtimeError::WebSocketError(other.to_string()),
    })
}

/// Push every audio part of model output into the call's output queue.
async fn receive_loop<S>(mut stream: S, audio_out: AudioQueue) -> RealtimeResult<()>
where
    S: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let payload = match msg {
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_bytes()),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(frame)) => {
                return match frame {
                    Some(f) if f.code != CloseCode::Normal => {
                        Err(RealtimeError::ProviderError(format!(
                            "Session closed with code {}: {}",
                            u16::from(f.code),
                            f.reason
                        )))
                    }
                    _ => {
                        tracing::info!("Gemini Live session closed by server");
                        Ok(())
                    }
                };
            }
            Ok(_) => continue,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                break;
            }
            Err(e) => return Err(RealtimeError::WebSocketError(e.to_string())),
        };

        if handle_server_payload(&payload, &audio_out).await.is_break() {
            tracing::debug!("Output queue closed, stopping Gemini receive loop");
            break;
        }
    }
    Ok(())
}

async fn handle_server_payload(payload: &[u8], audio_out: &AudioQueue) -> ControlFlow<()> {
    let message: ServerMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Failed to parse Gemini server message: {}", e);
            return ControlFlow::Continue(());
        }
    };

    if let Some(go_away) = &message.go_away {
        tracing::warn!(
            "Gemini Live session will close soon (time left: {})",
            go_away.time_left.as_deref().unwrap_or("unknown")
        );
    }

    for blob in message.audio_parts() {
        let pcm = match blob.decode() {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::error!("Failed to decode Gemini audio: {}", e);
                continue;
            }
        };
        if audio_out.push(Bytes::from(pcm)).await.is_err() {
            return ControlFlow::Break(());
        }
    }

    if let Some(content) = &message.server_content {
        if content.interrupted {
            tracing::debug!("Gemini turn interrupted by caller speech");
        }
        if content.turn_complete {
            tracing::debug!("Gemini turn complete");
        }
    }

    ControlFlow::Continue(())
}

#[async_trait]
impl AudioBridge for GeminiLiveBridge {
    async fn run_session(
        &self,
        audio_source: AudioSource,
        audio_out: AudioQueue,
    ) -> RealtimeResult<()> {
        let ws = self.open_session().await?;
        let (sink, stream) = ws.split();

        let mime_type = self.config.audio_format.mime_type();
        tokio::try_join!(
            send_loop(sink, audio_source, mime_type),
            receive_loop(stream, audio_out),
        )?;

        tracing::info!("Gemini Live session ended");
        Ok(())
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "gemini",
            "api": "Gemini Live API",
            "model": self.config.model,
            "input_format": self.config.audio_format.mime_type(),
            "output_sample_rate": GEMINI_OUTPUT_SAMPLE_RATE,
        })
    }
}
