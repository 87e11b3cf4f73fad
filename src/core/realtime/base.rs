//! Base traits and types for realtime audio bridge providers.
//!
//! An audio bridge owns one streaming session with a generative-audio
//! provider per call. It consumes caller audio from a lazy stream and
//! pushes model audio into the call's output queue.
//!
//! # Audio Format
//!
//! Caller audio is PCM 16-bit signed little-endian, 16kHz, mono.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::relay::AudioQueue;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a realtime bridge session.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Session error
    #[error("Session error: {0}")]
    SessionError(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Audio Format
// =============================================================================

/// Raw audio format exchanged with the call transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bit_depth: u16,
    /// Sample encoding
    pub encoding: String,
    /// Container format
    pub container: String,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
            encoding: "pcm_s16le".to_string(),
            container: "raw".to_string(),
        }
    }
}

impl AudioFormat {
    /// MIME type advertised to providers for this format.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Lazy, finite sequence of caller PCM chunks for one session.
pub type AudioSource = BoxStream<'static, Bytes>;

/// Base trait for realtime audio bridges.
///
/// `run_session` opens exactly one provider session, forwards every chunk of
/// `audio_source` to the provider and pushes every audio chunk the provider
/// returns into `audio_out`. It returns when both directions have ended;
/// the first failure in either direction ends the session with that error.
///
/// A closed `audio_out` queue means the call is winding down and ends the
/// receive direction without an error.
#[async_trait]
pub trait AudioBridge: Send + Sync {
    /// Run one provider session until both directions finish.
    async fn run_session(
        &self,
        audio_source: AudioSource,
        audio_out: AudioQueue,
    ) -> RealtimeResult<()>;

    /// Get provider information.
    fn get_provider_info(&self) -> serde_json::Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_audio_format() {
        let format = AudioFormat::default();
        assert_eq!(format.sample_rate, 16000);
        assert_eq!(format.channels, 1);
        assert_eq!(format.bit_depth, 16);
        assert_eq!(format.encoding, "pcm_s16le");
        assert_eq!(format.container, "raw");
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(AudioFormat::default().mime_type(), "audio/pcm;rate=16000");

        let format = AudioFormat {
            sample_rate: 24000,
            ..Default::default()
        };
        assert_eq!(format.mime_type(), "audio/pcm;rate=24000");
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::ConnectionFailed("test".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let err = RealtimeError::Timeout("setup".to_string());
        assert_eq!(err.to_string(), "Operation timed out: setup");
    }
}
