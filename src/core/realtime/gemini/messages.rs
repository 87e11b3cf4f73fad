//! Gemini Live API WebSocket message types.
//!
//! All messages are JSON objects keyed by the message kind. The server may
//! deliver them in either text or binary WebSocket frames.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - First message, selects model and response modality
//! - realtimeInput.audio - Base64 PCM chunk
//! - realtimeInput.audioStreamEnd - No more audio will be sent
//!
//! Server messages (received from server):
//! - setupComplete - Session ready
//! - serverContent - Model turn parts (inline audio), turn/interrupt flags
//! - goAway - Server will disconnect soon
//! - usageMetadata - Token accounting

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Client Messages
// =============================================================================

/// Message sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session setup (must be the first message)
    Setup(Setup),
    /// Realtime user input
    RealtimeInput(RealtimeInput),
}

/// Session setup payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Model resource name
    pub model: String,
    /// Generation configuration
    pub generation_config: GenerationConfig,
    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// Generation configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Response modalities ("AUDIO" or "TEXT")
    pub response_modalities: Vec<String>,
    /// Speech output configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Realtime input payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Audio chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    /// Marks the end of the audio stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

impl ClientMessage {
    /// Build the setup message for an audio-only session.
    pub fn setup(model: &str, instructions: &str, voice: Option<&str>) -> Self {
        let system_instruction = if instructions.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: vec![Part::text(instructions)],
            })
        };

        Self::Setup(Setup {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: voice.map(|name| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: name.to_string(),
                        },
                    },
                }),
            },
            system_instruction,
        })
    }

    /// Build a realtime audio message from raw PCM.
    pub fn audio(pcm: &[u8], mime_type: &str) -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: Some(Blob {
                mime_type: mime_type.to_string(),
                data: BASE64_STANDARD.encode(pcm),
            }),
            audio_stream_end: None,
        })
    }

    /// Build the end-of-audio marker.
    pub fn audio_stream_end() -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: None,
            audio_stream_end: Some(true),
        })
    }
}

// =============================================================================
// Shared Types
// =============================================================================

/// Inline binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type (e.g., "audio/pcm;rate=24000")
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
}

impl Blob {
    /// Whether the payload carries audio.
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }
}

/// Content made of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single content part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message received from server. Exactly one field is normally set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
    #[serde(default)]
    pub usage_metadata: Option<serde_json::Value>,
}

/// Incremental model output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

/// Notice that the server will close the session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Whether this is the setup acknowledgement.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Audio blobs carried by this message, in order.
    pub fn audio_parts(&self) -> impl Iterator<Item = &Blob> {
        self.server_content
            .iter()
            .filter_map(|content| content.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|blob| blob.is_audio())
    }
}
