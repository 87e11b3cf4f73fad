//! Gemini Live API configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::realtime::base::{AudioFormat, RealtimeError, RealtimeResult};

/// Gemini Live API WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio dialog model.
pub const GEMINI_DEFAULT_MODEL: &str = "models/gemini-2.5-flash-preview-native-audio-dialog";

/// Default system instruction for the voice agent.
pub const GEMINI_DEFAULT_INSTRUCTIONS: &str =
    "You are a demo assistant that pitches the product concisely.";

/// Sample rate of audio produced by native-audio models.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Default time to wait for `setupComplete` after sending `setup`.
pub const GEMINI_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the Gemini Live bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiBridgeConfig {
    /// Google AI API key
    pub api_key: String,

    /// Model resource name (e.g., "models/gemini-2.5-flash-preview-native-audio-dialog")
    #[serde(default = "default_model")]
    pub model: String,

    /// System instruction for the session
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// WebSocket endpoint, overridable for proxies and tests
    #[serde(default = "default_url")]
    pub url: String,

    /// Prebuilt voice name (e.g., "Puck", "Kore")
    #[serde(default)]
    pub voice: Option<String>,

    /// Format of the caller audio forwarded to the model
    #[serde(default)]
    pub audio_format: AudioFormat,

    /// Maximum wait for the setup handshake
    #[serde(skip, default = "default_setup_timeout")]
    pub setup_timeout: Duration,
}

fn default_model() -> String {
    GEMINI_DEFAULT_MODEL.to_string()
}

fn default_instructions() -> String {
    GEMINI_DEFAULT_INSTRUCTIONS.to_string()
}

fn default_url() -> String {
    GEMINI_LIVE_URL.to_string()
}

fn default_setup_timeout() -> Duration {
    GEMINI_SETUP_TIMEOUT
}

impl Default for GeminiBridgeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            instructions: default_instructions(),
            url: default_url(),
            voice: None,
            audio_format: AudioFormat::default(),
            setup_timeout: GEMINI_SETUP_TIMEOUT,
        }
    }
}

impl GeminiBridgeConfig {
    /// Create a config with the given API key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Check that the config can be used to open a session.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if !self.model.starts_with("models/") {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "model must be a resource name starting with 'models/', got '{}'",
                self.model
            )));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "Gemini Live URL must use ws:// or wss://, got '{}'",
                self.url
            )));
        }
        Ok(())
    }
}
