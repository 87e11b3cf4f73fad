//! Gemini Live API module.
//!
//! Streams caller audio to a Gemini native-audio model and returns the
//! model's spoken replies.
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit signed little-endian at 16kHz.
//! Output audio is PCM 16-bit signed little-endian at 24kHz.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_gateway::core::realtime::{AudioBridge, GeminiBridgeConfig, GeminiLiveBridge};
//!
//! let bridge = GeminiLiveBridge::new(GeminiBridgeConfig::new("AIza..."))?;
//! bridge.run_session(caller_audio, output_queue).await?;
//! ```

mod client;
mod config;
mod messages;

pub use client::GeminiLiveBridge;
pub use config::{
    GEMINI_DEFAULT_INSTRUCTIONS, GEMINI_DEFAULT_MODEL, GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE,
    GEMINI_SETUP_TIMEOUT, GeminiBridgeConfig,
};
pub use messages::{Blob, ClientMessage, ServerContent, ServerMessage};
