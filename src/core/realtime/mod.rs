//! Realtime audio-to-audio bridge module.
//!
//! # Supported Providers
//!
//! - **Gemini Live API** - Native-audio dialog models
//!
//! # Architecture
//!
//! - `AudioBridge` trait for provider abstraction
//! - One provider session per call, driven by the relay orchestrator
//! - Model audio is pushed into the call's output queue

mod base;
pub mod gemini;

pub use base::{AudioBridge, AudioFormat, AudioSource, RealtimeError, RealtimeResult};
pub use gemini::{GeminiBridgeConfig, GeminiLiveBridge};
