pub mod llm;
pub mod realtime;
pub mod relay;
pub mod telephony;

// Re-export commonly used types for convenience
pub use llm::{ChatCompletionClient, ChatCompletionConfig, LlmError, LlmResult};

pub use realtime::{
    AudioBridge, AudioFormat, AudioSource, GeminiBridgeConfig, GeminiLiveBridge, RealtimeError,
    RealtimeResult,
};

pub use relay::{
    AudioQueue, CallSession, CallStatus, RelayConfig, RelayError, RelayEvent, RelayOrchestrator,
    RelayResult, SessionRegistry, WebSocketConnector,
};

pub use telephony::{TelephonyApi, TelephonyError, VapiClient};
