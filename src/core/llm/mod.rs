//! Chat-completion upstream (OpenAI-compatible) used by the custom-LLM endpoint.
//!
//! Streaming requests are rewritten (configured system prompt appended) and
//! the upstream server-sent events are re-framed one `data:` event per chunk.
//! Non-streaming requests are forwarded verbatim.

mod client;
mod sse;

pub use client::{
    ChatCompletionClient, ChatCompletionConfig, DEFAULT_LLM_MODEL, DEFAULT_SYSTEM_PROMPT,
    LlmError, LlmResult, OPENAI_DEFAULT_BASE_URL, is_streaming_request,
};
pub use sse::{SseByteStream, reframe_sse, sse_data_event};
