//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `chat` - Custom-LLM chat-completion proxy
//! - `calls` - Relayed call management

pub mod api;
pub mod calls;
pub mod chat;

pub use api::health_check;
pub use chat::chat_completions;
