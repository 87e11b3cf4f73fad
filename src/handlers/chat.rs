use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

use crate::core::llm::is_streaming_request;
use crate::errors::AppError;
use crate::state::AppState;

/// A missing, null or empty `messages` field counts as missing.
fn has_messages(request: &Value) -> bool {
    match request.get("messages") {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

/// OpenAI-compatible chat completions for the voice platform's custom-LLM hook.
///
/// Streaming requests (the default) are answered with `text/event-stream`,
/// one `data: <json>` event per upstream chunk. Non-streaming requests are
/// forwarded as-is and the upstream JSON returned unmodified.
pub async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            return AppError::BadRequest("Request body must be a JSON object".to_string())
                .into_response();
        }
        Err(e) => {
            return AppError::BadRequest(format!("Invalid JSON body: {e}")).into_response();
        }
    };

    if !has_messages(&request) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing 'messages' field"})),
        )
            .into_response();
    }

    if is_streaming_request(&request) {
        match state.chat.stream_completion(&request).await {
            Ok(stream) => {
                info!("Streaming chat completion to client");
                (
                    [
                        (header::CONTENT_TYPE, "text/event-stream"),
                        (header::CACHE_CONTROL, "no-cache"),
                    ],
                    Body::from_stream(stream),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Chat completion error: {}", e);
                AppError::from(e).into_response()
            }
        }
    } else {
        match state.chat.complete(&request).await {
            Ok(completion) => (
                [(header::CONTENT_TYPE, "application/json")],
                completion,
            )
                .into_response(),
            Err(e) => {
                error!("Chat completion error: {}", e);
                AppError::from(e).into_response()
            }
        }
    }
}
