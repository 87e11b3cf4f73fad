use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, calls, chat};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route(
            "/custom-llm-test/chat/completions",
            post(chat::chat_completions),
        )
        .route("/calls", get(calls::list_calls).post(calls::start_call))
        .route(
            "/calls/{call_id}",
            get(calls::get_call_status).delete(calls::end_call),
        )
        .layer(TraceLayer::new_for_http())
}
