use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::llm::ChatCompletionClient;
use crate::core::realtime::GeminiLiveBridge;
use crate::core::relay::{RelayOrchestrator, WebSocketConnector};
use crate::core::telephony::VapiClient;

/// Shared state for all handlers.
pub struct AppState {
    pub config: ServerConfig,
    /// Upstream for the custom-LLM chat-completion endpoint
    pub chat: ChatCompletionClient,
    /// Call relay; `None` when telephony or bridge credentials are missing
    pub relay: Option<Arc<RelayOrchestrator>>,
}

impl AppState {
    /// Build the state from configuration, wiring the relay when it is configured.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let chat = ChatCompletionClient::new(config.chat_completion_config())?;
        let relay = build_relay(&config)?;
        Ok(Self::from_parts(config, chat, relay))
    }

    pub fn from_parts(
        config: ServerConfig,
        chat: ChatCompletionClient,
        relay: Option<Arc<RelayOrchestrator>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            chat,
            relay,
        })
    }
}

fn build_relay(
    config: &ServerConfig,
) -> Result<Option<Arc<RelayOrchestrator>>, Box<dyn std::error::Error>> {
    let (Some(api_key), Some(assistant_id), Some(bridge_config)) = (
        config.vapi_api_key.as_deref().filter(|k| !k.is_empty()),
        config
            .vapi_assistant_id
            .as_deref()
            .filter(|id| !id.is_empty()),
        config.gemini_bridge_config(),
    ) else {
        info!(
            "Call relay disabled: set VAPI_API_KEY, VAPI_ASSISTANT_ID and GOOGLE_API_KEY to enable it"
        );
        return Ok(None);
    };

    let telephony = VapiClient::new(api_key, config.vapi_base_url.as_str())?;
    let bridge = GeminiLiveBridge::new(bridge_config)?;
    let connector = WebSocketConnector::new(config.relay.connect_timeout);

    info!(
        assistant_id = %assistant_id,
        model = %config.gemini_model,
        "Call relay enabled"
    );

    Ok(Some(Arc::new(RelayOrchestrator::new(
        config.relay.clone(),
        assistant_id,
        Arc::new(telephony),
        Arc::new(connector),
        Arc::new(bridge),
    ))))
}
