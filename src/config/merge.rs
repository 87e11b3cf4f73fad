use std::time::Duration;

use super::ServerConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;

/// Merge environment configuration with optional YAML overrides.
///
/// Environment variables (with defaults) form the base; every value present
/// in the YAML file replaces it.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(security) = yaml.security
        && let Some(origins) = security.cors_allowed_origins
    {
        config.cors_allowed_origins = Some(origins);
    }

    if let Some(providers) = yaml.providers {
        if providers.openai_api_key.is_some() {
            config.openai_api_key = providers.openai_api_key;
        }
        if let Some(url) = providers.openai_base_url {
            config.openai_base_url = url;
        }
        if providers.vapi_api_key.is_some() {
            config.vapi_api_key = providers.vapi_api_key;
        }
        if let Some(url) = providers.vapi_base_url {
            config.vapi_base_url = url;
        }
        if providers.vapi_assistant_id.is_some() {
            config.vapi_assistant_id = providers.vapi_assistant_id;
        }
        if providers.google_api_key.is_some() {
            config.google_api_key = providers.google_api_key;
        }
    }

    if let Some(bridge) = yaml.bridge {
        if let Some(model) = bridge.model {
            config.gemini_model = model;
        }
        if let Some(url) = bridge.url {
            config.gemini_live_url = url;
        }
        if let Some(instructions) = bridge.instructions {
            config.gemini_instructions = instructions;
        }
        if bridge.voice.is_some() {
            config.gemini_voice = bridge.voice;
        }
    }

    if let Some(llm) = yaml.llm {
        if let Some(model) = llm.default_model {
            config.llm_default_model = model;
        }
        if let Some(prompt) = llm.system_prompt {
            config.llm_system_prompt = prompt;
        }
    }

    if let Some(relay_yaml) = yaml.relay {
        let relay = &mut config.relay;
        if let Some(attempts) = relay_yaml.connect_attempts {
            relay.max_connect_attempts = attempts;
        }
        if let Some(secs) = relay_yaml.connect_retry_delay_secs {
            relay.connect_retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = relay_yaml.connect_timeout_secs {
            relay.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = relay_yaml.ping_interval_secs {
            relay.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = relay_yaml.ping_timeout_secs {
            relay.ping_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = relay_yaml.queue_capacity {
            relay.queue_capacity = capacity;
        }
        if let Some(ms) = relay_yaml.queue_poll_timeout_ms {
            relay.queue_poll_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = relay_yaml.shutdown_grace_secs {
            relay.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(max_calls) = relay_yaml.max_concurrent_calls {
            relay.max_concurrent_calls = max_calls;
        }
    }

    Ok(config)
}
