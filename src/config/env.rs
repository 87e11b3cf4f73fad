use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::ServerConfig;

/// Read a non-empty environment variable.
fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an environment variable, failing on values that do not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key} ('{raw}'): {e}").into()),
        None => Ok(None),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, Box<dyn std::error::Error>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}

/// Build a configuration from defaults overridden by environment variables.
pub fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }
    if let Some(origins) = env_string("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }

    config.openai_api_key = env_string("OPENAI_API_KEY");
    if let Some(url) = env_string("OPENAI_BASE_URL") {
        config.openai_base_url = url;
    }

    config.vapi_api_key = env_string("VAPI_API_KEY");
    if let Some(url) = env_string("VAPI_BASE_URL") {
        config.vapi_base_url = url;
    }
    config.vapi_assistant_id = env_string("VAPI_ASSISTANT_ID");

    config.google_api_key = env_string("GOOGLE_API_KEY");
    if let Some(model) = env_string("GEMINI_MODEL") {
        config.gemini_model = model;
    }
    if let Some(url) = env_string("GEMINI_LIVE_URL") {
        config.gemini_live_url = url;
    }
    if let Some(instructions) = env_string("GEMINI_INSTRUCTIONS") {
        config.gemini_instructions = instructions;
    }
    config.gemini_voice = env_string("GEMINI_VOICE");

    if let Some(model) = env_string("LLM_DEFAULT_MODEL") {
        config.llm_default_model = model;
    }
    if let Some(prompt) = env_string("LLM_SYSTEM_PROMPT") {
        config.llm_system_prompt = prompt;
    }

    let relay = &mut config.relay;
    if let Some(attempts) = env_parse("RELAY_CONNECT_ATTEMPTS")? {
        relay.max_connect_attempts = attempts;
    }
    if let Some(delay) = env_secs("RELAY_CONNECT_RETRY_DELAY_SECS")? {
        relay.connect_retry_delay = delay;
    }
    if let Some(timeout) = env_secs("RELAY_CONNECT_TIMEOUT_SECS")? {
        relay.connect_timeout = timeout;
    }
    if let Some(interval) = env_secs("RELAY_PING_INTERVAL_SECS")? {
        relay.ping_interval = interval;
    }
    if let Some(timeout) = env_secs("RELAY_PING_TIMEOUT_SECS")? {
        relay.ping_timeout = timeout;
    }
    if let Some(capacity) = env_parse("RELAY_QUEUE_CAPACITY")? {
        relay.queue_capacity = capacity;
    }
    if let Some(grace) = env_secs("RELAY_SHUTDOWN_GRACE_SECS")? {
        relay.shutdown_grace = grace;
    }
    if let Some(max_calls) = env_parse("RELAY_MAX_CONCURRENT_CALLS")? {
        relay.max_concurrent_calls = max_calls;
    }

    Ok(config)
}
