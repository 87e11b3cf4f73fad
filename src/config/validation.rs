use url::Url;

use super::ServerConfig;

/// Validate the merged configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_relay_limits(config)?;
    validate_url("OpenAI base URL", &config.openai_base_url, &["http", "https"])?;
    validate_url("Vapi base URL", &config.vapi_base_url, &["http", "https"])?;
    validate_url("Gemini Live URL", &config.gemini_live_url, &["ws", "wss"])?;
    Ok(())
}

fn validate_relay_limits(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let relay = &config.relay;
    if relay.max_connect_attempts == 0 {
        return Err("relay connect attempts must be greater than 0".into());
    }
    if relay.queue_capacity == 0 {
        return Err("relay queue capacity must be greater than 0".into());
    }
    if relay.max_concurrent_calls == 0 {
        return Err("relay max concurrent calls must be greater than 0".into());
    }
    if relay.ping_interval.is_zero() {
        return Err("relay ping interval must be greater than 0".into());
    }
    if relay.queue_poll_timeout.is_zero() {
        return Err("relay queue poll timeout must be greater than 0".into());
    }
    Ok(())
}

fn validate_url(
    name: &str,
    value: &str,
    schemes: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(value).map_err(|e| format!("Invalid {name} '{value}': {e}"))?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!(
            "Invalid {name} '{value}': scheme must be one of {}",
            schemes.join(", ")
        )
        .into());
    }
    Ok(())
}
