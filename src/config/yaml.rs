use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 80
///
/// providers:
///   openai_api_key: "sk-..."
///   openai_base_url: "https://api.openai.com/v1"
///   vapi_api_key: "your-vapi-key"
///   vapi_base_url: "https://api.vapi.ai"
///   vapi_assistant_id: "assistant-id"
///   google_api_key: "AIza..."
///
/// bridge:
///   model: "models/gemini-2.5-flash-preview-native-audio-dialog"
///   url: "wss://generativelanguage.googleapis.com/ws/..."
///   instructions: "You are a demo assistant that pitches the product concisely."
///   voice: "Puck"
///
/// llm:
///   default_model: "gpt-4o"
///   system_prompt: "your name is DemoProductAgent"
///
/// relay:
///   connect_attempts: 3
///   connect_retry_delay_secs: 5
///   connect_timeout_secs: 10
///   ping_interval_secs: 30
///   ping_timeout_secs: 10
///   queue_capacity: 1000
///   queue_poll_timeout_ms: 1000
///   shutdown_grace_secs: 2
///   max_concurrent_calls: 10
///
/// security:
///   cors_allowed_origins: "*"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub bridge: Option<BridgeYaml>,
    pub llm: Option<LlmYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Provider credentials and endpoints from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub vapi_api_key: Option<String>,
    pub vapi_base_url: Option<String>,
    pub vapi_assistant_id: Option<String>,
    /// Google AI key used by the Gemini Live bridge
    pub google_api_key: Option<String>,
}

/// Gemini Live bridge settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub model: Option<String>,
    pub url: Option<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
}

/// Chat-completion proxy defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub default_model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Relay tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub connect_attempts: Option<u32>,
    pub connect_retry_delay_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub ping_interval_secs: Option<u64>,
    pub ping_timeout_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub queue_poll_timeout_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub max_concurrent_calls: Option<usize>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
