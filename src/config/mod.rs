//! Configuration module for the relay gateway
//!
//! Server configuration is read from .env files, YAML files and environment
//! variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use relay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::llm::{
    ChatCompletionConfig, DEFAULT_LLM_MODEL, DEFAULT_SYSTEM_PROMPT, OPENAI_DEFAULT_BASE_URL,
};
use crate::core::realtime::GeminiBridgeConfig;
use crate::core::realtime::gemini::{
    GEMINI_DEFAULT_INSTRUCTIONS, GEMINI_DEFAULT_MODEL, GEMINI_LIVE_URL,
};
use crate::core::relay::RelayConfig;
use crate::core::telephony::VAPI_DEFAULT_BASE_URL;

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, CORS)
/// - Upstream credentials (OpenAI, Vapi, Google)
/// - Audio bridge settings (Gemini Live model, endpoint, instructions)
/// - Chat-completion proxy defaults
/// - Relay tuning
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,

    // Chat-completion upstream
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,

    // Telephony platform
    pub vapi_api_key: Option<String>,
    pub vapi_base_url: String,
    /// Assistant every relayed call is created with
    pub vapi_assistant_id: Option<String>,

    // Audio bridge
    /// Google AI API key for Gemini Live
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_live_url: String,
    pub gemini_instructions: String,
    /// Prebuilt voice name (e.g., "Puck"); model default when unset
    pub gemini_voice: Option<String>,

    // Chat-completion proxy defaults
    pub llm_default_model: String,
    pub llm_system_prompt: String,

    // Relay tuning
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            cors_allowed_origins: Some("*".to_string()),
            openai_api_key: None,
            openai_base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            vapi_api_key: None,
            vapi_base_url: VAPI_DEFAULT_BASE_URL.to_string(),
            vapi_assistant_id: None,
            google_api_key: None,
            gemini_model: GEMINI_DEFAULT_MODEL.to_string(),
            gemini_live_url: GEMINI_LIVE_URL.to_string(),
            gemini_instructions: GEMINI_DEFAULT_INSTRUCTIONS.to_string(),
            gemini_voice: None,
            llm_default_model: DEFAULT_LLM_MODEL.to_string(),
            llm_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            relay: RelayConfig::default(),
        }
    }
}

/// Zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.vapi_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.google_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults).
    ///
    /// `.env` is loaded in main.rs before this is called, so its values are
    /// visible here unless the real environment overrides them.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The relay needs the telephony key, an assistant and a Google key.
    pub fn is_relay_configured(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.is_empty())
        }
        present(&self.vapi_api_key) && present(&self.vapi_assistant_id) && present(&self.google_api_key)
    }

    /// Audio bridge settings, or `None` without a Google API key.
    pub fn gemini_bridge_config(&self) -> Option<GeminiBridgeConfig> {
        let api_key = self.google_api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(GeminiBridgeConfig {
            model: self.gemini_model.clone(),
            instructions: self.gemini_instructions.clone(),
            url: self.gemini_live_url.clone(),
            voice: self.gemini_voice.clone(),
            ..GeminiBridgeConfig::new(api_key)
        })
    }

    pub fn chat_completion_config(&self) -> ChatCompletionConfig {
        ChatCompletionConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            default_model: self.llm_default_model.clone(),
            system_prompt: self.llm_system_prompt.clone(),
        }
    }
}
