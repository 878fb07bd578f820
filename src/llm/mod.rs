pub mod chat;
pub mod delta;
pub mod sse;

use crate::error::ChatError;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection and generation settings for a completion endpoint.
///
/// `site_url` and `site_name` are forwarded verbatim as the `HTTP-Referer`
/// and `X-Title` headers; empty values are omitted.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub site_url: String,
    pub site_name: String,
    pub connect_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            site_url: String::new(),
            site_name: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.api_key.trim().is_empty() {
            return Err(ChatError::Config("API key is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model identifier is required".to_string()));
        }
        Url::parse(&self.base_url).map_err(|e|
            ChatError::Config(format!("Invalid completion URL '{}': {}", self.base_url, e))
        )?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(
                ChatError::Config(format!("temperature {} is outside 0.0..=2.0", self.temperature))
            );
        }
        Ok(())
    }
}
