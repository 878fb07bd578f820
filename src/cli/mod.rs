use clap::Parser;

use crate::llm::{
    LlmConfig,
    DEFAULT_BASE_URL,
    DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_MODEL,
    DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TEMPERATURE,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Completion Endpoint Args ---
    /// Bearer token for the completion endpoint
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Full URL of the chat completion endpoint
    #[arg(long, env = "CHAT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub chat_base_url: String,

    /// Model identifier sent with every request
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_MODEL)]
    pub chat_model: String,

    /// Sampling temperature for chat replies
    #[arg(long, env = "CHAT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub chat_temperature: f32,

    /// Persona sent as the leading system turn of every request
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Value of the HTTP-Referer header identifying the calling site
    #[arg(long, env = "SITE_URL", default_value = "")]
    pub site_url: String,

    /// Value of the X-Title header identifying the calling site
    #[arg(long, env = "SITE_NAME", default_value = "")]
    pub site_name: String,

    /// Seconds to wait for the completion endpoint to accept a connection
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "chat:")]
    pub history_redis_prefix: String,

    // --- Session Args ---
    /// Identity that owns the conversations created by this session
    #[arg(long, env = "PRINCIPAL", default_value = "local")]
    pub principal: String,

    /// Resume an existing conversation instead of starting a new one
    #[arg(long, env = "CONVERSATION_ID")]
    pub conversation_id: Option<String>,

    /// Ask the model for a conversation title after the first exchange
    #[arg(long, env = "AUTO_TITLE", default_value = "false")]
    pub auto_title: bool,
}

impl Args {
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.chat_api_key.clone(),
            base_url: self.chat_base_url.clone(),
            model: self.chat_model.clone(),
            temperature: self.chat_temperature,
            system_prompt: self.system_prompt.clone(),
            site_url: self.site_url.clone(),
            site_name: self.site_name.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}
