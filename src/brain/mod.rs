// Brain module - LLM inference client

pub mod builder;
pub mod client;
pub mod error;
pub mod types;

pub use builder::RequestBuilder;
pub use client::Brain;
pub use error::{BrainError, BrainInitError};
pub use types::{ContentBlock, Message, MessageRequest, MessageResponse, Role, StopReason, Usage};

use std::str::FromStr;

/// Brain configuration
#[derive(Debug, Clone)]
pub struct BrainConfig {
    /// Inference backend URL
    pub endpoint: String,
    /// API key for authentication
    pub api_key: String,
    /// Default model identifier
    pub default_model: String,
    /// Maximum retry attempts
    pub max_retries: u32,
    /// Base retry delay in milliseconds
    pub base_retry_delay_ms: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Temperature (0.0-2.0, None = use model default)
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

fn required_var(key: &str) -> Result<String, BrainInitError> {
    std::env::var(key).map_err(|_| BrainInitError::ConfigMissing(key.into()))
}

fn optional_var<T: FromStr>(key: &str) -> Result<Option<T>, BrainInitError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| BrainInitError::ConfigInvalid(format!("{}={}", key, raw))),
        Err(_) => Ok(None),
    }
}

impl BrainConfig {
    pub fn from_env() -> Result<Self, BrainInitError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            endpoint: required_var("INFERENCE_ENDPOINT")?,
            api_key: required_var("INFERENCE_API_KEY")?,
            default_model: required_var("INFERENCE_MODEL")?,
            max_retries: optional_var("INFERENCE_MAX_RETRIES")?.unwrap_or(3),
            base_retry_delay_ms: optional_var("INFERENCE_RETRY_DELAY_MS")?.unwrap_or(1000),
            request_timeout_secs: optional_var("INFERENCE_TIMEOUT_SECS")?.unwrap_or(120),
            max_output_tokens: optional_var("INFERENCE_MAX_TOKENS")?.unwrap_or(4096),
            // Sampling parameters fall back to model defaults when unset
            temperature: optional_var("INFERENCE_TEMPERATURE")?,
            top_p: optional_var("INFERENCE_TOP_P")?,
            top_k: optional_var("INFERENCE_TOP_K")?,
        })
    }
}
