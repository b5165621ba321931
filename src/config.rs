//! Client configuration
//!
//! Everything the assistant client needs is carried in [`AssistantConfig`] and injected
//! at construction. `from_env` only reads the process environment once, up front.

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Model identifiers per operation.
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub quick: String,
    pub reasoning: String,
    pub search: String,
    pub image_generation: String,
    pub image_editing: String,
    pub speech: String,
    pub live: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            quick: "gemini-3-flash-preview".to_string(),
            reasoning: "gemini-3-pro-preview".to_string(),
            search: "gemini-3-flash-preview".to_string(),
            image_generation: "gemini-3-pro-image-preview".to_string(),
            image_editing: "gemini-2.5-flash-image".to_string(),
            speech: "gemini-2.5-flash-preview-tts".to_string(),
            live: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
        }
    }
}

/// Configuration for the remote assistant client
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// REST base, without a trailing slash.
    pub api_base: String,
    /// Live WebSocket endpoint, without the `key` query.
    pub live_url: String,
    pub models: ModelSet,
    /// Thinking budget for open-ended regulatory questions.
    pub complex_thinking_budget: u32,
    /// Thinking budget for the dashboard performance summary.
    pub analysis_thinking_budget: u32,
    pub live_system_instruction: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            live_url: DEFAULT_LIVE_URL.to_string(),
            models: ModelSet::default(),
            complex_thinking_budget: 32768,
            analysis_thinking_budget: 16000,
            live_system_instruction: "You are the Vision Aviation Academy Career and Compliance Coach. \
                You assist sales reps in closing leads for Cabin Crew, Ground Staff, and Travel Management. \
                You are well-versed in DGCA safety requirements and AAI airport protocols."
                .to_string(),
        }
    }
}

impl AssistantConfig {
    /// Default configuration with the given API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Load from the environment.
    ///
    /// `GEMINI_API_KEY` (or `API_KEY`) is required; `GEMINI_API_BASE` and
    /// `GEMINI_LIVE_URL` override the endpoints.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| Error::Config("GEMINI_API_KEY must be set".to_string()))?;

        let mut config = Self::with_api_key(api_key);
        if let Ok(base) = std::env::var("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("GEMINI_LIVE_URL") {
            config.live_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".to_string()));
        }
        if !(self.live_url.starts_with("ws://") || self.live_url.starts_with("wss://")) {
            return Err(Error::Config(format!("live URL must be ws:// or wss://, got {}", self.live_url)));
        }
        Ok(())
    }

    /// `{api_base}/models/{model}:generateContent?key=…`
    pub fn generate_content_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent?key={}", self.api_base, model, self.api_key)
    }

    /// Live endpoint with the API key attached.
    pub fn live_endpoint(&self) -> String {
        let sep = if self.live_url.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.live_url, sep, self.api_key)
    }
}
