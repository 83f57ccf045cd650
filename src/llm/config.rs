//! Classifier client configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }
}

/// Configuration for the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether the fuzzy tier may call the classifier at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (provider-specific defaults apply)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for OpenAI-compatible providers
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after HTTP 429 before giving up on a row
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub fn base_default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }

    /// Source tag recorded with every classifier answer.
    pub fn source_tag(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true" or "false"
    /// - `LLM_PROVIDER`: "ollama" (default), "openai", "groq", or "together"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for OpenAI-compatible providers
    /// - `LLM_MODEL`: Model name
    /// - `LLM_MAX_TOKENS`: Maximum tokens in response
    /// - `LLM_TEMPERATURE`: Generation temperature (0.0-1.0)
    /// - `LLM_TIMEOUT_SECS`: Per-call timeout
    /// - `LLM_MAX_RETRIES`: Retries on HTTP 429
    ///
    /// LLM_PROVIDER wins over auto-detection from API keys. Without it,
    /// GROQ_API_KEY or OPENAI_API_KEY selects the matching hosted provider.
    /// A missing key is not an error here; calls fail later with a clear message.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_provider = var("LLM_PROVIDER");
        if let Some(provider) = explicit_provider.as_deref().and_then(LlmProvider::from_str) {
            self.provider = provider;
        }

        let explicit_endpoint = var("LLM_ENDPOINT");
        if let Some(ref endpoint) = explicit_endpoint {
            self.endpoint = endpoint.trim_end_matches('/').to_string();
        }

        if let Some(val) = var("LLM_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = Some(val);
        }

        if let Some(ref provider_str) = explicit_provider {
            let provider_lower = provider_str.to_lowercase();

            if explicit_endpoint.is_none() {
                match provider_lower.as_str() {
                    "groq" => self.endpoint = "https://api.groq.com/openai".to_string(),
                    "openai" => self.endpoint = "https://api.openai.com".to_string(),
                    "together" => self.endpoint = "https://api.together.xyz".to_string(),
                    _ => {}
                }
            }

            if self.api_key.is_none() {
                match provider_lower.as_str() {
                    "groq" => self.api_key = var("GROQ_API_KEY"),
                    "openai" => self.api_key = var("OPENAI_API_KEY"),
                    _ => {}
                }
            }
        } else if self.api_key.is_none() {
            if let Some(key) = var("GROQ_API_KEY") {
                self.api_key = Some(key);
                self.provider = LlmProvider::OpenAI;
                if explicit_endpoint.is_none() {
                    self.endpoint = "https://api.groq.com/openai".to_string();
                }
            } else if let Some(key) = var("OPENAI_API_KEY") {
                self.api_key = Some(key);
                self.provider = LlmProvider::OpenAI;
                if explicit_endpoint.is_none() {
                    self.endpoint = "https://api.openai.com".to_string();
                }
            }
        }

        if let Some(val) = var("LLM_MODEL") {
            self.model = val;
        }
        if let Some(val) = var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.max_tokens = val;
        }
        if let Some(val) = var("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.temperature = val;
        }
        if let Some(val) = var("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = val;
        }
        if let Some(val) = var("LLM_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.max_retries = val;
        }

        self
    }
}
