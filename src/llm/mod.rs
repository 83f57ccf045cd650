//! Classification service integration for the fuzzy matching tier.
//!
//! The [`Classifier`] trait is the seam the matcher depends on; [`LlmClient`]
//! is the HTTP implementation backed by Ollama or an OpenAI-compatible API.

mod client;
mod config;
pub mod prompts;

pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};
pub use prompts::{classification_prompt, SYSTEM_PROMPT};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while talking to the classification service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to reach classifier: {0}")]
    Connection(String),
    #[error("classifier returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("classifier rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },
    #[error("could not parse classifier response: {0}")]
    Parse(String),
    #[error("no API key configured for {0} (set LLM_API_KEY)")]
    MissingApiKey(String),
    #[error("classifier is disabled")]
    Disabled,
    #[error("classifier did not answer within {0}s")]
    Timeout(u64),
}

/// Something that can answer a classification prompt with a JSON document.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Send the prompt and return the raw response text.
    async fn classify(&self, prompt: &str) -> Result<String, LlmError>;

    /// Identifier stored in match evidence, e.g. `ollama:llama3.1:8b`.
    fn source(&self) -> String;
}
