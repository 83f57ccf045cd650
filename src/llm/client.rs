//! HTTP client for the classification service.
//!
//! Supports Ollama's generate API and OpenAI-compatible chat completions
//! (OpenAI, Groq, Together.ai). Both are asked for JSON-only output.
//! HTTP 429 responses are retried with exponential backoff, honouring
//! `Retry-After`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{LlmConfig, LlmProvider};
use super::prompts::SYSTEM_PROMPT;
use super::{Classifier, LlmError};
use crate::rate_limit::{backoff_delay, parse_retry_after};

/// Base delay for 429 backoff when no `Retry-After` is sent.
const RETRY_BASE_MS: u64 = 1000;

/// Client for the configured classification provider.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    /// Create a client. Credentials are not checked until the first call.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// List the models the provider offers; doubles as a reachability check.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        #[derive(Deserialize)]
        struct OllamaTags {
            #[serde(default)]
            models: Vec<OllamaModel>,
        }

        #[derive(Deserialize)]
        struct OllamaModel {
            name: String,
        }

        #[derive(Deserialize)]
        struct OpenAiModels {
            #[serde(default)]
            data: Vec<OpenAiModel>,
        }

        #[derive(Deserialize)]
        struct OpenAiModel {
            id: String,
        }

        match self.config.provider {
            LlmProvider::Ollama => {
                let url = format!("{}/api/tags", self.config.endpoint);
                let resp = self.send(|| self.client.get(&url)).await?;
                let tags: OllamaTags = resp
                    .json()
                    .await
                    .map_err(|e| LlmError::Parse(e.to_string()))?;
                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
            LlmProvider::OpenAI => {
                let key = self.api_key()?;
                let url = format!("{}/v1/models", self.config.endpoint);
                let resp = self
                    .send(|| self.client.get(&url).bearer_auth(key))
                    .await?;
                let models: OpenAiModels = resp
                    .json()
                    .await
                    .map_err(|e| LlmError::Parse(e.to_string()))?;
                Ok(models.data.into_iter().map(|m| m.id).collect())
            }
        }
    }

    /// Send a prompt that demands a JSON object and return the raw reply text.
    pub async fn complete_json(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(prompt).await,
            LlmProvider::OpenAI => self.call_openai(prompt).await,
        }
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(self.config.endpoint.clone()))
    }

    /// Call Ollama API with a prompt.
    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: &self.config.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self.send(|| self.client.post(&url).json(&request)).await?;
        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }

    /// Call an OpenAI-compatible chat completions endpoint.
    async fn call_openai(&self, prompt: &str) -> Result<String, LlmError> {
        let key = self.api_key()?;
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let resp = self
            .send(|| self.client.post(&url).bearer_auth(key).json(&request))
            .await?;
        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response contained no message content".to_string()))
    }

    /// Send a request, retrying on 429 up to `max_retries` times.
    async fn send<F>(&self, build: F) -> Result<Response, LlmError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let resp = build().send().await.map_err(|e| self.request_error(e))?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.config.max_retries {
                    return Err(LlmError::RateLimited {
                        attempts: attempt + 1,
                    });
                }
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                let wait = parse_retry_after(retry_after)
                    .unwrap_or_else(|| backoff_delay(attempt, RETRY_BASE_MS));
                warn!(
                    "Classifier rate limited (attempt {}), waiting {:?}",
                    attempt + 1,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body: truncate(&body, 500).to_string(),
                });
            }

            debug!("Classifier responded with HTTP {}", status);
            return Ok(resp);
        }
    }

    fn request_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::Connection(e.to_string())
        }
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl Classifier for LlmClient {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        self.complete_json(prompt).await
    }

    fn source(&self) -> String {
        self.config.source_tag()
    }
}
