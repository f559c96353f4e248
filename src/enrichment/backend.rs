//! Text-completion backends.
//!
//! The backend is a closed set chosen once from configuration:
//! - **[`Backend::Local`]** calls a local Ollama instance's `/api/generate`.
//! - **[`Backend::Hosted`]** calls an OpenAI-compatible `/v1/chat/completions`.
//!
//! # Retry Strategy
//!
//! Both use exponential backoff for transient HTTP errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::EnrichmentConfig;

use super::EnrichmentError;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

pub enum Backend {
    Local(OllamaBackend),
    Hosted(OpenAiBackend),
}

impl Backend {
    /// Build the configured backend. `Ok(None)` when enrichment is disabled.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>, EnrichmentError> {
        match config.provider.as_str() {
            "disabled" => Ok(None),
            "ollama" => Ok(Some(Backend::Local(OllamaBackend::new(config)?))),
            "openai" => Ok(Some(Backend::Hosted(OpenAiBackend::new(config)?))),
            other => Err(EnrichmentError::Config(format!(
                "unknown enrichment provider: {}",
                other
            ))),
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Backend::Local(b) => &b.model,
            Backend::Hosted(b) => &b.model,
        }
    }

    /// One blocking completion round trip. The reply text is returned as
    /// is, blank included; only a missing reply field is an error.
    pub async fn complete(&self, prompt: &str) -> Result<String, EnrichmentError> {
        match self {
            Backend::Local(b) => b.complete(prompt).await,
            Backend::Hosted(b) => b.complete(prompt).await,
        }
    }
}

fn http_client(config: &EnrichmentConfig) -> Result<reqwest::Client, EnrichmentError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| EnrichmentError::Config(e.to_string()))
}

fn require_model(config: &EnrichmentConfig) -> Result<String, EnrichmentError> {
    config
        .model_name()
        .map(str::to_string)
        .ok_or_else(|| EnrichmentError::Config("enrichment.model required".to_string()))
}

/// POST `body` to `url`, retrying 429/5xx and transport errors.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value, EnrichmentError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, delay_secs = delay.as_secs(), "retrying enrichment request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| EnrichmentError::Request(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = EnrichmentError::Status {
                    status: status.as_u16(),
                    body: body_text,
                };

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(EnrichmentError::Request(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| EnrichmentError::Request("request failed after retries".to_string())))
}

// ============ Local (Ollama) ============

pub struct OllamaBackend {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        Ok(Self {
            model: require_model(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, EnrichmentError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = post_with_retry(&self.client, &url, None, &body, self.max_retries).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<String, EnrichmentError> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or(EnrichmentError::EmptyResponse)
}

// ============ Hosted (OpenAI-compatible) ============

pub struct OpenAiBackend {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Requires `OPENAI_API_KEY` in the environment.
    pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EnrichmentError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            model: require_model(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, EnrichmentError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [{"role": "user", "content": prompt}],
        });
        let url = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));
        let json = post_with_retry(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &Value) -> Result<String, EnrichmentError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or(EnrichmentError::EmptyResponse)
}
