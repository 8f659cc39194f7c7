//! Transport to the text-generation server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use techwriter_core::{ClientConfig, GenerationOptions, RenderedPrompt};
use thiserror::Error;
use tracing::debug;

/// Path of the generation endpoint, relative to the base URL
pub const GENERATE_PATH: &str = "/api/generate";

/// Longest slice of an error body kept for diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Errors below the protocol level
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt may succeed. The backend is local, so timeouts
    /// and refused connections are treated as a restarting server.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Sampling options in the backend's vocabulary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl From<GenerationOptions> for RequestOptions {
    fn from(options: GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

/// Body of a generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

impl From<RenderedPrompt> for GenerateRequest {
    fn from(rendered: RenderedPrompt) -> Self {
        let options = if rendered.options.is_empty() {
            None
        } else {
            Some(rendered.options.into())
        };
        Self {
            model: rendered.model,
            prompt: rendered.prompt,
            stream: false,
            options,
        }
    }
}

/// Body of a completed (non-streaming) generation
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(alias = "response_text")]
    pub response: Option<String>,
    pub done: Option<bool>,
}

/// A text-generation server
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send one generation request and return the raw response body
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<u8>, TransportError>;
}

/// Client for an Ollama server's `/api/generate` endpoint
pub struct OllamaBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend client for the configured server
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("techwriter/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint_url(&config.base_url),
            client,
        })
    }

    /// Full URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<u8>, TransportError> {
        debug!("POST {} (model {})", self.endpoint, request.model);

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        // Headers arrived, so a failed body read means the server went away mid-response
        let body = response.bytes().await.map_err(|e| match TransportError::from(e) {
            TransportError::Other(msg) => TransportError::Connect(msg),
            other => other,
        })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&String::from_utf8_lossy(&body), MAX_ERROR_BODY),
            });
        }

        Ok(body.to_vec())
    }
}

/// Join the base URL and the generate path
pub fn endpoint_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim().trim_end_matches('/'), GENERATE_PATH)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rendered(options: GenerationOptions) -> RenderedPrompt {
        RenderedPrompt {
            prompt: "Fix: teh cat".to_string(),
            model: "tech-writer:latest".to_string(),
            options,
        }
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://localhost:11434"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            endpoint_url("http://localhost:11434/ "),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_request_without_options() {
        let request = GenerateRequest::from(rendered(GenerationOptions::default()));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "tech-writer:latest",
                "prompt": "Fix: teh cat",
                "stream": false
            })
        );
    }

    #[test]
    fn test_request_with_options() {
        let request = GenerateRequest::from(rendered(GenerationOptions {
            temperature: None,
            max_tokens: Some(128),
        }));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["options"], json!({ "num_predict": 128 }));
    }

    #[test]
    fn test_response_accepts_both_field_names() {
        let ollama: GenerateResponse =
            serde_json::from_str(r#"{"model":"m","response":"Hi.","done":true}"#).unwrap();
        assert_eq!(ollama.response.as_deref(), Some("Hi."));

        let alias: GenerateResponse =
            serde_json::from_str(r#"{"response_text":"Hi.","done":true}"#).unwrap();
        assert_eq!(alias.response.as_deref(), Some("Hi."));
        assert_eq!(alias.done, Some(true));
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(!TransportError::Status {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::Other("bad".into()).is_transient());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    #[test]
    fn test_new_backend() {
        let backend = OllamaBackend::new(&ClientConfig::default()).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:11434/api/generate");
    }
}
