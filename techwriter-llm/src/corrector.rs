//! Text correction against a local LLM server

use std::sync::Arc;
use std::time::{Duration, Instant};

use techwriter_core::{ClientConfig, Config, Error, PromptRegistry, RenderError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, GenerateRequest, GenerateResponse, OllamaBackend, TransportError};

/// Broad class of a failed correction, for display upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    UnknownMode,
    BackendUnavailable,
    BackendProtocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation_error",
            FailureKind::UnknownMode => "unknown_mode",
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::BackendProtocol => "backend_protocol_error",
        }
    }

    /// Whether the user can simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::BackendUnavailable | FailureKind::BackendProtocol
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`Corrector::correct`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrectionError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Backend unavailable after {attempts} attempt(s): {message}")]
    BackendUnavailable { attempts: u32, message: String },

    #[error("Unexpected backend response: {0}")]
    BackendProtocol(String),
}

impl CorrectionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CorrectionError::Validation(_) => FailureKind::Validation,
            CorrectionError::UnknownMode(_) => FailureKind::UnknownMode,
            CorrectionError::BackendUnavailable { .. } => FailureKind::BackendUnavailable,
            CorrectionError::BackendProtocol(_) => FailureKind::BackendProtocol,
        }
    }
}

impl From<RenderError> for CorrectionError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::UnknownMode(mode) => CorrectionError::UnknownMode(mode),
        }
    }
}

/// Successfully corrected text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    /// Generated text exactly as the backend returned it
    pub text: String,
}

/// Outcome of one correction
pub type CorrectionResult = Result<Correction, CorrectionError>;

/// Turns (mode, text) into corrected text via the backend.
///
/// Holds only immutable state, so one instance can serve any number of
/// independent calls.
pub struct Corrector {
    registry: Arc<PromptRegistry>,
    backend: Arc<dyn Backend>,
    timeout: Duration,
    max_attempts: u32,
}

impl Corrector {
    /// Create a corrector over an already-built registry and backend
    pub fn new(
        registry: Arc<PromptRegistry>,
        backend: Arc<dyn Backend>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Build the registry and HTTP backend described by the process configuration
    pub fn from_config(config: &Config) -> techwriter_core::Result<Self> {
        config.validate()?;

        let default_model = &config.backend.model;
        let registry = match &config.prompts.path {
            Some(path) => PromptRegistry::load(path, default_model)?,
            None => {
                info!("No prompt template file configured, using built-in modes");
                PromptRegistry::builtin(default_model)?
            }
        };
        if !registry.contains(&config.prompts.default_mode) {
            return Err(Error::Config(format!(
                "default mode '{}' is not one of the loaded modes: {}",
                config.prompts.default_mode,
                registry.list_modes().join(", ")
            )));
        }

        let client_config = config.client_config();
        let backend =
            OllamaBackend::new(&client_config).map_err(|e| Error::Config(e.to_string()))?;
        info!(
            "Using backend {} (timeout {:?}, {} attempt(s))",
            backend.endpoint(),
            client_config.timeout,
            client_config.max_attempts
        );

        Ok(Self::new(Arc::new(registry), Arc::new(backend), &client_config))
    }

    /// Registered mode names, in declaration order
    pub fn modes(&self) -> Vec<&str> {
        self.registry.list_modes()
    }

    /// The prompt registry in use
    pub fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    /// Correct `text` using the prompt for `mode`
    pub async fn correct(&self, mode: &str, text: &str) -> CorrectionResult {
        let start = Instant::now();

        if text.trim().is_empty() {
            return Err(CorrectionError::Validation(
                "Please enter some text to check.".to_string(),
            ));
        }
        let rendered = self.registry.render(mode, text)?;
        let request = GenerateRequest::from(rendered);

        let mut last_error = TransportError::Timeout;
        for attempt in 1..=self.max_attempts {
            debug!("Attempt {}/{} for mode '{}'", attempt, self.max_attempts, mode);

            let attempt_result =
                tokio::time::timeout(self.timeout, self.backend.generate(&request)).await;
            let outcome = match attempt_result {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            };

            match outcome {
                Ok(body) => {
                    let text = parse_generation(&body).inspect_err(|e| {
                        warn!("{}", e);
                        debug!("Offending response body: {}", String::from_utf8_lossy(&body));
                    })?;
                    let latency_ms = start.elapsed().as_millis() as u64;
                    info!(
                        "Correction in mode '{}' completed in {}ms ({} attempt(s))",
                        mode, latency_ms, attempt
                    );
                    return Ok(Correction { text });
                }
                Err(e) if e.is_transient() => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    last_error = e;
                }
                Err(TransportError::Status { status, body }) => {
                    let e =
                        CorrectionError::BackendProtocol(format!("HTTP {}: {}", status, body));
                    warn!("{}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Backend request failed: {}", e);
                    return Err(CorrectionError::BackendUnavailable {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }

        error!(
            "Backend unavailable after {} attempt(s): {}",
            self.max_attempts, last_error
        );
        Err(CorrectionError::BackendUnavailable {
            attempts: self.max_attempts,
            message: last_error.to_string(),
        })
    }
}

/// Validate a completed generation and extract its text.
///
/// Bytes are parsed directly so a body that is not valid UTF-8 is rejected
/// instead of being decoded lossily.
fn parse_generation(body: &[u8]) -> Result<String, CorrectionError> {
    let response: GenerateResponse = serde_json::from_slice(body)
        .map_err(|e| CorrectionError::BackendProtocol(format!("invalid JSON body: {}", e)))?;

    if response.done != Some(true) {
        return Err(CorrectionError::BackendProtocol(
            "generation was not marked done".to_string(),
        ));
    }

    match response.response {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(CorrectionError::BackendProtocol(
            "generated text is empty".to_string(),
        )),
        None => Err(CorrectionError::BackendProtocol(
            "response has no generated text field".to_string(),
        )),
    }
}
