//! techwriter-llm: LLM integration for text correction
//!
//! This crate renders correction prompts and sends them to a locally
//! hosted Ollama server, retrying transient failures and classifying
//! everything else for the caller.

pub mod backend;
pub mod corrector;

pub use backend::{Backend, GenerateRequest, OllamaBackend, TransportError};
pub use corrector::{Correction, CorrectionError, CorrectionResult, Corrector, FailureKind};
