//! techwriter-core: shared configuration, errors, and the prompt registry
//!
//! This crate provides the foundational types used by the inference
//! client and the command-line front end.

pub mod config;
pub mod error;
pub mod prompt;

pub use config::{BackendConfig, ClientConfig, Config, PromptsConfig};
pub use error::{Error, Result};
pub use prompt::{
    GenerationOptions, PromptRegistry, PromptTemplate, RenderError, RenderedPrompt,
    TEXT_PLACEHOLDER,
};
