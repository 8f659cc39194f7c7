//! Prompt templates and the mode registry

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Substitution point for the user's text. Must appear exactly once per template.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// A named correction mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptTemplate {
    /// Unique mode name (e.g. "grammar")
    pub name: String,
    /// Prompt text containing `{text}` once
    pub template: String,
    /// Model to run this mode on; the configured default model if omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl PromptTemplate {
    /// Create a template that runs on the default model with backend-default parameters
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Template("mode name must not be empty".to_string()));
        }
        let placeholders = self.template.matches(TEXT_PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(Error::Template(format!(
                "template for mode '{}' must contain {} exactly once, found {}",
                self.name, TEXT_PLACEHOLDER, placeholders
            )));
        }
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(Error::Template(format!(
                    "mode '{}' has an empty model name",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Generation parameters forwarded to the backend
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.max_tokens.is_none()
    }
}

/// A prompt ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub prompt: String,
    pub model: String,
    pub options: GenerationOptions,
}

/// Rendering errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

/// On-disk layout of a template file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFile {
    #[serde(default)]
    modes: Vec<PromptTemplate>,
}

/// Immutable mapping from mode name to template, in declaration order
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    templates: Vec<PromptTemplate>,
    index: HashMap<String, usize>,
    default_model: String,
}

impl PromptRegistry {
    /// Load templates from a TOML file of `[[modes]]` tables
    pub fn load(path: &Path, default_model: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Template(format!("Failed to read prompt templates {:?}: {}", path, e))
        })?;
        let registry = Self::parse(&contents, default_model).map_err(|e| match e {
            Error::Template(msg) => Error::Template(format!("{:?}: {}", path, msg)),
            other => other,
        })?;

        info!(
            "Loaded {} prompt modes from {:?}",
            registry.templates.len(),
            path
        );
        Ok(registry)
    }

    /// Parse templates from TOML text
    pub fn parse(contents: &str, default_model: &str) -> Result<Self> {
        let file: TemplateFile = toml::from_str(contents)
            .map_err(|e| Error::Template(format!("Failed to parse prompt templates: {}", e)))?;
        Self::from_templates(file.modes, default_model)
    }

    /// Build a registry, rejecting malformed templates and duplicate names
    pub fn from_templates(templates: Vec<PromptTemplate>, default_model: &str) -> Result<Self> {
        if templates.is_empty() {
            return Err(Error::Template("no prompt modes declared".to_string()));
        }
        if default_model.trim().is_empty() {
            return Err(Error::Template("default model must not be empty".to_string()));
        }

        let mut index = HashMap::with_capacity(templates.len());
        for (i, template) in templates.iter().enumerate() {
            template.check()?;
            if index.insert(template.name.clone(), i).is_some() {
                return Err(Error::Template(format!(
                    "duplicate mode name '{}'",
                    template.name
                )));
            }
        }

        Ok(Self {
            templates,
            index,
            default_model: default_model.to_string(),
        })
    }

    /// Built-in modes used when no template file is configured
    pub fn builtin(default_model: &str) -> Result<Self> {
        Self::from_templates(builtin_templates(), default_model)
    }

    /// Mode names in declaration order
    pub fn list_modes(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.name.as_str()).collect()
    }

    /// Check whether a mode is registered
    pub fn contains(&self, mode: &str) -> bool {
        self.index.contains_key(mode)
    }

    /// Look up a template by mode name
    pub fn get(&self, mode: &str) -> Option<&PromptTemplate> {
        self.index.get(mode).map(|&i| &self.templates[i])
    }

    /// Model a mode runs on, after falling back to the default
    pub fn model_for(&self, mode: &str) -> Option<&str> {
        self.get(mode)
            .map(|t| t.model.as_deref().unwrap_or(&self.default_model))
    }

    /// Model used by templates that do not name one
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Substitute `text` into a mode's template, verbatim
    pub fn render(
        &self,
        mode: &str,
        text: &str,
    ) -> std::result::Result<RenderedPrompt, RenderError> {
        let template = self
            .get(mode)
            .ok_or_else(|| RenderError::UnknownMode(mode.to_string()))?;

        let prompt = template.template.replacen(TEXT_PLACEHOLDER, text, 1);
        let model = template
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        debug!("Rendered mode '{}' for model {}: {}", mode, model, prompt);

        Ok(RenderedPrompt {
            prompt,
            model,
            options: GenerationOptions {
                temperature: template.temperature,
                max_tokens: template.max_tokens,
            },
        })
    }
}

/// The built-in correction modes.
///
/// `default` sends the text as-is: the default model carries its own
/// system prompt for spelling and grammar checking.
pub fn builtin_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new("default", TEXT_PLACEHOLDER),
        PromptTemplate::new(
            "grammar",
            r#"Fix the grammar, spelling, and punctuation of the following text.
Do not rewrite it or change the style unless it is needed for correctness.
Reply with the corrected text only.

Text:
{text}"#,
        )
        .with_temperature(0.1),
        PromptTemplate::new(
            "conciseness",
            r#"Rewrite the following text to be shorter and clearer.
Keep the original meaning and tone. Reply with the rewritten text only.

Text:
{text}"#,
        )
        .with_temperature(0.3),
        PromptTemplate::new(
            "formal",
            r#"Rewrite the following text in a formal, professional register.
Fix any spelling or grammar mistakes. Reply with the rewritten text only.

Text:
{text}"#,
        )
        .with_temperature(0.3),
    ]
}
