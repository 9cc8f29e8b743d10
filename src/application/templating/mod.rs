//! Template engines turning a bundle's HTML plus a JSON model into final HTML.

mod golang;
mod mustache;

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use thiserror::Error;

pub use self::golang::GolangEngine;
pub use self::mustache::HandlebarsEngine;

pub const DEFAULT_ENGINE_KEY: &str = GolangEngine::KEY;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template engine `{key}` is not supported")]
    UnsupportedEngine { key: String },
    #[error("model is not valid JSON")]
    InvalidModel(#[source] serde_json::Error),
    #[error("{engine} template failed: {message}")]
    Render {
        engine: &'static str,
        message: String,
    },
}

impl TemplateError {
    pub fn render(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            engine,
            message: message.into(),
        }
    }
}

pub trait TemplateEngine: Send + Sync {
    fn key(&self) -> &'static str;

    fn execute(&self, template: &str, model: &Value) -> Result<String, TemplateError>;

    /// Dry-run the template, discarding the output.
    fn test(&self, template: &str, model: &Value) -> Result<(), TemplateError> {
        self.execute(template, model).map(|_| ())
    }
}

/// Passes HTML through untouched.
#[derive(Debug, Default)]
pub struct PlainHtmlEngine;

impl PlainHtmlEngine {
    pub const KEY: &'static str = "none";
}

impl TemplateEngine for PlainHtmlEngine {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn execute(&self, template: &str, _model: &Value) -> Result<String, TemplateError> {
        Ok(template.to_string())
    }
}

/// Engines addressable by the key stored alongside a bundle.
#[derive(Clone)]
pub struct TemplateEngines {
    engines: HashMap<&'static str, Arc<dyn TemplateEngine>>,
}

impl Default for TemplateEngines {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngines {
    pub fn new() -> Self {
        let engines: [Arc<dyn TemplateEngine>; 3] = [
            Arc::new(GolangEngine),
            Arc::new(HandlebarsEngine::new()),
            Arc::new(PlainHtmlEngine),
        ];
        Self {
            engines: engines
                .into_iter()
                .map(|engine| (engine.key(), engine))
                .collect(),
        }
    }

    /// Look up an engine; the empty key selects the golang engine.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn TemplateEngine>, TemplateError> {
        let normalized = key.trim().to_ascii_lowercase();
        let canonical = match normalized.as_str() {
            "" => DEFAULT_ENGINE_KEY,
            "mustache" => HandlebarsEngine::KEY,
            "html" => PlainHtmlEngine::KEY,
            other => other,
        };
        self.engines
            .get(canonical)
            .cloned()
            .ok_or_else(|| TemplateError::UnsupportedEngine {
                key: key.to_string(),
            })
    }
}

/// Parse a request model. Blank input yields an empty object.
pub fn parse_model(raw: &str) -> Result<Value, TemplateError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(TemplateError::InvalidModel)
}
