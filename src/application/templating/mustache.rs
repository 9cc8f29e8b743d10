use handlebars::{Handlebars, handlebars_helper};
use serde_json::Value as Json;

use super::{TemplateEngine, TemplateError};

handlebars_helper!(upper: |value: str| value.to_uppercase());
handlebars_helper!(lower: |value: str| value.to_lowercase());
handlebars_helper!(fallback: |value: Json, alternative: Json| {
    if is_blank(value) { alternative.clone() } else { value.clone() }
});

fn is_blank(value: &Json) -> bool {
    match value {
        Json::Null => true,
        Json::String(text) => text.is_empty(),
        Json::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Mustache-style templates. Strict mode turns unknown fields into errors.
pub struct HandlebarsEngine {
    registry: Handlebars<'static>,
}

impl HandlebarsEngine {
    pub const KEY: &'static str = "handlebars";

    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_helper("upper", Box::new(upper));
        registry.register_helper("lower", Box::new(lower));
        registry.register_helper("default", Box::new(fallback));
        Self { registry }
    }
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for HandlebarsEngine {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn execute(&self, template: &str, model: &Json) -> Result<String, TemplateError> {
        self.registry
            .render_template(template, model)
            .map_err(|err| TemplateError::render(Self::KEY, err.to_string()))
    }
}
