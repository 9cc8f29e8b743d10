use std::collections::HashMap;

use serde_json::Value as Json;

use super::{TemplateEngine, TemplateError};

/// Go `text/template` syntax (`{{.Name}}`, `{{range}}`, `{{if}}`).
#[derive(Debug, Default)]
pub struct GolangEngine;

impl GolangEngine {
    pub const KEY: &'static str = "golang";
}

impl TemplateEngine for GolangEngine {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn execute(&self, template: &str, model: &Json) -> Result<String, TemplateError> {
        gtmpl::template(template, to_gtmpl(model))
            .map_err(|err| TemplateError::render(Self::KEY, err.to_string()))
    }
}

fn to_gtmpl(value: &Json) -> gtmpl::Value {
    match value {
        Json::Null => gtmpl::Value::Nil,
        Json::Bool(flag) => gtmpl::Value::Bool(*flag),
        Json::Number(number) => {
            if let Some(int) = number.as_i64() {
                gtmpl::Value::from(int)
            } else if let Some(uint) = number.as_u64() {
                gtmpl::Value::from(uint)
            } else {
                gtmpl::Value::from(number.as_f64().unwrap_or_default())
            }
        }
        Json::String(text) => gtmpl::Value::String(text.clone()),
        Json::Array(items) => gtmpl::Value::Array(items.iter().map(to_gtmpl).collect()),
        Json::Object(fields) => gtmpl::Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), to_gtmpl(value)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_field_access() {
        let html = GolangEngine
            .execute("<h1>{{.Name}}</h1>", &json!({"Name": "X"}))
            .expect("render");
        assert_eq!(html, "<h1>X</h1>");
    }

    #[test]
    fn renders_range_and_conditionals() {
        let model = json!({"Items": ["a", "b"], "Paid": false});
        let html = GolangEngine
            .execute(
                "{{range .Items}}<li>{{.}}</li>{{end}}{{if .Paid}}paid{{else}}due{{end}}",
                &model,
            )
            .expect("render");
        assert_eq!(html, "<li>a</li><li>b</li>due");
    }

    #[test]
    fn syntax_errors_carry_engine_key() {
        let err = GolangEngine
            .test("{{if .Name}}unterminated", &json!({}))
            .expect_err("broken template");
        assert!(matches!(err, TemplateError::Render { engine: "golang", .. }));
    }
}
