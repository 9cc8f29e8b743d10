//! PDF rendering handlers

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::domain::bundle::Bundle;
use crate::domain::job::RenderOptions;
use crate::infra::http::api::error::{ApiError, InputError};
use crate::infra::http::api::state::ApiState;

use super::{next_field, read_text};

const DEFAULT_PDF_NAME: &str = "document.pdf";
const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Render an uploaded bundle: one zip archive and/or loose files.
pub async fn render_bundle(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut archive: Option<Bytes> = None;
    let mut loose: Vec<(String, Bytes)> = Vec::new();
    let mut model = String::new();
    let mut engine = String::new();
    let mut options = RenderOptions::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("bundle") => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(InputError::from)?;
                if is_zip_upload(&file_name, content_type.as_deref()) {
                    if archive.replace(data).is_some() {
                        return Err(InputError::MultipleArchives.into());
                    }
                } else {
                    loose.push((file_name, data));
                }
            }
            Some("model") => model = read_text(field, "model").await?,
            Some("templateEngine") => engine = read_text(field, "templateEngine").await?,
            Some("options") => {
                let raw = read_text(field, "options").await?;
                if !raw.trim().is_empty() {
                    options = serde_json::from_str(&raw).map_err(InputError::InvalidOptions)?;
                }
            }
            _ => {}
        }
    }

    let mut bundle = match archive {
        Some(data) => tokio::task::spawn_blocking(move || Bundle::read_from_zip(data))
            .await
            .map_err(|err| ApiError::internal(err.to_string()))??,
        None if loose.is_empty() => {
            return Err(InputError::MissingField { field: "bundle" }.into());
        }
        None => Bundle::new(),
    };
    for (file_name, data) in loose {
        bundle.add_file(&file_name, data)?;
    }

    let pdf = state
        .pdf
        .pdf_from_bundle(bundle, &model, engine.trim(), options)
        .await?;
    Ok(pdf_response(pdf, DEFAULT_PDF_NAME))
}

/// Render a stored bundle; the request body is the JSON model.
pub async fn render_stored(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let model = std::str::from_utf8(&body).map_err(|_| InputError::NotUtf8 { field: "model" })?;
    let pdf = state.pdf.pdf_from_stored(&name, model).await?;
    Ok(pdf_response(pdf, &format!("{name}.pdf")))
}

fn is_zip_upload(file_name: &str, content_type: Option<&str>) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".zip")
        || lower.starts_with("bundle")
        || content_type.is_some_and(|value| value.eq_ignore_ascii_case("application/zip"))
}

fn pdf_response(pdf: Bytes, file_name: &str) -> Response {
    let safe: String = file_name
        .chars()
        .filter(|ch| !ch.is_control() && *ch != '"' && *ch != '\\')
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| {
            HeaderValue::from_static("attachment; filename=\"document.pdf\"")
        });

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_detection_follows_name_prefix_suffix_and_type() {
        assert!(is_zip_upload("Invoice.ZIP", None));
        assert!(is_zip_upload("bundle", None));
        assert!(is_zip_upload("upload.bin", Some("application/zip")));
        assert!(!is_zip_upload("index.html", Some("text/html")));
        assert!(!is_zip_upload("logo.png", None));
    }
}
