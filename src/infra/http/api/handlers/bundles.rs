//! Stored bundle handlers

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::application::store::BundleInfo;
use crate::domain::bundle::Bundle;
use crate::infra::http::api::error::{ApiError, InputError};
use crate::infra::http::api::models::{BundleListQuery, BundleListResponse, SavedBundleResponse};
use crate::infra::http::api::multipart::MultipartWriter;
use crate::infra::http::api::state::ApiState;

use super::{next_field, read_text};

const GENERATED_NAME_PREFIX: &str = "template-";

pub async fn save_bundle(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut archive: Option<(Bytes, Option<String>)> = None;
    let mut name = None;
    let mut template_engine = None;
    let mut rename_from = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("bundle") => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(InputError::from)?;
                archive = Some((data, content_type));
            }
            Some("name") => name = Some(read_text(field, "name").await?),
            Some("templateEngine") => {
                template_engine = Some(read_text(field, "templateEngine").await?)
            }
            Some("renameFrom") => rename_from = Some(read_text(field, "renameFrom").await?),
            _ => {}
        }
    }

    let (data, content_type) = archive.ok_or(InputError::MissingField { field: "bundle" })?;
    let name = resolve_name(name)?;
    let engine = state
        .pdf
        .engines()
        .resolve(template_engine.as_deref().unwrap_or_default().trim())?;

    Bundle::read_from_zip(data.clone())?.test_index_file()?;

    let mut info = BundleInfo::new(name, engine.key(), data);
    if let Some(content_type) = content_type.filter(|value| !value.trim().is_empty()) {
        info.content_type = content_type;
    }
    info.rename_from = rename_from
        .map(|previous| previous.trim().to_string())
        .filter(|previous| !previous.is_empty());

    state.bundles.save(&info).await?;

    info!(
        target = "pressroom::api",
        op = "save_bundle",
        name = %info.name,
        engine = %info.template_engine,
        size = info.size,
        rename_from = info.rename_from.as_deref().unwrap_or(""),
        "bundle saved"
    );

    Ok((
        StatusCode::CREATED,
        Json(SavedBundleResponse { name: info.name }),
    ))
}

pub async fn get_bundle(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.bundles.get(&name).await?;

    let (content_type, body) = MultipartWriter::new()
        .file("bundle", &info.file_name, &info.content_type, &info.data)
        .text("name", &info.name)
        .text("templateEngine", &info.template_engine)
        .finish();

    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

pub async fn delete_bundle(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.bundles.delete(&name).await?;
    info!(
        target = "pressroom::api",
        op = "delete_bundle",
        name = %name,
        "bundle deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bundles(
    State(state): State<ApiState>,
    Query(query): Query<BundleListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.bundles.list_info(&query.prefix).await?;
    Ok(Json(BundleListResponse { items }))
}

/// Blank names get a generated one; names must stay a single key segment.
fn resolve_name(raw: Option<String>) -> Result<String, InputError> {
    let name = raw.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Ok(format!("{GENERATED_NAME_PREFIX}{}", Uuid::new_v4().simple()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(InputError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_generated() {
        let generated = resolve_name(Some("  ".to_string())).expect("generated");
        assert!(generated.starts_with(GENERATED_NAME_PREFIX));
        assert!(resolve_name(None).is_ok());
    }

    #[test]
    fn names_are_trimmed_and_must_be_flat() {
        assert_eq!(
            resolve_name(Some(" invoice ".to_string())).expect("valid"),
            "invoice"
        );
        assert!(matches!(
            resolve_name(Some("a/b".to_string())),
            Err(InputError::InvalidName { .. })
        ));
        assert!(resolve_name(Some("..".to_string())).is_err());
    }
}
