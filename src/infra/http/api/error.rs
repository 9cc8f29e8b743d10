use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::extract::multipart::MultipartError;
use serde::Serialize;
use thiserror::Error;

use crate::application::error::ErrorReport;
use crate::application::pdf::PdfError;
use crate::application::render::RenderError;
use crate::application::store::StoreError;
use crate::application::templating::TemplateError;
use crate::domain::bundle::BundleError;

pub const INTERNAL_MESSAGE: &str = "err during request";

/// JSON body of every API error. `requestId` is filled in by the request-context middleware.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub msg: String,
    pub err: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_message("infra::http::api", status, detail),
        }
    }

    pub fn from_error(status: StatusCode, message: &'static str, error: &dyn StdError) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_error("infra::http::api", status, error),
        }
    }

    pub fn bad_request(message: &'static str, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer secret",
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            msg: self.message.to_string(),
            err: self.report.chain(),
            request_id: String::new(),
        };
        let mut response = (self.status, Json(envelope.clone())).into_response();
        response.extensions_mut().insert(envelope);
        self.report.attach(&mut response);
        response
    }
}

/// Malformed or incomplete request input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed multipart payload")]
    Multipart(#[from] MultipartError),
    #[error("missing `{field}` field")]
    MissingField { field: &'static str },
    #[error("field `{field}` is not valid UTF-8")]
    NotUtf8 { field: &'static str },
    #[error("invalid render options")]
    InvalidOptions(#[source] serde_json::Error),
    #[error("invalid bundle name `{name}`")]
    InvalidName { name: String },
    #[error("only one zip archive may be uploaded per request")]
    MultipleArchives,
}

impl From<InputError> for ApiError {
    fn from(error: InputError) -> Self {
        Self::from_error(StatusCode::BAD_REQUEST, "invalid request", &error)
    }
}

impl From<BundleError> for ApiError {
    fn from(error: BundleError) -> Self {
        let (status, message) = match &error {
            BundleError::Archive(_) => (StatusCode::UNPROCESSABLE_ENTITY, "bundle archive is unreadable"),
            BundleError::MissingIndex => (StatusCode::UNPROCESSABLE_ENTITY, "bundle has no index.html"),
            BundleError::NotFound { .. } => (StatusCode::NOT_FOUND, "bundle entry not found"),
            BundleError::InvalidPath { .. } => (StatusCode::BAD_REQUEST, "invalid bundle file name"),
            BundleError::EntryTooLarge { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "bundle entry is too large")
            }
        };
        Self::from_error(status, message, &error)
    }
}

impl From<TemplateError> for ApiError {
    fn from(error: TemplateError) -> Self {
        let (status, message) = match &error {
            TemplateError::UnsupportedEngine { .. } => {
                (StatusCode::BAD_REQUEST, "unsupported template engine")
            }
            TemplateError::InvalidModel(_) => (StatusCode::BAD_REQUEST, "model is not valid JSON"),
            TemplateError::Render { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "template execution failed")
            }
        };
        Self::from_error(status, message, &error)
    }
}

impl From<RenderError> for ApiError {
    fn from(error: RenderError) -> Self {
        let (status, message) = match &error {
            RenderError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "render timed out"),
            RenderError::QueueFull | RenderError::PoolClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, "renderer unavailable")
            }
            RenderError::Failed(_) | RenderError::NoWorkers(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "render failed")
            }
        };
        Self::from_error(status, message, &error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let (status, message) = match &error {
            StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "bundle not found"),
            StoreError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "bundle store unavailable"),
            StoreError::Backend { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "bundle store error"),
        };
        Self::from_error(status, message, &error)
    }
}

impl From<PdfError> for ApiError {
    fn from(error: PdfError) -> Self {
        match error {
            PdfError::Bundle(inner) => inner.into(),
            PdfError::Template(inner) => inner.into(),
            PdfError::Render(inner) => inner.into(),
            PdfError::Store(inner) => inner.into(),
            other @ (PdfError::Stylesheet { .. } | PdfError::Task { .. }) => {
                Self::from_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE, &other)
            }
        }
    }
}
