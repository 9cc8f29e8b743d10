//! API handlers organized by resource.

mod bundles;
mod health;
mod pdf;

pub use bundles::*;
pub use health::*;
pub use pdf::*;

use axum::extract::Multipart;
use axum::extract::multipart::Field;

use super::error::InputError;

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, InputError> {
    Ok(multipart.next_field().await?)
}

async fn read_text(field: Field<'_>, name: &'static str) -> Result<String, InputError> {
    let data = field.bytes().await?;
    String::from_utf8(data.to_vec()).map_err(|_| InputError::NotUtf8 { field: name })
}
