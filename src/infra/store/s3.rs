//! S3-compatible bundle store (MinIO, AWS, R2, ...).

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use tracing::{debug, info, warn};

use crate::application::store::{
    BUNDLE_KEY_PREFIX, BundleInfo, BundleSummary, DEFAULT_CONTENT_TYPE, Store, StoreError,
    object_key,
};
use crate::config::StoreSettings;
use crate::infra::error::InfraError;

const META_TEMPLATE_ENGINE: &str = "template-engine";
const META_SIZE: &str = "size";
const META_FILE_NAME: &str = "file-name";

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the configured endpoint and make sure the bucket exists.
    pub async fn connect(settings: &StoreSettings, endpoint: &str) -> Result<Self, InfraError> {
        if settings.bucket.trim().is_empty() {
            return Err(InfraError::configuration("store.bucket must not be empty"));
        }

        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "pressroom",
        );
        let endpoint_url = if endpoint.contains("://") {
            endpoint.to_string()
        } else if settings.secure {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        };

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&endpoint_url)
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let store = Self {
            client: Client::from_conf(config),
            bucket: settings.bucket.clone(),
        };
        store.ensure_bucket(&endpoint_url).await;
        Ok(store)
    }

    async fn ensure_bucket(&self, endpoint_url: &str) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            info!(
                target = "pressroom::store",
                bucket = %self.bucket,
                endpoint = endpoint_url,
                "connected to bundle bucket"
            );
            return;
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => info!(
                target = "pressroom::store",
                bucket = %self.bucket,
                endpoint = endpoint_url,
                "created bundle bucket"
            ),
            Err(err) => warn!(
                target = "pressroom::store",
                bucket = %self.bucket,
                endpoint = endpoint_url,
                error = %DisplayErrorContext(&err),
                "could not verify or create bundle bucket; operations will be attempted anyway"
            ),
        }
    }

    async fn template_engine_of(&self, name: &str) -> Result<String, StoreError> {
        let head = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key(name))
            .send()
            .await
        {
            Ok(head) => head,
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                return Err(if err.into_service_error().is_not_found() {
                    StoreError::not_found(name)
                } else {
                    StoreError::backend(message)
                });
            }
        };
        Ok(head
            .metadata()
            .and_then(|metadata| metadata.get(META_TEMPLATE_ENGINE))
            .cloned()
            .unwrap_or_default())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key(name))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                if err.into_service_error().is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::backend(message))
                }
            }
        }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn save(&self, info: &BundleInfo) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key(&info.name))
            .content_type(&info.content_type)
            .metadata(META_TEMPLATE_ENGINE, &info.template_engine)
            .metadata(META_SIZE, info.data.len().to_string())
            .metadata(META_FILE_NAME, &info.file_name)
            .body(ByteStream::from(info.data.clone()))
            .send()
            .await
            .map_err(|err| StoreError::backend(DisplayErrorContext(&err).to_string()))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<BundleInfo, StoreError> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key(name))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                return Err(if err.into_service_error().is_no_such_key() {
                    StoreError::not_found(name)
                } else {
                    StoreError::backend(message)
                });
            }
        };

        let metadata: HashMap<String, String> = response.metadata().cloned().unwrap_or_default();
        let content_type = response
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = response
            .body
            .collect()
            .await
            .map_err(|err| StoreError::backend(format!("failed to read bundle body: {err}")))?
            .into_bytes();

        Ok(BundleInfo {
            name: name.to_string(),
            template_engine: metadata
                .get(META_TEMPLATE_ENGINE)
                .cloned()
                .unwrap_or_default(),
            file_name: metadata
                .get(META_FILE_NAME)
                .cloned()
                .unwrap_or_else(|| format!("{name}.zip")),
            content_type,
            size: data.len() as u64,
            data,
            rename_from: None,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        if !self.exists(name).await? {
            return Err(StoreError::not_found(name));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key(name))
            .send()
            .await
            .map_err(|err| StoreError::backend(DisplayErrorContext(&err).to_string()))?;
        Ok(())
    }

    async fn list_info(&self, prefix: &str) -> Result<Vec<BundleSummary>, StoreError> {
        let mut summaries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(object_key(prefix));
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let page = request
                .send()
                .await
                .map_err(|err| StoreError::backend(DisplayErrorContext(&err).to_string()))?;

            for object in page.contents() {
                let Some(name) = object
                    .key()
                    .and_then(|key| key.strip_prefix(BUNDLE_KEY_PREFIX))
                else {
                    continue;
                };
                let Some(template_engine) = skip_missing(self.template_engine_of(name).await)?
                else {
                    debug!(
                        target = "pressroom::store",
                        op = "list_info",
                        name,
                        "bundle deleted while listing; skipped"
                    );
                    continue;
                };
                summaries.push(BundleSummary {
                    name: name.to_string(),
                    template_engine,
                    size: object.size().unwrap_or_default().max(0) as u64,
                });
            }

            if !page.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = page.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        summaries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(summaries)
    }
}

/// Objects removed between listing and inspection are dropped from the listing.
fn skip_missing<T>(outcome: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanished_objects_are_skipped_but_backend_errors_are_not() {
        assert_eq!(
            skip_missing(Ok("golang".to_string())).expect("present"),
            Some("golang".to_string())
        );
        assert_eq!(
            skip_missing::<String>(Err(StoreError::not_found("gone"))).expect("skipped"),
            None
        );
        assert!(matches!(
            skip_missing::<String>(Err(StoreError::backend("timeout"))),
            Err(StoreError::Backend { .. })
        ));
    }
}
