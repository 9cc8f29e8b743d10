//! Startup loading of configured stylesheets (`key:location` entries).

use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::application::assets::{AssetsProvider, CssAsset};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("preload entry `{0}` must look like `key:location`")]
    InvalidEntry(String),
    #[error("fetching stylesheet failed")]
    Http(#[from] reqwest::Error),
    #[error("stylesheet request returned status {0}")]
    Status(u16),
    #[error("reading stylesheet failed")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Remote(Url),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadEntry {
    pub key: String,
    pub location: AssetLocation,
}

impl PreloadEntry {
    pub fn parse(raw: &str) -> Result<Self, AssetLoadError> {
        let invalid = || AssetLoadError::InvalidEntry(raw.to_string());
        let (key, location) = raw.split_once(':').ok_or_else(invalid)?;
        let (key, location) = (key.trim(), location.trim());
        if key.is_empty() || location.is_empty() {
            return Err(invalid());
        }

        let location = if location.starts_with("http://") || location.starts_with("https://") {
            AssetLocation::Remote(Url::parse(location).map_err(|_| invalid())?)
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            AssetLocation::File(PathBuf::from(path))
        };

        Ok(Self {
            key: key.to_string(),
            location,
        })
    }
}

/// Load every configured stylesheet. Failures are logged and skipped.
pub async fn load(preload: &[String]) -> AssetsProvider {
    if preload.is_empty() {
        return AssetsProvider::default();
    }

    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(
                target = "pressroom::assets",
                error = %err,
                "failed to build http client; using defaults"
            );
            reqwest::Client::new()
        }
    };

    let mut loaded = Vec::with_capacity(preload.len());
    for raw in preload {
        match fetch(&client, raw).await {
            Ok(asset) => {
                info!(
                    target = "pressroom::assets",
                    key = %asset.key,
                    bytes = asset.css.len(),
                    "stylesheet preloaded"
                );
                loaded.push(asset);
            }
            Err(err) => {
                warn!(
                    target = "pressroom::assets",
                    entry = %raw,
                    error = %err,
                    "skipping stylesheet preload"
                );
            }
        }
    }

    AssetsProvider::with_assets(loaded)
}

async fn fetch(client: &reqwest::Client, raw: &str) -> Result<CssAsset, AssetLoadError> {
    let entry = PreloadEntry::parse(raw)?;
    let css = match entry.location {
        AssetLocation::Remote(url) => {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AssetLoadError::Status(status.as_u16()));
            }
            response.text().await?
        }
        AssetLocation::File(path) => tokio::fs::read_to_string(path).await?,
    };
    Ok(CssAsset::new(entry.key, css))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::application::assets::BUILTIN_STYLESHEET_KEY;

    #[test]
    fn parses_remote_and_file_entries() {
        let remote = PreloadEntry::parse("brand:https://cdn.example.com/brand.css")
            .expect("remote entry");
        assert_eq!(remote.key, "brand");
        assert!(matches!(remote.location, AssetLocation::Remote(url) if url.host_str() == Some("cdn.example.com")));

        let file = PreloadEntry::parse("print:file:///etc/print.css").expect("file entry");
        assert_eq!(file.location, AssetLocation::File(PathBuf::from("/etc/print.css")));

        assert!(PreloadEntry::parse("no-location").is_err());
        assert!(PreloadEntry::parse(":/tmp/x.css").is_err());
    }

    #[tokio::test]
    async fn failing_preloads_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "h1{{color:navy}}").expect("write css");
        let entries = vec![
            format!("brand:{}", file.path().display()),
            "missing:/definitely/not/here.css".to_string(),
            "garbage".to_string(),
        ];

        let provider = load(&entries).await;

        assert_eq!(provider.css_by_key("brand"), Some("h1{color:navy}"));
        assert!(provider.css_by_key("missing").is_none());
        assert!(provider.css_by_key(BUILTIN_STYLESHEET_KEY).is_some());
    }
}
