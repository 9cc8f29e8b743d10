//! Process-wide stylesheet cache shared by the loopback bridge and the pdf pipeline.

use tracing::warn;

pub const BUILTIN_STYLESHEET_KEY: &str = "pressroom.css";

const BUILTIN_STYLESHEET: &str = include_str!("pressroom.css");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssAsset {
    pub key: String,
    pub css: String,
}

impl CssAsset {
    pub fn new(key: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            css: css.into(),
        }
    }
}

/// Read-only after construction; share it as `Arc<AssetsProvider>`.
#[derive(Debug)]
pub struct AssetsProvider {
    assets: Vec<CssAsset>,
    merged: String,
}

impl Default for AssetsProvider {
    fn default() -> Self {
        Self::with_assets(Vec::new())
    }
}

impl AssetsProvider {
    /// Built-in stylesheet first, then `loaded` in order. Later duplicates of a key are skipped.
    pub fn with_assets(loaded: Vec<CssAsset>) -> Self {
        let mut assets = vec![CssAsset::new(BUILTIN_STYLESHEET_KEY, BUILTIN_STYLESHEET)];
        for asset in loaded {
            if assets.iter().any(|existing| existing.key == asset.key) {
                warn!(
                    target = "pressroom::assets",
                    key = %asset.key,
                    "duplicate stylesheet key; keeping the first definition"
                );
                continue;
            }
            assets.push(asset);
        }

        let merged = assets
            .iter()
            .map(|asset| asset.css.trim_end())
            .collect::<Vec<_>>()
            .join("\n");

        Self { assets, merged }
    }

    pub fn merged_css(&self) -> &str {
        &self.merged
    }

    pub fn css_by_key(&self, key: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|asset| asset.key == key)
            .map(|asset| asset.css.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|asset| asset.key.as_str())
    }
}
