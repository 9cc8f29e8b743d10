//! Virtual file collection backing a render request.
//!
//! A [`Bundle`] hides whether its files came from a zip archive, from
//! individually uploaded parts, or from HTML rendered in-process. Every entry
//! is addressed by a normalised relative path.

use std::{
    collections::BTreeMap,
    fmt,
    io::{Cursor, Read},
};

use bytes::Bytes;
use thiserror::Error;
use zip::{ZipArchive, result::ZipError};

pub const INDEX_FILE: &str = "index.html";
pub const HEADER_FILE: &str = "header.html";
pub const FOOTER_FILE: &str = "footer.html";
/// Upper bound on the decompressed size of one archive entry.
pub const DEFAULT_ENTRY_LIMIT: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle archive could not be read")]
    Archive(#[source] ZipError),
    #[error("bundle is missing a root `index.html`")]
    MissingIndex,
    #[error("bundle entry `{path}` not found")]
    NotFound { path: String },
    #[error("bundle entry name `{path}` is not a valid relative path")]
    InvalidPath { path: String },
    #[error("bundle entry `{path}` expands beyond {limit} bytes")]
    EntryTooLarge { path: String, limit: u64 },
}

impl BundleError {
    fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}

/// Where the bytes of one bundle entry live.
#[derive(Debug, Clone)]
pub enum BundleEntry {
    /// Compressed entry inside the bundle's archive, decompressed on demand.
    Archive { index: usize },
    /// A file uploaded on its own.
    Loose(Bytes),
    /// Content produced while preparing the render, e.g. the executed template.
    Rendered(Bytes),
}

pub struct Bundle {
    archive: Option<ZipArchive<Cursor<Bytes>>>,
    entries: BTreeMap<String, BundleEntry>,
    entry_limit: u64,
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            archive: None,
            entries: BTreeMap::new(),
            entry_limit: DEFAULT_ENTRY_LIMIT,
        }
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("archive", &self.archive.is_some())
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a zip archive without decompressing any entry.
    pub fn read_from_zip(data: Bytes) -> Result<Self, BundleError> {
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(BundleError::Archive)?;
        let mut entries = BTreeMap::new();

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(BundleError::Archive)?;
            if file.is_dir() {
                continue;
            }
            if let Some(path) = normalize_path(file.name()) {
                entries.insert(path, BundleEntry::Archive { index });
            }
        }

        let mut bundle = Self {
            archive: Some(archive),
            entries,
            entry_limit: DEFAULT_ENTRY_LIMIT,
        };
        bundle.flatten_single_root();
        Ok(bundle)
    }

    /// Cap how many bytes a single archive entry may decompress to.
    pub fn with_entry_limit(mut self, limit: u64) -> Self {
        self.entry_limit = limit;
        self
    }

    /// Register one individually uploaded file.
    pub fn add_file(&mut self, name: &str, data: Bytes) -> Result<(), BundleError> {
        let path = normalize_path(name).ok_or_else(|| BundleError::InvalidPath {
            path: name.to_string(),
        })?;
        self.entries.insert(path, BundleEntry::Loose(data));
        Ok(())
    }

    /// Overwrite an entry with in-memory content, keeping the existing key spelling.
    pub fn replace(&mut self, path: &str, data: Bytes) -> Result<(), BundleError> {
        let normalized = normalize_path(path).ok_or_else(|| BundleError::InvalidPath {
            path: path.to_string(),
        })?;
        let key = self
            .lookup_key(&normalized)
            .map(str::to_string)
            .unwrap_or(normalized);
        self.entries.insert(key, BundleEntry::Rendered(data));
        Ok(())
    }

    pub fn test_index_file(&self) -> Result<(), BundleError> {
        self.index_path()
            .map(|_| ())
            .ok_or(BundleError::MissingIndex)
    }

    pub fn index_path(&self) -> Option<&str> {
        self.root_file(INDEX_FILE)
    }

    pub fn header_path(&self) -> Option<&str> {
        self.root_file(HEADER_FILE)
    }

    pub fn footer_path(&self) -> Option<&str> {
        self.root_file(FOOTER_FILE)
    }

    /// Read the bytes behind `path`. Lookup is exact first, then case-insensitive.
    pub fn resolve(&self, path: &str) -> Result<Bytes, BundleError> {
        let normalized = normalize_path(path).ok_or_else(|| BundleError::not_found(path))?;
        let key = self
            .lookup_key(&normalized)
            .ok_or_else(|| BundleError::not_found(path))?;

        match self.entries.get(key) {
            Some(BundleEntry::Loose(data)) | Some(BundleEntry::Rendered(data)) => Ok(data.clone()),
            Some(BundleEntry::Archive { index }) => self.decompress(*index, path),
            None => Err(BundleError::not_found(path)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decompress(&self, index: usize, path: &str) -> Result<Bytes, BundleError> {
        // ZipArchive clones share the parsed central directory.
        let mut archive = self
            .archive
            .clone()
            .ok_or_else(|| BundleError::not_found(path))?;
        let file = archive.by_index(index).map_err(BundleError::Archive)?;
        let too_large = || BundleError::EntryTooLarge {
            path: path.to_string(),
            limit: self.entry_limit,
        };
        // The declared size comes from the archive and is only a hint.
        if file.size() > self.entry_limit {
            return Err(too_large());
        }

        let mut buffer = Vec::new();
        file.take(self.entry_limit.saturating_add(1))
            .read_to_end(&mut buffer)
            .map_err(|err| BundleError::Archive(ZipError::Io(err)))?;
        if buffer.len() as u64 > self.entry_limit {
            return Err(too_large());
        }
        Ok(Bytes::from(buffer))
    }

    fn lookup_key(&self, normalized: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(normalized) {
            return Some(key.as_str());
        }
        self.entries
            .keys()
            .find(|key| key.eq_ignore_ascii_case(normalized))
            .map(String::as_str)
    }

    fn root_file(&self, name: &str) -> Option<&str> {
        self.entries
            .keys()
            .find(|key| !key.contains('/') && key.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Zip tools often wrap everything in one folder; lift it when it holds the index.
    fn flatten_single_root(&mut self) {
        if self.index_path().is_some() {
            return;
        }
        let Some(folder) = single_root_folder(self.entries.keys()) else {
            return;
        };
        let nested_index = format!("{folder}/{INDEX_FILE}");
        if !self
            .entries
            .keys()
            .any(|key| key.eq_ignore_ascii_case(&nested_index))
        {
            return;
        }

        let prefix_len = folder.len() + 1;
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(key, entry)| (key[prefix_len..].to_string(), entry))
            .collect();
    }
}

fn single_root_folder<'a>(mut paths: impl Iterator<Item = &'a String>) -> Option<String> {
    let (folder, _) = paths.next()?.split_once('/')?;
    for path in paths {
        match path.split_once('/') {
            Some((head, _)) if head == folder => {}
            _ => return None,
        }
    }
    Some(folder.to_string())
}

/// Normalise an entry name into a relative `/`-separated path.
///
/// Returns `None` for empty names and for names that try to leave the bundle.
pub fn normalize_path(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
