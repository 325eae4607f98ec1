//! Persistent record of what has been indexed: content hashes, store file
//! locations and the exact chunk ids each document owns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::store::{StoreKind, write_json_atomic};

pub const CACHE_VERSION: u32 = 1;

/// Chunk ids a document contributed to each store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocIds {
    #[serde(default)]
    pub text_ids: Vec<String>,
    #[serde(default)]
    pub code_ids: Vec<String>,
    #[serde(default)]
    pub comment_ids: Vec<String>,
}

impl DocIds {
    #[must_use]
    pub fn get(&self, kind: StoreKind) -> &[String] {
        match kind {
            StoreKind::Text => &self.text_ids,
            StoreKind::Code => &self.code_ids,
            StoreKind::Comment => &self.comment_ids,
        }
    }

    pub fn get_mut(&mut self, kind: StoreKind) -> &mut Vec<String> {
        match kind {
            StoreKind::Text => &mut self.text_ids,
            StoreKind::Code => &mut self.code_ids,
            StoreKind::Comment => &mut self.comment_ids,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.text_ids.len() + self.code_ids.len() + self.comment_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: u64,
    /// Hex sha256 of the document bytes.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_store_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_store_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_store_path: Option<PathBuf>,
}

impl CacheEntry {
    #[must_use]
    pub fn new(id: u64, hash: String) -> Self {
        Self {
            id,
            hash,
            text_store_path: None,
            code_store_path: None,
            comment_store_path: None,
        }
    }

    #[must_use]
    pub fn store_path(&self, kind: StoreKind) -> Option<&Path> {
        match kind {
            StoreKind::Text => self.text_store_path.as_deref(),
            StoreKind::Code => self.code_store_path.as_deref(),
            StoreKind::Comment => self.comment_store_path.as_deref(),
        }
    }

    pub fn set_store_path(&mut self, kind: StoreKind, path: Option<PathBuf>) {
        match kind {
            StoreKind::Text => self.text_store_path = path,
            StoreKind::Code => self.code_store_path = path,
            StoreKind::Comment => self.comment_store_path = path,
        }
    }

    /// Delete every store file this entry references. Failures are logged.
    pub fn remove_store_files(&self) {
        for kind in StoreKind::ALL {
            if let Some(path) = self.store_path(kind) {
                remove_file_logged(path);
            }
        }
    }
}

pub(crate) fn remove_file_logged(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove store file: {e}"),
    }
}

/// What `check_cache` concluded about a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    New,
    Valid,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCache {
    pub version: u32,
    /// Keyed by document path relative to the docs root.
    #[serde(default)]
    pub doc_ids: BTreeMap<String, DocIds>,
    /// Keyed by absolute document path.
    #[serde(default)]
    pub data: BTreeMap<String, CacheEntry>,
    /// Next document id to hand out. Never decreases.
    #[serde(default)]
    pub next_id: u64,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            doc_ids: BTreeMap::new(),
            data: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl IndexCache {
    /// Load the cache, starting empty when it is missing, unreadable or from
    /// another format version.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read index cache: {e}");
                return Self::default();
            }
        };
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(cache) if cache.version == CACHE_VERSION => cache,
            Ok(cache) => {
                tracing::warn!(
                    path = %path.display(),
                    found = cache.version,
                    expected = CACHE_VERSION,
                    "index cache version mismatch, rebuilding"
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "corrupt index cache, rebuilding: {e}");
                Self::default()
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Hand out a fresh document id. Ids of deleted documents are not reused.
    pub fn allocate_id(&mut self) -> u64 {
        let floor = self.data.values().map(|e| e.id + 1).max().unwrap_or(0);
        let id = self.next_id.max(floor);
        self.next_id = id + 1;
        id
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
