//! In-memory vector stores with JSON persistence and snapshot publishing.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::Result;

/// The three logical collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Text,
    Code,
    Comment,
}

impl StoreKind {
    pub const ALL: [Self; 3] = [Self::Text, Self::Code, Self::Comment];

    /// Directory name under the data dir.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Comment => "comment",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// Ordered `(id, vector, chunk)` collection searched by cosine distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStore {
    entries: Vec<StoreEntry>,
}

impl ChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StoreEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn push(&mut self, entry: StoreEntry) {
        self.entries.push(entry);
    }

    /// Top `k` chunks by ascending cosine distance. Ties keep insertion order.
    #[must_use]
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<(Chunk, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_distance(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, distance)| (self.entries[i].chunk.clone(), distance))
            .collect()
    }

    /// Absorb `other`. Entries whose id already exists are replaced in place;
    /// the rest are appended in order.
    pub fn merge_from(&mut self, other: ChunkStore) {
        let mut index: HashMap<String, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        for entry in other.entries {
            if let Some(&i) = index.get(&entry.id) {
                self.entries[i] = entry;
            } else {
                index.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Remove every entry whose id is listed. Returns how many were removed.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        before - self.entries.len()
    }

    /// Write the store to `path` off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_bytes_atomic(&path, &bytes))
            .await
            .map_err(std::io::Error::other)?
    }

    /// # Errors
    ///
    /// Returns an error if the file is missing or not a valid store.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Serialize `value` next to `path` and rename it into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_bytes_atomic(path, &serde_json::to_vec(value)?)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `1 - cos(a, b)`. A zero vector is at distance 1 from everything.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// One store per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSet {
    pub text: ChunkStore,
    pub code: ChunkStore,
    pub comment: ChunkStore,
}

impl StoreSet {
    #[must_use]
    pub fn get(&self, kind: StoreKind) -> &ChunkStore {
        match kind {
            StoreKind::Text => &self.text,
            StoreKind::Code => &self.code,
            StoreKind::Comment => &self.comment,
        }
    }

    pub fn get_mut(&mut self, kind: StoreKind) -> &mut ChunkStore {
        match kind {
            StoreKind::Text => &mut self.text,
            StoreKind::Code => &mut self.code,
            StoreKind::Comment => &mut self.comment,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        StoreKind::ALL.iter().all(|&k| self.get(k).is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        StoreKind::ALL.iter().map(|&k| self.get(k).len()).sum()
    }

    /// Merge every kind of `other` into this set.
    pub fn absorb(&mut self, other: StoreSet) {
        let StoreSet {
            text,
            code,
            comment,
        } = other;
        self.text.merge_from(text);
        self.code.merge_from(code);
        self.comment.merge_from(comment);
    }
}

/// Shared pointer to the latest published stores.
///
/// Readers take a cheap `Arc` snapshot and never observe a batch half-applied.
#[derive(Debug, Clone, Default)]
pub struct StoreHandle {
    current: Arc<RwLock<Arc<StoreSet>>>,
}

impl StoreHandle {
    #[must_use]
    pub fn new(stores: StoreSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(stores))),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn publish(&self, stores: StoreSet) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(stores);
    }
}
