//! Incremental indexer: per-document stores cached on disk, merged once at
//! startup and patched in place as documents change.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docdex_llm::EmbedProvider;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, CacheState, DocIds, IndexCache, remove_file_logged, sha256_hex};
use crate::chunk::Chunk;
use crate::error::{IndexError, Result};
use crate::loader::{is_markdown, loader_for};
use crate::splitter::{DocumentSplitter, SplitMode, SplitterConfig};
use crate::store::{ChunkStore, StoreEntry, StoreHandle, StoreKind, StoreSet};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub docs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_path: PathBuf,
    /// Split mode for markdown documents without a per-file override.
    pub mode: SplitMode,
    pub splitter: SplitterConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            data_dir: PathBuf::from("data"),
            cache_path: PathBuf::from("data/indices.json"),
            mode: SplitMode::default(),
            splitter: SplitterConfig::default(),
        }
    }
}

/// A document in the configured file set, relative to the docs root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackedFile {
    Path(String),
    WithMode { path: String, mode: SplitMode },
}

impl TrackedFile {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) | Self::WithMode { path, .. } => path,
        }
    }

    #[must_use]
    pub fn mode(&self) -> Option<SplitMode> {
        match self {
            Self::Path(_) => None,
            Self::WithMode { mode, .. } => Some(*mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Delete,
    Modify,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Modify => "modify",
        })
    }
}

/// Counters from a startup index run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub loaded_from_cache: usize,
    pub indexed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub failed: usize,
}

pub struct Indexer<P: EmbedProvider> {
    config: IndexerConfig,
    docs_root: PathBuf,
    splitter: DocumentSplitter,
    text_embedder: Arc<P>,
    code_embedder: Arc<P>,
    cache: IndexCache,
    files: Vec<TrackedFile>,
    /// Per-document stores waiting for `merge_documents`.
    staged: Vec<StoreSet>,
    /// Cache keys that loaded or indexed successfully this run.
    seen: HashSet<String>,
    stores: StoreSet,
    handle: StoreHandle,
    report: IndexReport,
}

impl<P: EmbedProvider> Indexer<P> {
    /// # Errors
    ///
    /// Returns an error if the docs root cannot be made absolute.
    pub fn new(
        config: IndexerConfig,
        files: Vec<TrackedFile>,
        text_embedder: Arc<P>,
        code_embedder: Arc<P>,
    ) -> Result<Self> {
        let docs_root = std::path::absolute(&config.docs_dir)?;
        let cache = IndexCache::load(&config.cache_path);
        Ok(Self {
            splitter: DocumentSplitter::new(config.splitter),
            config,
            docs_root,
            text_embedder,
            code_embedder,
            cache,
            files,
            staged: Vec::new(),
            seen: HashSet::new(),
            stores: StoreSet::default(),
            handle: StoreHandle::default(),
            report: IndexReport::default(),
        })
    }

    /// Handle through which retrievers see published snapshots.
    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    #[must_use]
    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    #[must_use]
    pub fn tracked_files(&self) -> &[TrackedFile] {
        &self.files
    }

    #[must_use]
    pub fn docs_root(&self) -> &Path {
        &self.docs_root
    }

    fn key(abs: &Path) -> String {
        abs.to_string_lossy().into_owned()
    }

    fn relative(&self, abs: &Path) -> Option<String> {
        abs.strip_prefix(&self.docs_root)
            .ok()
            .map(|rel| rel.to_string_lossy().into_owned())
    }

    fn store_path(&self, kind: StoreKind, id: u64) -> PathBuf {
        self.config
            .data_dir
            .join(kind.dir_name())
            .join(format!("{id}.json"))
    }

    fn embedder(&self, kind: StoreKind) -> &P {
        match kind {
            StoreKind::Code => self.code_embedder.as_ref(),
            StoreKind::Text | StoreKind::Comment => self.text_embedder.as_ref(),
        }
    }

    fn mode_for(&self, rel: &str) -> SplitMode {
        if !is_markdown(Path::new(rel)) {
            return SplitMode::CodeOnly;
        }
        self.files
            .iter()
            .find(|f| f.path() == rel)
            .and_then(TrackedFile::mode)
            .unwrap_or(self.config.mode)
    }

    /// Classify a document against the cache. A missing or unreadable file
    /// is never `Valid`.
    pub async fn check_cache(&self, abs: &Path) -> CacheState {
        let Some(entry) = self.cache.data.get(&Self::key(abs)) else {
            return CacheState::New;
        };
        match tokio::fs::read(abs).await {
            Ok(bytes) if sha256_hex(&bytes) == entry.hash => CacheState::Valid,
            _ => CacheState::Stale,
        }
    }

    /// Load one tracked document into the staging area, from cache when its
    /// hash still matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has to be indexed and that fails.
    pub async fn load_document(&mut self, file: &TrackedFile) -> Result<()> {
        let rel = file.path();
        let abs = self.docs_root.join(rel);
        if !abs.is_file() {
            tracing::warn!(path = %abs.display(), "tracked document missing, skipping");
            return Ok(());
        }
        let key = Self::key(&abs);
        let state = self.check_cache(&abs).await;

        if state == CacheState::Valid {
            match self.load_cached(&key).await {
                Ok(set) => {
                    tracing::debug!(path = rel, chunks = set.len(), "loaded from cache");
                    self.report.loaded_from_cache += 1;
                    self.stage(key, set);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(path = rel, "cached stores unreadable, re-indexing: {e}");
                }
            }
        }

        match state {
            CacheState::New => self.report.new += 1,
            CacheState::Valid | CacheState::Stale => self.report.modified += 1,
        }
        let set = self.index_document(&abs, rel).await?;
        self.report.indexed += 1;
        self.stage(key, set);
        Ok(())
    }

    /// A document that produced no chunks is not marked seen, so
    /// `merge_documents` purges its cache record.
    fn stage(&mut self, key: String, set: StoreSet) {
        if set.is_empty() {
            return;
        }
        self.seen.insert(key);
        self.staged.push(set);
    }

    async fn load_cached(&self, key: &str) -> Result<StoreSet> {
        let entry = self
            .cache
            .data
            .get(key)
            .ok_or_else(|| IndexError::Other(format!("no cache entry for {key}")))?;
        let mut set = StoreSet::default();
        for kind in StoreKind::ALL {
            if let Some(path) = entry.store_path(kind)
                && path.exists()
            {
                *set.get_mut(kind) = ChunkStore::load(path).await?;
            }
        }
        Ok(set)
    }

    /// Split, embed and persist one document, refreshing its cache entry and
    /// id table. The document keeps its integer id if it had one.
    async fn index_document(&mut self, abs: &Path, rel: &str) -> Result<StoreSet> {
        let bytes = tokio::fs::read(abs).await?;
        let hash = sha256_hex(&bytes);
        let text = String::from_utf8_lossy(&bytes);
        let mode = self.mode_for(rel);

        let loaded = loader_for(abs).parse(&text, rel);
        let split = self.splitter.split_documents(&loaded, mode);
        let (set, ids) = self.embed_chunks(rel, split).await?;

        let key = Self::key(abs);
        let id = match self.cache.data.get(&key) {
            Some(existing) => existing.id,
            None => self.cache.allocate_id(),
        };

        let mut entry = CacheEntry::new(id, hash);
        for kind in StoreKind::ALL {
            let path = self.store_path(kind, id);
            if set.get(kind).is_empty() {
                remove_file_logged(&path);
                continue;
            }
            set.get(kind).save(&path).await?;
            entry.set_store_path(kind, Some(path));
        }

        tracing::debug!(
            path = rel,
            id,
            ?mode,
            text = ids.text_ids.len(),
            code = ids.code_ids.len(),
            comment = ids.comment_ids.len(),
            "document indexed"
        );
        self.cache.data.insert(key, entry);
        self.cache.doc_ids.insert(rel.to_owned(), ids);
        Ok(set)
    }

    /// Assign ids and embed. Split chunks are numbered first, in order; the
    /// derived comment chunks continue the same counter.
    async fn embed_chunks(&self, rel: &str, chunks: Vec<Chunk>) -> Result<(StoreSet, DocIds)> {
        let mut set = StoreSet::default();
        let mut ids = DocIds::default();
        let mut seq = 0usize;
        let mut commented = Vec::new();

        for mut chunk in chunks {
            if chunk.content.trim().is_empty() {
                continue;
            }
            let kind = if chunk.is_code {
                StoreKind::Code
            } else {
                StoreKind::Text
            };
            let id = format!("{rel}-{seq}");
            seq += 1;
            chunk.id = Some(id.clone());
            if chunk.is_code
                && chunk
                    .comments
                    .as_deref()
                    .is_some_and(|c| !c.trim().is_empty())
            {
                commented.push(chunk.clone());
            }
            let vector = self.embedder(kind).embed(&chunk.content).await?;
            ids.get_mut(kind).push(id.clone());
            set.get_mut(kind).push(StoreEntry { id, vector, chunk });
        }

        for source in commented {
            let id = format!("{rel}-{seq}");
            seq += 1;
            let mut chunk = source.derive(source.comments.clone().unwrap_or_default());
            chunk.code = Some(source.content.clone());
            chunk.prev_context.clone_from(&source.prev_context);
            chunk.next_context.clone_from(&source.next_context);
            chunk.id = Some(id.clone());
            let vector = self
                .embedder(StoreKind::Comment)
                .embed(&chunk.content)
                .await?;
            ids.comment_ids.push(id.clone());
            set.comment.push(StoreEntry { id, vector, chunk });
        }

        Ok((set, ids))
    }

    /// Fold staged per-document stores into the global stores, purge cache
    /// records of documents that did not load this run, and publish.
    pub fn merge_documents(&mut self) -> IndexReport {
        let mut merged = StoreSet::default();
        for set in self.staged.drain(..) {
            merged.absorb(set);
        }

        let gone: Vec<String> = self
            .cache
            .data
            .keys()
            .filter(|k| !self.seen.contains(*k))
            .cloned()
            .collect();
        for key in gone {
            tracing::debug!(path = %key, "purging document from cache");
            self.purge(&key);
            self.report.deleted += 1;
        }
        let data = &self.cache.data;
        let root = &self.docs_root;
        self.cache
            .doc_ids
            .retain(|rel, _| data.contains_key(&Self::key(&root.join(rel))));
        self.seen.clear();

        self.stores = merged;
        self.publish();

        let report = std::mem::take(&mut self.report);
        tracing::info!(
            new = report.new,
            modified = report.modified,
            deleted = report.deleted,
            from_cache = report.loaded_from_cache,
            indexed = report.indexed,
            failed = report.failed,
            chunks = self.stores.len(),
            "index ready"
        );
        report
    }

    fn purge(&mut self, key: &str) {
        if let Some(entry) = self.cache.data.remove(key) {
            entry.remove_store_files();
        }
        if let Some(rel) = self.relative(Path::new(key)) {
            self.cache.doc_ids.remove(&rel);
        }
    }

    /// Load every tracked document and merge. Per-document failures are
    /// logged and counted.
    pub async fn index_all(&mut self) -> IndexReport {
        let files = self.files.clone();
        for file in &files {
            if let Err(e) = self.load_document(file).await {
                tracing::warn!(path = file.path(), "failed to index document: {e:#}");
                self.report.failed += 1;
            }
        }
        self.merge_documents()
    }

    /// Apply one change to the global stores.
    ///
    /// Callers must serialize invocations.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is outside the docs root or indexing fails.
    pub async fn reindex_document(&mut self, path: &Path, op: ChangeOp) -> Result<()> {
        let rel = self
            .relative(path)
            .ok_or_else(|| IndexError::OutsideRoot(path.to_path_buf()))?;
        match op {
            // Modify keeps the cache entry so the document keeps its id.
            ChangeOp::Add | ChangeOp::Modify => self.add_document(path, &rel).await,
            ChangeOp::Delete => {
                self.delete_document(path, &rel);
                Ok(())
            }
        }
    }

    /// The previous chunks stay live until the new ones are ready, so a
    /// failed re-index leaves the document as it was.
    async fn add_document(&mut self, abs: &Path, rel: &str) -> Result<()> {
        let stale = self.cache.doc_ids.get(rel).cloned();
        let set = self.index_document(abs, rel).await?;
        if let Some(stale) = stale {
            for kind in StoreKind::ALL {
                self.stores.get_mut(kind).delete(stale.get(kind));
            }
            tracing::debug!(path = rel, ids = stale.len(), "dropped stale chunks");
        }
        self.stores.absorb(set);
        if !self.files.iter().any(|f| f.path() == rel) {
            self.files.push(TrackedFile::Path(rel.to_owned()));
        }
        Ok(())
    }

    fn delete_document(&mut self, abs: &Path, rel: &str) {
        let ids = self.remove_from_stores(rel);
        let entry = self.cache.data.remove(&Self::key(abs));
        if let Some(entry) = &entry {
            entry.remove_store_files();
        }
        let tracked = self.files.len();
        self.files.retain(|f| f.path() != rel);

        if ids.is_none() && entry.is_none() && tracked == self.files.len() {
            tracing::warn!(path = rel, "delete requested for an unknown document");
            return;
        }
        tracing::debug!(
            path = rel,
            removed = ids.as_ref().map_or(0, DocIds::len),
            "document removed"
        );
    }

    fn remove_from_stores(&mut self, rel: &str) -> Option<DocIds> {
        let ids = self.cache.doc_ids.remove(rel)?;
        for kind in StoreKind::ALL {
            self.stores.get_mut(kind).delete(ids.get(kind));
        }
        Some(ids)
    }

    /// Run a coalesced batch in order, then publish one snapshot.
    pub async fn reindex(&mut self, batch: Vec<(PathBuf, ChangeOp)>) -> BatchReport {
        tracing::info!(changes = batch.len(), "reindex batch started");
        let mut report = BatchReport::default();
        for (path, op) in batch {
            match self.reindex_document(&path, op).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), %op, "reindex failed: {e:#}");
                    report.failed += 1;
                }
            }
        }
        self.publish();
        tracing::info!(
            applied = report.applied,
            failed = report.failed,
            "reindex batch finished"
        );
        report
    }

    /// Write the cache to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be written.
    pub fn persist(&self) -> Result<()> {
        self.cache.save(&self.config.cache_path)
    }

    fn publish(&self) {
        self.handle.publish(self.stores.clone());
    }
}

#[cfg(test)]
mod tests {
    use docdex_llm::mock::MockProvider;
    use tempfile::TempDir;

    use super::*;

    const GUIDE: &str = "# Guide\n\nInstall it.\n\n```python\n# greet the user\nprint(\"hi\")\n```\n";
    const NOTES: &str = "# Notes\n\nSome notes about configuration.\n";

    struct Fixture {
        dir: TempDir,
        config: IndexerConfig,
    }

    impl Fixture {
        fn new(docs: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let docs_dir = dir.path().join("docs");
            std::fs::create_dir_all(&docs_dir).unwrap();
            for (name, body) in docs {
                std::fs::write(docs_dir.join(name), body).unwrap();
            }
            let data_dir = dir.path().join("data");
            let config = IndexerConfig {
                cache_path: data_dir.join("indices.json"),
                docs_dir,
                data_dir,
                ..IndexerConfig::default()
            };
            Self { dir, config }
        }

        fn doc(&self, name: &str) -> PathBuf {
            self.config.docs_dir.join(name)
        }

        fn indexer(&self, files: &[&str]) -> Indexer<MockProvider> {
            self.indexer_with(files, MockProvider::with_embedding(vec![1.0, 0.0]))
        }

        fn indexer_with(&self, files: &[&str], provider: MockProvider) -> Indexer<MockProvider> {
            let provider = Arc::new(provider);
            Indexer::new(
                self.config.clone(),
                files.iter().map(|f| TrackedFile::Path((*f).into())).collect(),
                Arc::clone(&provider),
                provider,
            )
            .unwrap()
        }
    }

    fn all_ids(stores: &StoreSet) -> Vec<String> {
        StoreKind::ALL
            .iter()
            .flat_map(|&k| stores.get(k).ids().map(str::to_owned).collect::<Vec<_>>())
            .collect()
    }

    fn all_contents(stores: &StoreSet) -> Vec<String> {
        StoreKind::ALL
            .iter()
            .flat_map(|&k| {
                stores
                    .get(k)
                    .similarity_search(&[1.0, 0.0], usize::MAX)
                    .into_iter()
                    .map(|(c, _)| c.content)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn first_run_indexes_new_documents() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md"]);
        let report = indexer.index_all().await;

        assert_eq!(report.new, 1);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.loaded_from_cache, 0);
        assert_eq!(indexer.stores().text.len(), 1);
        assert_eq!(indexer.stores().code.len(), 1);

        let key = Indexer::<MockProvider>::key(&indexer.docs_root().join("guide.md"));
        let entry = &indexer.cache().data[&key];
        assert_eq!(entry.hash, sha256_hex(GUIDE.as_bytes()));
        assert!(entry.store_path(StoreKind::Text).unwrap().exists());
        assert_eq!(*indexer.handle().snapshot(), *indexer.stores());
    }

    #[cfg(feature = "lang-python")]
    #[tokio::test]
    async fn comment_chunks_follow_split_chunks_in_numbering() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md"]);
        indexer.index_all().await;

        let ids = &indexer.cache().doc_ids["guide.md"];
        assert_eq!(ids.text_ids, vec!["guide.md-0"]);
        assert_eq!(ids.code_ids, vec!["guide.md-1"]);
        assert_eq!(ids.comment_ids, vec!["guide.md-2"]);

        let comment = indexer.stores().comment.get("guide.md-2").unwrap();
        assert_eq!(comment.chunk.content, "# greet the user");
        assert_eq!(
            comment.chunk.code.as_deref(),
            Some("# greet the user\nprint(\"hi\")")
        );
    }

    #[tokio::test]
    async fn unchanged_documents_load_from_cache_without_embedding() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut first = fx.indexer(&["guide.md", "notes.md"]);
        first.index_all().await;
        first.persist().unwrap();

        let provider = MockProvider::with_embedding(vec![1.0, 0.0]);
        let mut second = fx.indexer_with(&["guide.md", "notes.md"], provider.clone());
        let report = second.index_all().await;

        assert_eq!(report.loaded_from_cache, 2);
        assert_eq!(report.new + report.modified, 0);
        assert_eq!(provider.calls(), 0);
        assert_eq!(second.stores(), first.stores());
    }

    #[tokio::test]
    async fn modified_document_keeps_its_id() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut first = fx.indexer(&["guide.md", "notes.md"]);
        first.index_all().await;
        first.persist().unwrap();
        let key = Indexer::<MockProvider>::key(&first.docs_root().join("notes.md"));
        let old_id = first.cache().data[&key].id;

        std::fs::write(fx.doc("notes.md"), "# Notes\n\nRewritten.\n").unwrap();
        let mut second = fx.indexer(&["guide.md", "notes.md"]);
        let report = second.index_all().await;

        assert_eq!(report.modified, 1);
        assert_eq!(report.loaded_from_cache, 1);
        assert_eq!(second.cache().data[&key].id, old_id);
        assert!(all_contents(second.stores()).iter().any(|c| c.contains("Rewritten")));
    }

    #[tokio::test]
    async fn documents_dropped_from_config_are_purged() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut first = fx.indexer(&["guide.md", "notes.md"]);
        first.index_all().await;
        first.persist().unwrap();
        let notes_key = Indexer::<MockProvider>::key(&first.docs_root().join("notes.md"));
        let notes_store = first.cache().data[&notes_key]
            .store_path(StoreKind::Text)
            .unwrap()
            .to_path_buf();

        let mut second = fx.indexer(&["guide.md"]);
        let report = second.index_all().await;

        assert_eq!(report.deleted, 1);
        assert!(!second.cache().data.contains_key(&notes_key));
        assert!(!second.cache().doc_ids.contains_key("notes.md"));
        assert!(!notes_store.exists());
        assert!(all_ids(second.stores()).iter().all(|id| id.starts_with("guide.md-")));
    }

    #[tokio::test]
    async fn missing_tracked_file_is_skipped() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md", "absent.md"]);
        let report = indexer.index_all().await;
        assert_eq!(report.new, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn failed_embedding_is_counted_not_fatal() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer_with(&["guide.md"], MockProvider::failing());
        let report = indexer.index_all().await;
        assert_eq!(report.failed, 1);
        assert!(indexer.stores().is_empty());
        assert!(indexer.cache().data.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_exactly_the_documents_ids() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["guide.md", "notes.md"]);
        indexer.index_all().await;

        indexer
            .reindex_document(&indexer.docs_root().join("notes.md"), ChangeOp::Delete)
            .await
            .unwrap();

        let ids = all_ids(indexer.stores());
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|id| id.starts_with("guide.md-")));
        assert!(!indexer.cache().doc_ids.contains_key("notes.md"));
        assert_eq!(indexer.tracked_files(), &[TrackedFile::Path("guide.md".into())]);
    }

    #[tokio::test]
    async fn delete_of_unknown_path_is_skipped() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md"]);
        indexer.index_all().await;
        let before = indexer.stores().clone();

        indexer
            .reindex_document(&indexer.docs_root().join("ghost.md"), ChangeOp::Delete)
            .await
            .unwrap();
        assert_eq!(*indexer.stores(), before);
    }

    #[tokio::test]
    async fn add_tracks_and_indexes_new_document() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md"]);
        indexer.index_all().await;

        std::fs::write(fx.doc("notes.md"), NOTES).unwrap();
        indexer
            .reindex_document(&indexer.docs_root().join("notes.md"), ChangeOp::Add)
            .await
            .unwrap();

        assert!(indexer.tracked_files().contains(&TrackedFile::Path("notes.md".into())));
        assert!(all_ids(indexer.stores()).iter().any(|id| id.starts_with("notes.md-")));
    }

    #[tokio::test]
    async fn modify_replaces_old_chunks() {
        let fx = Fixture::new(&[("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["notes.md"]);
        indexer.index_all().await;

        std::fs::write(fx.doc("notes.md"), "# Notes\n\nEntirely new text.\n").unwrap();
        indexer
            .reindex_document(&indexer.docs_root().join("notes.md"), ChangeOp::Modify)
            .await
            .unwrap();

        let contents = all_contents(indexer.stores());
        assert_eq!(contents.len(), 1);
        assert!(contents[0].contains("Entirely new text."));
        assert_eq!(indexer.tracked_files().len(), 1);
    }

    #[tokio::test]
    async fn failed_modify_keeps_previous_state() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["guide.md", "notes.md"]);
        indexer.index_all().await;
        let notes = indexer.docs_root().join("notes.md");
        let before = indexer.stores().clone();

        std::fs::remove_file(fx.doc("notes.md")).unwrap();
        let report = indexer.reindex(vec![(notes.clone(), ChangeOp::Modify)]).await;
        assert_eq!(report, BatchReport { applied: 0, failed: 1 });
        assert_eq!(*indexer.stores(), before);
        assert!(indexer.cache().doc_ids.contains_key("notes.md"));

        let report = indexer.reindex(vec![(notes.clone(), ChangeOp::Delete)]).await;
        assert_eq!(report, BatchReport { applied: 1, failed: 0 });
        assert!(!indexer.cache().data.contains_key(&Indexer::<MockProvider>::key(&notes)));
        assert!(all_ids(indexer.stores()).iter().all(|id| id.starts_with("guide.md-")));
        assert_eq!(indexer.tracked_files(), &[TrackedFile::Path("guide.md".into())]);
    }

    #[tokio::test]
    async fn failed_embedding_on_modify_keeps_old_chunks() {
        let fx = Fixture::new(&[("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["notes.md"]);
        indexer.index_all().await;
        let before = indexer.stores().clone();

        indexer.text_embedder = Arc::new(MockProvider::failing());
        indexer.code_embedder = Arc::clone(&indexer.text_embedder);
        std::fs::write(fx.doc("notes.md"), "# Notes\n\nChanged.\n").unwrap();
        let result = indexer
            .reindex_document(&indexer.docs_root().join("notes.md"), ChangeOp::Modify)
            .await;

        assert!(result.is_err());
        assert_eq!(*indexer.stores(), before);
    }

    #[tokio::test]
    async fn delete_without_recorded_chunks_still_drops_cache_and_tracking() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["guide.md", "notes.md"]);
        indexer.index_all().await;
        indexer.cache.doc_ids.remove("notes.md");
        let notes = indexer.docs_root().join("notes.md");
        let store_file = indexer.cache().data[&Indexer::<MockProvider>::key(&notes)]
            .store_path(StoreKind::Text)
            .unwrap()
            .to_path_buf();

        indexer.reindex_document(&notes, ChangeOp::Delete).await.unwrap();

        assert!(!indexer.cache().data.contains_key(&Indexer::<MockProvider>::key(&notes)));
        assert!(!store_file.exists());
        assert_eq!(indexer.tracked_files(), &[TrackedFile::Path("guide.md".into())]);
    }

    #[tokio::test]
    async fn empty_document_is_purged_at_merge() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("empty.md", "  \n\n")]);
        let mut indexer = fx.indexer(&["guide.md", "empty.md"]);
        indexer.index_all().await;

        let key = Indexer::<MockProvider>::key(&indexer.docs_root().join("empty.md"));
        assert!(!indexer.cache().data.contains_key(&key));
        assert!(!indexer.cache().doc_ids.contains_key("empty.md"));
        assert!(all_ids(indexer.stores()).iter().all(|id| id.starts_with("guide.md-")));
    }

    #[tokio::test]
    async fn deleted_document_id_is_not_reused() {
        let fx = Fixture::new(&[("guide.md", GUIDE), ("notes.md", NOTES)]);
        let mut indexer = fx.indexer(&["guide.md", "notes.md"]);
        indexer.index_all().await;
        let notes = indexer.docs_root().join("notes.md");
        let notes_id = indexer.cache().data[&Indexer::<MockProvider>::key(&notes)].id;

        indexer.reindex(vec![(notes, ChangeOp::Delete)]).await;
        std::fs::write(fx.doc("extra.md"), "# Extra\n\nMore.\n").unwrap();
        let extra = indexer.docs_root().join("extra.md");
        indexer.reindex(vec![(extra.clone(), ChangeOp::Add)]).await;

        let extra_id = indexer.cache().data[&Indexer::<MockProvider>::key(&extra)].id;
        assert!(extra_id > notes_id);
    }

    #[tokio::test]
    async fn batch_continues_past_failures_and_publishes() {
        let fx = Fixture::new(&[("guide.md", GUIDE)]);
        let mut indexer = fx.indexer(&["guide.md"]);
        indexer.index_all().await;
        let handle = indexer.handle();
        let before = handle.snapshot();

        std::fs::write(fx.doc("notes.md"), NOTES).unwrap();
        let outside = fx.dir.path().join("elsewhere.md");
        let report = indexer
            .reindex(vec![
                (outside, ChangeOp::Add),
                (indexer.docs_root().join("notes.md"), ChangeOp::Add),
            ])
            .await;

        assert_eq!(report, BatchReport { applied: 1, failed: 1 });
        assert!(before.text.ids().all(|id| id.starts_with("guide.md-")));
        assert!(handle.snapshot().text.ids().any(|id| id.starts_with("notes.md-")));
    }

    #[tokio::test]
    async fn non_markdown_files_are_indexed_as_code() {
        let fx = Fixture::new(&[("util.py", "def f():\n    return 1\n")]);
        let mut indexer = fx.indexer(&["util.py"]);
        indexer.index_all().await;
        assert!(indexer.stores().text.is_empty());
        assert_eq!(indexer.stores().code.len(), 1);
    }

    #[test]
    fn tracked_file_accepts_both_shapes() {
        let files: Vec<TrackedFile> =
            serde_json::from_str(r#"["a.md", {"path": "b.md", "mode": "code-only"}]"#).unwrap();
        assert_eq!(files[0].path(), "a.md");
        assert_eq!(files[0].mode(), None);
        assert_eq!(files[1].mode(), Some(SplitMode::CodeOnly));
    }
}
