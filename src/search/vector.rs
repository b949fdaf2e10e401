use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryMetadata {
    pub source: String,
}

/// A stored vector entry. Entries carrying an `id` overwrite earlier entries
/// with the same id; entries without one are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// On-disk form of one collection.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionData {
    name: String,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

struct Collection {
    data: CollectionData,
    path: PathBuf,
    /// Last write did not reach disk.
    dirty: bool,
}

impl Collection {
    fn persist(&mut self) -> Result<()> {
        let write = || -> anyhow::Result<()> {
            let bytes = serde_json::to_vec(&self.data)?;
            let tmp_path = self.path.with_extension("json.tmp");
            std::fs::write(&tmp_path, bytes)?;
            std::fs::rename(&tmp_path, &self.path)?;
            Ok(())
        };

        match write() {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                Err(RagError::index(
                    &self.data.name,
                    format!("failed to persist {}: {e}", self.path.display()),
                ))
            }
        }
    }

    fn check_dimension(&self, dim: usize) -> Result<()> {
        match self.data.dimension {
            Some(expected) if expected != dim => Err(RagError::index(
                &self.data.name,
                format!("vector dimension {dim} does not match collection dimension {expected}"),
            )),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, entries: Vec<IndexEntry>) {
        let mut positions: HashMap<String, usize> = self
            .data
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.id.clone().map(|id| (id, i)))
            .collect();

        for entry in entries {
            let existing = entry.id.as_ref().and_then(|id| positions.get(id).copied());
            match existing {
                Some(pos) => self.data.entries[pos] = entry,
                None => {
                    if let Some(id) = &entry.id {
                        positions.insert(id.clone(), self.data.entries.len());
                    }
                    self.data.entries.push(entry);
                }
            }
        }
    }
}

/// Persistent vector index: one JSON file per named collection, cosine
/// similarity search, one writer per collection.
pub struct VectorIndex {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
}

impl VectorIndex {
    /// Load every readable collection under `index_dir`. Unreadable files are
    /// moved aside and their collections start empty on next write.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(|e| {
            RagError::index("*", format!("cannot create {}: {e}", index_dir.display()))
        })?;

        let mut collections = HashMap::new();
        let listing = std::fs::read_dir(index_dir).map_err(|e| {
            RagError::index("*", format!("cannot read {}: {e}", index_dir.display()))
        })?;

        for dir_entry in listing.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_collection(&path) {
                Ok(data) => {
                    tracing::debug!(
                        collection = %data.name,
                        entries = data.entries.len(),
                        "Loaded collection"
                    );
                    let name = data.name.clone();
                    let collection = Collection {
                        data,
                        path,
                        dirty: false,
                    };
                    collections.insert(name, Arc::new(RwLock::new(collection)));
                }
                Err(e) => {
                    let aside = path.with_extension("json.corrupt");
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        "Discarding unreadable collection file: {e:#}"
                    );
                    let _ = std::fs::rename(&path, &aside);
                }
            }
        }

        Ok(Self {
            dir: index_dir.to_path_buf(),
            collections: RwLock::new(collections),
        })
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self, name: &str) -> usize {
        self.handle(name)
            .map(|c| c.read().data.entries.len())
            .unwrap_or(0)
    }

    /// Add entries to `collection`, creating it on first write.
    pub fn upsert(&self, collection: &str, entries: Vec<IndexEntry>) -> Result<()> {
        self.write(collection, entries, false)
    }

    /// Atomically drop all entries whose source appears in `entries`, then add
    /// `entries`. Re-indexing a document therefore replaces its old chunks.
    pub fn replace_sources(&self, collection: &str, entries: Vec<IndexEntry>) -> Result<()> {
        self.write(collection, entries, true)
    }

    /// Nearest neighbours by cosine similarity, highest first. A missing or
    /// empty collection yields no hits.
    pub fn query(&self, collection: &str, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let Some(handle) = self.handle(collection) else {
            return Ok(Vec::new());
        };
        let guard = handle.read();
        if guard.data.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        guard.check_dimension(query.len())?;

        let mut scored: Vec<(f32, &IndexEntry)> = guard
            .data
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.vector), e))
            .collect();

        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                text: e.text.clone(),
                source: e.metadata.source.clone(),
                score,
            })
            .collect())
    }

    /// Re-persist any collection whose last write failed to reach disk.
    pub fn flush(&self) -> Result<()> {
        let handles: Vec<_> = self.collections.read().values().cloned().collect();
        for handle in handles {
            let mut guard = handle.write();
            if guard.dirty {
                guard.persist()?;
            }
        }
        Ok(())
    }

    fn handle(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections.read().get(name).cloned()
    }

    fn handle_or_create(&self, name: &str) -> Arc<RwLock<Collection>> {
        if let Some(handle) = self.handle(name) {
            return handle;
        }
        let mut map = self.collections.write();
        map.entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(collection = name, "Creating collection");
                Arc::new(RwLock::new(Collection {
                    data: CollectionData {
                        name: name.to_string(),
                        dimension: None,
                        entries: Vec::new(),
                    },
                    path: self.dir.join(collection_file_name(name)),
                    dirty: false,
                }))
            })
            .clone()
    }

    fn write(&self, collection: &str, entries: Vec<IndexEntry>, replace: bool) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let dim = entries[0].vector.len();
        if dim == 0 {
            return Err(RagError::index(collection, "empty vector"));
        }
        if entries.iter().any(|e| e.vector.len() != dim) {
            return Err(RagError::index(collection, "entries have mixed vector dimensions"));
        }

        let handle = self.handle_or_create(collection);
        let mut guard = handle.write();
        guard.check_dimension(dim)?;

        if replace {
            let sources: HashSet<&str> = entries.iter().map(|e| e.metadata.source.as_str()).collect();
            guard
                .data
                .entries
                .retain(|e| !sources.contains(e.metadata.source.as_str()));
        }

        let added = entries.len();
        guard.apply(entries);
        guard.data.dimension = Some(dim);

        tracing::debug!(
            collection,
            added,
            total = guard.data.entries.len(),
            "Wrote entries"
        );

        guard.persist()
    }
}

fn load_collection(path: &Path) -> anyhow::Result<CollectionData> {
    use anyhow::Context;

    let bytes = std::fs::read(path).context("read failed")?;
    let data: CollectionData = serde_json::from_slice(&bytes).context("parse failed")?;
    if let Some(dim) = data.dimension {
        anyhow::ensure!(
            data.entries.iter().all(|e| e.vector.len() == dim),
            "entry dimension does not match collection dimension {dim}"
        );
    }
    Ok(data)
}

/// File-safe, collision-free encoding of a collection name.
fn collection_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 5);
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("~{b:02x}"));
        }
    }
    out.push_str(".json");
    out
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Option<&str>, text: &str, source: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.map(str::to_string),
            text: text.to_string(),
            vector,
            metadata: EntryMetadata {
                source: source.to_string(),
            },
        }
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index
            .upsert(
                "docs",
                vec![
                    entry(None, "main", "a", vec![0.1, 0.2, 0.9]),
                    entry(None, "database", "b", vec![0.9, 0.1, 0.1]),
                    entry(None, "http", "c", vec![0.2, 0.8, 0.3]),
                ],
            )
            .unwrap();

        let hits = index.query("docs", &[0.95, 0.05, 0.05], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "database");
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);

        let top1 = index.query("docs", &[0.95, 0.05, 0.05], 1).unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[test]
    fn test_missing_collection_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        assert!(!index.collection_exists("nope"));
        assert!(index.query("nope", &[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_without_id_appends() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index.upsert("c", vec![entry(None, "x", "s", vec![1.0, 0.0])]).unwrap();
        index.upsert("c", vec![entry(None, "x", "s", vec![1.0, 0.0])]).unwrap();
        assert_eq!(index.count("c"), 2);
    }

    #[test]
    fn test_upsert_with_id_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index.upsert("c", vec![entry(Some("k"), "old", "s", vec![1.0, 0.0])]).unwrap();
        index.upsert("c", vec![entry(Some("k"), "new", "s", vec![0.0, 1.0])]).unwrap();
        assert_eq!(index.count("c"), 1);
        let hits = index.query("c", &[0.0, 1.0], 5).unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[test]
    fn test_replace_sources_drops_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index
            .upsert(
                "c",
                vec![
                    entry(Some("a#0"), "a0", "a", vec![1.0, 0.0]),
                    entry(Some("a#1"), "a1", "a", vec![1.0, 0.0]),
                    entry(Some("b#0"), "b0", "b", vec![0.0, 1.0]),
                ],
            )
            .unwrap();
        index
            .replace_sources("c", vec![entry(Some("a#0"), "a0 v2", "a", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(index.count("c"), 2);
        let texts: Vec<String> = index
            .query("c", &[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|h| h.text)
            .collect();
        assert!(texts.contains(&"a0 v2".to_string()));
        assert!(texts.contains(&"b0".to_string()));
    }

    #[test]
    fn test_dimension_mismatch_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index.upsert("c", vec![entry(None, "x", "s", vec![1.0, 0.0, 0.0])]).unwrap();
        assert!(matches!(
            index.upsert("c", vec![entry(None, "y", "s", vec![1.0, 0.0])]),
            Err(RagError::Index { .. })
        ));
        assert!(matches!(
            index.query("c", &[1.0, 0.0], 3),
            Err(RagError::Index { .. })
        ));
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        index
            .upsert(
                "c",
                vec![
                    entry(None, "first", "s", vec![1.0, 0.0]),
                    entry(None, "second", "s", vec![1.0, 0.0]),
                    entry(None, "third", "s", vec![1.0, 0.0]),
                ],
            )
            .unwrap();
        let hits = index.query("c", &[1.0, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = VectorIndex::open_or_create(dir.path()).unwrap();
            index
                .upsert("web results/2024", vec![entry(None, "persisted", "s", vec![0.6, 0.8])])
                .unwrap();
        }
        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        assert!(index.collection_exists("web results/2024"));
        let hits = index.query("web results/2024", &[0.6, 0.8], 1).unwrap();
        assert_eq!(hits[0].text, "persisted");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let index = VectorIndex::open_or_create(dir.path()).unwrap();
        assert!(index.collections().is_empty());
        assert!(dir.path().join("broken.json.corrupt").exists());

        index.upsert("broken", vec![entry(None, "fresh", "s", vec![1.0])]).unwrap();
        assert_eq!(index.count("broken"), 1);
    }

    #[test]
    fn test_readers_never_see_partial_writes() {
        const BATCH: usize = 5;
        const BATCHES_PER_WRITER: usize = 20;
        const WRITERS: usize = 2;

        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(VectorIndex::open_or_create(dir.path()).unwrap());
        index
            .upsert("shared", (0..BATCH).map(|i| entry(None, &format!("seed{i}"), "seed", vec![1.0, 0.0])).collect())
            .unwrap();

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for b in 0..BATCHES_PER_WRITER {
                        let source = format!("w{w}-b{b}");
                        let batch = (0..BATCH)
                            .map(|i| entry(None, &format!("{source}-{i}"), &source, vec![0.5, 0.5]))
                            .collect();
                        index.upsert("shared", batch).unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let count = index.count("shared");
                        assert_eq!(count % BATCH, 0, "observed a partial batch: {count}");
                        let hits = index.query("shared", &[1.0, 0.0], 1000).unwrap();
                        assert_eq!(hits.len() % BATCH, 0, "query saw a partial batch");
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
        assert_eq!(index.count("shared"), BATCH * (1 + WRITERS * BATCHES_PER_WRITER));
    }

    #[test]
    fn test_replace_sources_is_atomic_for_readers() {
        const BATCH: usize = 4;

        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(VectorIndex::open_or_create(dir.path()).unwrap());
        let batch = |round: usize| -> Vec<IndexEntry> {
            (0..BATCH)
                .map(|i| entry(Some(&format!("doc#{i}")), &format!("r{round}-{i}"), "doc", vec![1.0, 0.0]))
                .collect()
        };
        index.replace_sources("docs", batch(0)).unwrap();

        let writer = {
            let index = index.clone();
            std::thread::spawn(move || {
                for round in 1..50 {
                    index.replace_sources("docs", batch(round)).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let hits = index.query("docs", &[1.0, 0.0], 100).unwrap();
            assert_eq!(hits.len(), BATCH);
            let round = hits[0].text.split('-').next().unwrap().to_string();
            assert!(hits.iter().all(|h| h.text.starts_with(&format!("{round}-"))));
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_file_names_are_distinct() {
        assert_eq!(collection_file_name("docs"), "docs.json");
        assert_ne!(collection_file_name("a/b"), collection_file_name("a_b"));
        assert_ne!(collection_file_name("a b"), collection_file_name("a_b"));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
