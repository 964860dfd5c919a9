//! Embedded vector store with cosine-similarity search.
//!
//! Each collection lives in memory and is mirrored to `<root>/<name>.json`.
//! Every mutation rewrites the collection file through a temp file + rename,
//! so a crash never leaves a half-written collection behind.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::vector::{
    ChunkPayload, CollectionInfo, Distance, PointId, ScoredPoint, VectorPoint,
};

const COLLECTION_EXT: &str = "json";

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Vector store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vector store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("Collection '{collection}' expects {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Vector store lock poisoned")]
    LockPoisoned,
}

type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    norm: f32,
    payload: ChunkPayload,
}

#[derive(Debug, Clone)]
struct Collection {
    vector_size: usize,
    distance: Distance,
    points: BTreeMap<PointId, StoredPoint>,
}

impl Collection {
    fn new(vector_size: usize) -> Self {
        Self {
            vector_size,
            distance: Distance::Cosine,
            points: BTreeMap::new(),
        }
    }

    fn check_dimensions(&self, name: &str, actual: usize) -> Result<()> {
        if actual != self.vector_size {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: self.vector_size,
                actual,
            });
        }
        Ok(())
    }

    fn insert(&mut self, point: VectorPoint) {
        let norm = l2_norm(&point.vector);
        self.points.insert(
            point.id,
            StoredPoint {
                vector: point.vector,
                norm,
                payload: point.payload,
            },
        );
    }

    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            vector_size: self.vector_size,
            distance: self.distance,
            points: self.points.len(),
        }
    }
}

/// On-disk layout of one collection.
#[derive(Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    vector_size: usize,
    distance: Distance,
    points: Vec<VectorPoint>,
}

/// File-backed vector store rooted at a directory.
#[derive(Debug)]
pub struct VectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, Collection>>,
}

impl VectorStore {
    /// Open the store at `root`, creating the directory if needed and loading
    /// every persisted collection.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut collections = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXT) {
                continue;
            }
            let file: CollectionFile = serde_json::from_reader(BufReader::new(fs::File::open(&path)?))?;
            let mut collection = Collection::new(file.vector_size);
            collection.distance = file.distance;
            for point in file.points {
                collection.check_dimensions(&file.name, point.vector.len())?;
                collection.insert(point);
            }
            tracing::debug!(
                collection = %file.name,
                points = collection.points.len(),
                "Loaded vector collection"
            );
            collections.insert(file.name, collection);
        }

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().map_err(|_| VectorStoreError::LockPoisoned)?;
        Ok(collections.contains_key(name))
    }

    /// Reuse the named collection if present, otherwise create an empty one.
    ///
    /// An existing collection with a different vector size is an error; no
    /// migration is attempted.
    pub fn create_or_load(&self, name: &str, vector_size: usize) -> Result<CollectionInfo> {
        let mut collections = self.collections.write().map_err(|_| VectorStoreError::LockPoisoned)?;

        if let Some(existing) = collections.get(name) {
            existing.check_dimensions(name, vector_size)?;
            tracing::info!(collection = name, points = existing.points.len(), "Reusing vector collection");
            return Ok(existing.info(name));
        }

        let collection = Collection::new(vector_size);
        self.persist(name, &collection)?;
        let info = collection.info(name);
        collections.insert(name.to_string(), collection);
        tracing::info!(collection = name, vector_size, "Created vector collection");
        Ok(info)
    }

    /// Drop the named collection and its file. Returns whether it existed.
    pub fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().map_err(|_| VectorStoreError::LockPoisoned)?;
        let existed = collections.remove(name).is_some();
        let path = self.collection_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(existed)
    }

    /// Replace the collection wholesale: delete, recreate, populate.
    pub fn bulk_load(&self, name: &str, vector_size: usize, points: Vec<VectorPoint>) -> Result<usize> {
        let mut collection = Collection::new(vector_size);
        for point in points {
            collection.check_dimensions(name, point.vector.len())?;
            collection.insert(point);
        }

        let mut collections = self.collections.write().map_err(|_| VectorStoreError::LockPoisoned)?;
        if collections.remove(name).is_some() {
            tracing::info!(collection = name, "Dropped existing collection before bulk load");
        }
        self.persist(name, &collection)?;
        let loaded = collection.points.len();
        collections.insert(name.to_string(), collection);

        tracing::info!(collection = name, points = loaded, "Bulk-loaded vector collection");
        Ok(loaded)
    }

    /// Insert or replace a single point by id.
    pub fn upsert(&self, name: &str, point: VectorPoint) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| VectorStoreError::LockPoisoned)?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        collection.check_dimensions(name, point.vector.len())?;

        let id = point.id;
        collection.insert(point);
        self.persist(name, collection)?;
        tracing::debug!(collection = name, id, "Upserted vector point");
        Ok(())
    }

    /// Remove points by id. Unknown ids are ignored. Returns how many were removed.
    pub fn delete(&self, name: &str, ids: &[PointId]) -> Result<usize> {
        let mut collections = self.collections.write().map_err(|_| VectorStoreError::LockPoisoned)?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let removed = ids
            .iter()
            .filter(|id| collection.points.remove(id).is_some())
            .count();
        if removed > 0 {
            self.persist(name, collection)?;
        }
        tracing::debug!(collection = name, requested = ids.len(), removed, "Deleted vector points");
        Ok(removed)
    }

    /// Up to `limit` points by descending cosine similarity. Ties go to the lower id.
    pub fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().map_err(|_| VectorStoreError::LockPoisoned)?;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        collection.check_dimensions(name, query.len())?;

        if limit == 0 || collection.points.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(PointId, f32)> = collection
            .points
            .iter()
            .map(|(id, point)| (*id, cosine(query, query_norm, &point.vector, point.norm)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| {
                collection.points.get(&id).map(|point| ScoredPoint {
                    id,
                    score,
                    payload: point.payload.clone(),
                })
            })
            .collect())
    }

    pub fn count(&self, name: &str) -> Result<usize> {
        Ok(self.info(name)?.points)
    }

    pub fn info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read().map_err(|_| VectorStoreError::LockPoisoned)?;
        collections
            .get(name)
            .map(|c| c.info(name))
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{COLLECTION_EXT}"))
    }

    fn persist(&self, name: &str, collection: &Collection) -> Result<()> {
        let file = CollectionFile {
            name: name.to_string(),
            vector_size: collection.vector_size,
            distance: collection.distance,
            points: collection
                .points
                .iter()
                .map(|(id, point)| VectorPoint {
                    id: *id,
                    vector: point.vector.clone(),
                    payload: point.payload.clone(),
                })
                .collect(),
        };

        let tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(self.collection_path(name))
            .map_err(|e| VectorStoreError::Io(e.error))?;
        Ok(())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with precomputed norms; zero-norm vectors score 0.
fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// Cosine similarity in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine(a, l2_norm(a), b, l2_norm(b))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COLLECTION: &str = "admission_chunks";

    fn payload(text: &str) -> ChunkPayload {
        ChunkPayload {
            text: text.to_string(),
            keywords: vec![text.split_whitespace().next().unwrap_or_default().to_string()],
        }
    }

    fn point(id: PointId, vector: Vec<f32>, text: &str) -> VectorPoint {
        VectorPoint {
            id,
            vector,
            payload: payload(text),
        }
    }

    fn store_with_collection(dir: &TempDir) -> VectorStore {
        let store = VectorStore::open(dir.path()).unwrap();
        store.create_or_load(COLLECTION, 3).unwrap();
        store
    }

    #[test]
    fn test_search_single_point_returns_it_for_any_query() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(7, vec![1.0, 0.0, 0.0], "only point")).unwrap();

        for query in [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.2, -3.0, 9.0]] {
            let hits = store.search(COLLECTION, &query, 1).unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].id, 7);
        }
    }

    #[test]
    fn test_upsert_then_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(1, vec![0.0, 1.0, 0.0], "other")).unwrap();
        store.upsert(COLLECTION, point(5, vec![0.3, 0.1, 0.9], "target")).unwrap();

        let hits = store.search(COLLECTION, &[0.3, 0.1, 0.9], 1).unwrap();
        assert_eq!(hits[0].id, 5);
        assert_eq!(hits[0].payload, payload("target"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_upsert_replaces_existing_point() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(3, vec![1.0, 0.0, 0.0], "before")).unwrap();
        store.upsert(COLLECTION, point(3, vec![0.0, 0.0, 1.0], "after")).unwrap();

        assert_eq!(store.count(COLLECTION).unwrap(), 1);
        let hits = store.search(COLLECTION, &[0.0, 0.0, 1.0], 5).unwrap();
        assert_eq!(hits[0].payload.text, "after");
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(1, vec![1.0, 0.0, 0.0], "kept")).unwrap();

        let removed = store.delete(COLLECTION, &[42]).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.count(COLLECTION).unwrap(), 1);
    }

    #[test]
    fn test_deleted_point_never_returned() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(1, vec![1.0, 0.0, 0.0], "gone")).unwrap();
        store.upsert(COLLECTION, point(2, vec![0.0, 1.0, 0.0], "stays")).unwrap();

        assert_eq!(store.delete(COLLECTION, &[1]).unwrap(), 1);
        let hits = store.search(COLLECTION, &[1.0, 0.0, 0.0], 10).unwrap();
        assert!(hits.iter().all(|h| h.id != 1));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_orders_by_descending_similarity() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(1, vec![0.0, 1.0, 0.0], "orthogonal")).unwrap();
        store.upsert(COLLECTION, point(2, vec![1.0, 0.1, 0.0], "close")).unwrap();
        store.upsert(COLLECTION, point(3, vec![-1.0, 0.0, 0.0], "opposite")).unwrap();
        store.upsert(COLLECTION, point(4, vec![1.0, 0.0, 0.0], "exact")).unwrap();

        let hits = store.search(COLLECTION, &[2.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<PointId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![4, 2, 1]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_empty_collection_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        assert!(store.search(COLLECTION, &[1.0, 2.0, 3.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_load_replaces_collection() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        store.upsert(COLLECTION, point(99, vec![1.0, 1.0, 1.0], "incremental")).unwrap();

        let loaded = store
            .bulk_load(
                COLLECTION,
                3,
                vec![
                    point(1, vec![1.0, 0.0, 0.0], "first"),
                    point(2, vec![0.0, 1.0, 0.0], "second"),
                ],
            )
            .unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(store.count(COLLECTION).unwrap(), 2);
        let hits = store.search(COLLECTION, &[1.0, 1.0, 1.0], 10).unwrap();
        assert!(hits.iter().all(|h| h.id != 99), "incremental point must be gone");
    }

    #[test]
    fn test_collection_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_with_collection(&dir);
            store.upsert(COLLECTION, point(5, vec![0.5, 0.5, 0.0], "persisted")).unwrap();
        }

        let reopened = VectorStore::open(dir.path()).unwrap();
        assert!(reopened.collection_exists(COLLECTION).unwrap());
        let info = reopened.create_or_load(COLLECTION, 3).unwrap();
        assert_eq!(info.points, 1);
        let hits = reopened.search(COLLECTION, &[0.5, 0.5, 0.0], 1).unwrap();
        assert_eq!(hits[0].payload.text, "persisted");
    }

    #[test]
    fn test_create_or_load_rejects_dimension_change() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        match store.create_or_load(COLLECTION, 312) {
            Err(VectorStoreError::DimensionMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 312);
            }
            other => panic!("Expected DimensionMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn test_upsert_rejects_wrong_dimensions() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        let err = store
            .upsert(COLLECTION, point(1, vec![1.0, 0.0], "short"))
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_missing_collection_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.search("nope", &[1.0], 1),
            Err(VectorStoreError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_delete_collection_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store_with_collection(&dir);
        assert!(dir.path().join("admission_chunks.json").exists());

        assert!(store.delete_collection(COLLECTION).unwrap());
        assert!(!store.collection_exists(COLLECTION).unwrap());
        assert!(!dir.path().join("admission_chunks.json").exists());
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
