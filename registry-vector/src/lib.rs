//! Single global vector index (spec §4.C7): L2-normalized embeddings in a
//! brute-force inner-product index, so the stored inner product equals
//! cosine similarity. A pure-Rust stand-in for `IndexFlatIP` — no FFI, no
//! vector database, just a `Vec` scanned linearly and a JSON metadata
//! sidecar kept in lockstep with it.

use registry_embeddings::EmbeddingsClient;
use registry_types::{EntityKind, GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// One entry's metadata: everything needed to project a hit back into a
/// result and to decide whether re-embedding can be skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: i64,
    pub kind: EntityKind,
    pub text_for_embedding: String,
    pub snapshot: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct MetadataSidecar {
    metadata: BTreeMap<String, MetadataRecord>,
    next_id: i64,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub path: String,
    pub kind: EntityKind,
    pub snapshot: serde_json::Value,
    pub enabled: bool,
    pub similarity: f32,
}

const INDEX_FILE: &str = "vector_index.bin";
const METADATA_FILE: &str = "vector_metadata.json";

pub struct VectorIndex {
    dir: PathBuf,
    dimension: usize,
    vectors: RwLock<Vec<(i64, Vec<f32>)>>,
    metadata: RwLock<BTreeMap<String, MetadataRecord>>,
    next_id: RwLock<i64>,
}

impl VectorIndex {
    /// Opens the index rooted at `dir`, loading any existing binary index
    /// and metadata sidecar. A dimension mismatch between the loaded
    /// vectors and `dimension` reinitializes an empty index with a warning
    /// (spec §4.C7 "Persistence").
    pub async fn open(dir: impl Into<PathBuf>, dimension: usize) -> GatewayResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = Self {
            dir,
            dimension,
            vectors: RwLock::new(Vec::new()),
            metadata: RwLock::new(BTreeMap::new()),
            next_id: RwLock::new(0),
        };
        index.load().await?;
        Ok(index)
    }

    async fn load(&mut self) -> GatewayResult<()> {
        let index_path = self.dir.join(INDEX_FILE);
        let metadata_path = self.dir.join(METADATA_FILE);

        let vectors: Vec<(i64, Vec<f32>)> = match tokio::fs::read(&index_path).await {
            Ok(bytes) => match bincode::deserialize(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse vector index, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        let sidecar: MetadataSidecar = match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => MetadataSidecar::default(),
        };

        let dimension_ok = vectors.iter().all(|(_, v)| v.len() == self.dimension);
        if dimension_ok {
            *self.vectors.write().await = vectors;
            *self.metadata.write().await = sidecar.metadata;
            *self.next_id.write().await = sidecar.next_id;
        } else {
            tracing::warn!(
                configured_dimension = self.dimension,
                "vector index dimension mismatch on load, reinitializing empty index"
            );
        }
        Ok(())
    }

    async fn persist(&self) -> GatewayResult<()> {
        let vectors = self.vectors.read().await.clone();
        let bytes = bincode::serialize(&vectors)
            .map_err(|e| GatewayError::internal(format!("failed to encode vector index: {e}")))?;
        write_atomic(&self.dir.join(INDEX_FILE), bytes).await?;

        let sidecar = MetadataSidecar {
            metadata: self.metadata.read().await.clone(),
            next_id: *self.next_id.read().await,
        };
        let json = serde_json::to_vec_pretty(&sidecar)?;
        write_atomic(&self.dir.join(METADATA_FILE), json).await
    }

    /// Inserts or refreshes the entry for `path`. Re-embeds only when
    /// `text` differs from the previously stored `text_for_embedding`
    /// (spec §4.C7 `upsert`).
    pub async fn upsert(
        &self,
        embeddings: &dyn EmbeddingsClient,
        path: &str,
        kind: EntityKind,
        text: &str,
        snapshot: serde_json::Value,
        enabled: bool,
    ) -> GatewayResult<()> {
        let existing = self.metadata.read().await.get(path).cloned();

        if let Some(mut record) = existing.clone() {
            if record.text_for_embedding == text {
                record.snapshot = snapshot;
                record.enabled = enabled;
                self.metadata.write().await.insert(path.to_string(), record);
                return self.persist().await;
            }
        }

        let encoded = embeddings.encode(&[text.to_string()]).await?;
        let vector = normalize(
            encoded
                .into_iter()
                .next()
                .ok_or_else(|| GatewayError::internal("embeddings client returned no vectors"))?,
        );

        let id = match &existing {
            Some(record) => record.id,
            None => {
                let mut next_id = self.next_id.write().await;
                let id = *next_id;
                *next_id += 1;
                id
            }
        };

        {
            let mut vectors = self.vectors.write().await;
            vectors.retain(|(existing_id, _)| *existing_id != id);
            vectors.push((id, vector));
        }

        let record = MetadataRecord {
            id,
            kind,
            text_for_embedding: text.to_string(),
            snapshot,
            enabled,
        };
        self.metadata.write().await.insert(path.to_string(), record);
        self.persist().await
    }

    /// Removes `path`'s metadata and vector. If the path was unknown this
    /// is a no-op (idempotent).
    pub async fn remove(&self, path: &str) -> GatewayResult<()> {
        let removed = self.metadata.write().await.remove(path);
        if let Some(record) = removed {
            let mut vectors = self.vectors.write().await;
            vectors.retain(|(id, _)| *id != record.id);
        }
        self.persist().await
    }

    /// Embeds and normalizes `query`, scores every stored vector by cosine
    /// similarity, drops tombstones (metadata missing for an id — shouldn't
    /// happen in this backend since `remove` always deletes the vector, but
    /// kept for backends that can't), and returns the top `k` hits,
    /// optionally restricted to `kinds`.
    pub async fn search(
        &self,
        embeddings: &dyn EmbeddingsClient,
        query: &str,
        kinds: Option<&[EntityKind]>,
        k: usize,
    ) -> GatewayResult<Vec<SearchHit>> {
        let encoded = embeddings.encode(&[query.to_string()]).await?;
        let query_vector = normalize(
            encoded
                .into_iter()
                .next()
                .ok_or_else(|| GatewayError::internal("embeddings client returned no vectors"))?,
        );

        let vectors = self.vectors.read().await;
        let metadata = self.metadata.read().await;

        let id_to_path: BTreeMap<i64, &String> =
            metadata.iter().map(|(path, record)| (record.id, path)).collect();

        let mut scored: Vec<(f32, String)> = vectors
            .iter()
            .filter_map(|(id, vector)| {
                let path = id_to_path.get(id)?;
                Some((dot(&query_vector, vector), (*path).clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut hits = Vec::new();
        for (raw_score, path) in scored {
            let Some(record) = metadata.get(&path) else {
                continue;
            };
            if let Some(kinds) = kinds {
                if !kinds.contains(&record.kind) {
                    continue;
                }
            }
            hits.push(SearchHit {
                path,
                kind: record.kind,
                snapshot: record.snapshot.clone(),
                enabled: record.enabled,
                similarity: raw_score.clamp(0.0, 1.0),
            });
            if hits.len() >= k {
                break;
            }
        }
        Ok(hits)
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }
}

/// Converts a backend "distance" into a similarity in `[0, 1]` (spec
/// §4.C7 "Relevance conversion"). This backend scores directly in cosine
/// similarity and doesn't need the conversion itself, but the two
/// documented conventions are exposed here for any alternate backend that
/// reports distance instead.
pub fn distance_to_similarity(distance: f32) -> f32 {
    let similarity = if (0.0..=2.0).contains(&distance) {
        1.0 - distance
    } else {
        -distance
    };
    similarity.clamp(0.0, 1.0)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

async fn write_atomic(path: &Path, bytes: Vec<u8>) -> GatewayResult<()> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = target
            .parent()
            .ok_or_else(|| GatewayError::internal("vector file has no parent directory".to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(&bytes)?;
        tmp.persist(&target)
            .map_err(|e| GatewayError::internal(format!("failed to persist file: {e}")))?;
        Ok::<_, GatewayError>(())
    })
    .await
    .map_err(|e| GatewayError::internal(format!("write task panicked: {e}")))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingsClient for StubEmbeddings {
        async fn encode(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("cat") {
                        vec![1.0, 0.0]
                    } else if t.contains("dog") {
                        vec![0.0, 1.0]
                    } else {
                        vec![0.5, 0.5]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn upsert_skips_reembed_when_text_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 2).await.unwrap();
        let embeddings = StubEmbeddings;

        index
            .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({"v": 1}), false)
            .await
            .unwrap();
        index
            .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({"v": 2}), true)
            .await
            .unwrap();

        assert_eq!(index.len().await, 1);
        let hits = index
            .search(&embeddings, "cat", None, 5)
            .await
            .unwrap();
        assert_eq!(hits[0].snapshot, serde_json::json!({"v": 2}));
        assert!(hits[0].enabled);
    }

    #[tokio::test]
    async fn search_ranks_closer_match_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 2).await.unwrap();
        let embeddings = StubEmbeddings;

        index
            .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({}), true)
            .await
            .unwrap();
        index
            .upsert(&embeddings, "/dogs", EntityKind::McpServer, "dog", serde_json::json!({}), true)
            .await
            .unwrap();

        let hits = index.search(&embeddings, "cat", None, 5).await.unwrap();
        assert_eq!(hits[0].path, "/cats");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn remove_deletes_vector_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 2).await.unwrap();
        let embeddings = StubEmbeddings;

        index
            .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({}), true)
            .await
            .unwrap();
        index.remove("/cats").await.unwrap();

        assert!(index.is_empty().await);
        let hits = index.search(&embeddings, "cat", None, 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn persists_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let embeddings = StubEmbeddings;
        {
            let index = VectorIndex::open(dir.path(), 2).await.unwrap();
            index
                .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({}), true)
                .await
                .unwrap();
        }
        let reopened = VectorIndex::open(dir.path(), 2).await.unwrap();
        assert_eq!(reopened.len().await, 1);
    }

    #[test]
    fn distance_conversion_covers_both_documented_ranges() {
        assert!((distance_to_similarity(0.2) - 0.8).abs() < 1e-6);
        assert!((distance_to_similarity(-0.3) - 0.3).abs() < 1e-6);
        assert_eq!(distance_to_similarity(5.0), 0.0);
    }

    #[tokio::test]
    async fn dimension_mismatch_reinitializes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let embeddings = StubEmbeddings;
        {
            let index = VectorIndex::open(dir.path(), 2).await.unwrap();
            index
                .upsert(&embeddings, "/cats", EntityKind::McpServer, "cat", serde_json::json!({}), true)
                .await
                .unwrap();
        }
        let reopened = VectorIndex::open(dir.path(), 8).await.unwrap();
        assert!(reopened.is_empty().await);
    }
}
