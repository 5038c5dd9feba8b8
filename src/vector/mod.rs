//! Vector index for semantic storage and retrieval of generated passages.
//!
//! Two layers:
//!
//! - [`VectorBackend`] is the raw index, with named collections of
//!   `(point_id, vector, payload)` points with cosine nearest-neighbour
//!   search. Implementations: [`SqliteVectorBackend`] (persistent, brute-force
//!   cosine over BLOB-encoded vectors) and [`InMemoryVectorBackend`].
//! - [`VectorIndex`] is the adapter used by the rest of the crate. It owns an
//!   embedding provider, embeds text on the way in and out, and fills in
//!   point ids and timestamps.
//!
//! Ownership filtering is part of the backend query: [`VectorBackend::search`]
//! takes an optional owner and never returns points belonging to anyone else.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::models::{PassageMetadata, ScoredPoint, VectorPayload, VectorPoint};

pub use memory::InMemoryVectorBackend;
pub use sqlite::SqliteVectorBackend;

/// Description of a named collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: usize,
    pub distance: Distance,
}

/// Distance metric of a collection. Only cosine is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            other => bail!("unsupported distance metric: {}", other),
        }
    }
}

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_collections`](VectorBackend::get_collections) | List existing collections |
/// | [`create_collection`](VectorBackend::create_collection) | Create a collection |
/// | [`upsert`](VectorBackend::upsert) | Insert or replace points |
/// | [`search`](VectorBackend::search) | Cosine nearest neighbours, best first |
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn get_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()>;

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()>;

    /// Return at most `limit` points ordered by non-increasing similarity.
    /// When `owner` is set, only that user's points are considered.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        owner: Option<&str>,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Sort hits best-first and keep the top `limit`.
pub(crate) fn rank(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
    hits.truncate(limit);
    hits
}

/// Embedding-aware adapter over a [`VectorBackend`].
#[derive(Clone)]
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl VectorIndex {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection if it does not exist yet.
    ///
    /// Fails if the collection exists with a different vector size, which
    /// happens when the embedding model is changed without a new collection.
    #[tracing::instrument(name = "ensure vector collection", skip(self), fields(collection = %self.collection))]
    pub async fn ensure_collection(&self) -> Result<()> {
        let dims = self.embedder.dims();
        let existing = self.backend.get_collections().await?;

        match existing.iter().find(|c| c.name == self.collection) {
            Some(info) if info.vector_size != dims => bail!(
                "collection '{}' has vector size {} but the embedding model '{}' produces {}",
                self.collection,
                info.vector_size,
                self.embedder.model_name(),
                dims
            ),
            Some(_) => Ok(()),
            None => {
                tracing::info!(dims, "creating vector collection");
                self.backend
                    .create_collection(&self.collection, dims, Distance::Cosine)
                    .await
            }
        }
    }

    /// Embed `text` and store it with `metadata` under a fresh point id.
    #[tracing::instrument(name = "store passage vector", skip(self, text), fields(passage_id = metadata.passage_id))]
    pub async fn store(&self, text: &str, metadata: PassageMetadata) -> Result<String> {
        let vector = embed_one(self.embedder.as_ref(), text).await?;

        let point = VectorPoint {
            point_id: uuid::Uuid::new_v4().to_string(),
            vector,
            payload: VectorPayload {
                user_id: metadata.user_id,
                passage_id: metadata.passage_id,
                text: text.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        };

        self.backend
            .upsert(&self.collection, std::slice::from_ref(&point))
            .await?;
        Ok(point.point_id)
    }

    /// Embed `query` and return its nearest neighbours, best first.
    #[tracing::instrument(name = "search passage vectors", skip(self, query))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        owner: Option<&str>,
    ) -> Result<Vec<ScoredPoint>> {
        let query_vector = embed_one(self.embedder.as_ref(), query).await?;
        self.backend
            .search(&self.collection, &query_vector, limit, owner)
            .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic bag-of-words embedder: each lowercase word bumps one
    /// of `dims` buckets chosen by a simple string hash.
    pub struct HashEmbedder {
        pub dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| hash_embed(t, self.dims)).collect())
        }
    }

    pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dims];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let h = word
                .bytes()
                .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(b as u64));
            v[(h % dims as u64) as usize] += 1.0;
        }
        v
    }
}
