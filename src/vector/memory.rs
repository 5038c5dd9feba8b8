//! In-memory [`VectorBackend`] for tests and ephemeral runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every point in the collection.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ScoredPoint, VectorPoint};

use super::{rank, CollectionInfo, Distance, VectorBackend};

struct Collection {
    info: CollectionInfo,
    points: HashMap<String, VectorPoint>,
}

/// In-memory vector store.
pub struct InMemoryVectorBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("vector store lock poisoned")
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn get_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.values().map(|c| c.info.clone()).collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        if collections.contains_key(name) {
            bail!("collection '{}' already exists", name);
        }
        collections.insert(
            name.to_string(),
            Collection {
                info: CollectionInfo {
                    name: name.to_string(),
                    vector_size,
                    distance,
                },
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;

        for point in points {
            if point.vector.len() != target.info.vector_size {
                bail!(
                    "vector size {} does not match collection size {}",
                    point.vector.len(),
                    target.info.vector_size
                );
            }
            target.points.insert(point.point_id.clone(), point.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        owner: Option<&str>,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().map_err(poisoned)?;
        let target = collections
            .get(collection)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;

        let hits = target
            .points
            .values()
            .filter(|p| owner.map_or(true, |o| p.payload.user_id == o))
            .map(|p| ScoredPoint {
                point_id: p.point_id.clone(),
                payload: p.payload.clone(),
                score: cosine_similarity(query_vector, &p.vector),
            })
            .collect();

        Ok(rank(hits, limit))
    }
}
