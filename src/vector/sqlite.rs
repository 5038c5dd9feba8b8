//! SQLite-backed [`VectorBackend`].
//!
//! Vectors are stored as little-endian `f32` BLOBs in `vector_points`
//! next to their payload columns. Search loads the candidate rows for the
//! collection (narrowed by owner in SQL when one is given) and ranks them
//! by cosine similarity in Rust.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ScoredPoint, VectorPayload, VectorPoint};

use super::{rank, CollectionInfo, Distance, VectorBackend};

/// SQLite implementation of [`VectorBackend`].
///
/// Shares the application's [`SqlitePool`]; the tables are created by
/// [`run_migrations`](crate::migrate::run_migrations).
pub struct SqliteVectorBackend {
    pool: SqlitePool,
}

impl SqliteVectorBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn collection_size(&self, name: &str) -> Result<usize> {
        let size: Option<i64> =
            sqlx::query_scalar("SELECT vector_size FROM vector_collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        size.map(|s| s as usize)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorBackend {
    async fn get_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query("SELECT name, vector_size, distance FROM vector_collections")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let size: i64 = row.get("vector_size");
                let distance: String = row.get("distance");
                Ok(CollectionInfo {
                    name: row.get("name"),
                    vector_size: size as usize,
                    distance: Distance::parse(&distance)?,
                })
            })
            .collect()
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO vector_collections (name, vector_size, distance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(vector_size as i64)
        .bind(distance.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("collection '{}' already exists", name);
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let size = self.collection_size(collection).await?;
        let mut tx = self.pool.begin().await?;

        for point in points {
            if point.vector.len() != size {
                bail!(
                    "vector size {} does not match collection size {}",
                    point.vector.len(),
                    size
                );
            }

            sqlx::query(
                r#"
                INSERT INTO vector_points
                    (collection, point_id, user_id, passage_id, text, timestamp, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, point_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    passage_id = excluded.passage_id,
                    text = excluded.text,
                    timestamp = excluded.timestamp,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&point.point_id)
            .bind(&point.payload.user_id)
            .bind(point.payload.passage_id)
            .bind(&point.payload.text)
            .bind(&point.payload.timestamp)
            .bind(vec_to_blob(&point.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        owner: Option<&str>,
    ) -> Result<Vec<ScoredPoint>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(
                    r#"
                    SELECT point_id, user_id, passage_id, text, timestamp, embedding
                    FROM vector_points
                    WHERE collection = ? AND user_id = ?
                    "#,
                )
                .bind(collection)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT point_id, user_id, passage_id, text, timestamp, embedding
                    FROM vector_points
                    WHERE collection = ?
                    "#,
                )
                .bind(collection)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredPoint {
                    point_id: row.get("point_id"),
                    score: cosine_similarity(query_vector, &blob_to_vec(&blob)),
                    payload: VectorPayload {
                        user_id: row.get("user_id"),
                        passage_id: row.get("passage_id"),
                        text: row.get("text"),
                        timestamp: row.get("timestamp"),
                    },
                }
            })
            .collect();

        Ok(rank(hits, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;

    async fn backend() -> SqliteVectorBackend {
        SqliteVectorBackend::new(connect_memory().await.unwrap())
    }

    fn point(id: &str, owner: &str, passage_id: i64, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            point_id: id.to_string(),
            vector,
            payload: VectorPayload {
                user_id: owner.to_string(),
                passage_id,
                text: format!("passage {}", passage_id),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_collections_roundtrip() {
        let b = backend().await;
        assert!(b.get_collections().await.unwrap().is_empty());
        b.create_collection("manifestations", 3, Distance::Cosine)
            .await
            .unwrap();
        let cols = b.get_collections().await.unwrap();
        assert_eq!(
            cols,
            vec![CollectionInfo {
                name: "manifestations".into(),
                vector_size: 3,
                distance: Distance::Cosine,
            }]
        );
        assert!(b
            .create_collection("manifestations", 3, Distance::Cosine)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let b = backend().await;
        b.create_collection("m", 2, Distance::Cosine).await.unwrap();
        b.upsert(
            "m",
            &[
                point("a", "alice", 1, vec![1.0, 0.0]),
                point("b", "bob", 2, vec![1.0, 0.05]),
                point("c", "alice", 3, vec![0.5, 0.5]),
            ],
        )
        .await
        .unwrap();

        let all = b.search("m", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].score >= all[1].score);
        assert_eq!(all[0].point_id, "a");

        let mine = b.search("m", &[1.0, 0.0], 10, Some("alice")).await.unwrap();
        let ids: Vec<i64> = mine.iter().map(|h| h.payload.passage_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_upsert_unknown_collection() {
        let b = backend().await;
        let err = b
            .upsert("missing", &[point("a", "alice", 1, vec![1.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
