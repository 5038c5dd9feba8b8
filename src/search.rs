//! Semantic search over a user's own passages.

use serde::Serialize;

use crate::app::AppContext;
use crate::config::MAX_SEARCH_LIMIT;
use crate::error::{ServiceError, ServiceResult};
use crate::history::preview;
use crate::models::ScoredPoint;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    /// Passage id.
    pub id: i64,
    pub text: String,
    pub preview: String,
    pub score: f32,
}

/// Nearest passages to `query` owned by `owner`, best first.
///
/// `limit` defaults to `retrieval.search_limit`.
#[tracing::instrument(name = "search passages", skip(ctx))]
pub async fn search_passages(
    ctx: &AppContext,
    owner: &str,
    query: &str,
    limit: Option<usize>,
) -> ServiceResult<Vec<SearchResultItem>> {
    let index = ctx.index.as_ref().ok_or(ServiceError::EmbeddingsDisabled)?;

    let query = query.trim();
    if query.is_empty() {
        return Err(ServiceError::BadRequest("query must not be empty".to_string()));
    }

    let limit = limit.unwrap_or(ctx.config.retrieval.search_limit);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(ServiceError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_SEARCH_LIMIT
        )));
    }

    let hits = index
        .search(query, limit, Some(owner))
        .await
        .map_err(ServiceError::upstream)?;

    let preview_chars = ctx.config.retrieval.preview_chars;
    Ok(retain_owned(hits, owner)
        .into_iter()
        .map(|h| SearchResultItem {
            id: h.payload.passage_id,
            preview: preview(&h.payload.text, preview_chars),
            text: h.payload.text,
            score: h.score,
        })
        .collect())
}

/// Drop every hit whose payload belongs to someone other than `owner`.
pub fn retain_owned(hits: Vec<ScoredPoint>, owner: &str) -> Vec<ScoredPoint> {
    hits.into_iter()
        .filter(|h| h.payload.user_id == owner)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorPayload;

    fn hit(owner: &str, score: f32) -> ScoredPoint {
        ScoredPoint {
            point_id: format!("{}-{}", owner, score),
            payload: VectorPayload {
                user_id: owner.into(),
                passage_id: 1,
                text: "t".into(),
                timestamp: String::new(),
            },
            score,
        }
    }

    #[test]
    fn test_retain_owned_keeps_order() {
        let hits = vec![hit("alice", 0.9), hit("bob", 0.8), hit("alice", 0.5)];
        let kept = retain_owned(hits, "alice");
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|h| h.payload.user_id == "alice"));
        assert!(kept[0].score >= kept[1].score);
    }

    #[test]
    fn test_retain_owned_empty() {
        assert!(retain_owned(vec![hit("bob", 0.3)], "alice").is_empty());
    }
}
