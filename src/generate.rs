//! Retrieval-augmented passage generation.
//!
//! [`generate_passage`] runs one strictly sequential chain:
//!
//! ```text
//! profile ─► retrieval query ─► vector index (owner-scoped, top-K)
//!         ─► context block ─► prompt ─► LLM ─► normalize
//!         ─► SQLite tx { passage, usage } ─► vector index store
//! ```
//!
//! Retrieval is best-effort: a disabled, empty or failing index yields an
//! empty context. Everything from the LLM call onward must succeed. If
//! indexing fails after the SQLite commit, the error is returned and the
//! committed rows stay.

use serde::Serialize;
use std::time::Instant;

use crate::app::AppContext;
use crate::error::{ServiceError, ServiceResult};
use crate::history::{self, format_timestamp, preview};
use crate::models::{PassageMetadata, ScoredPoint, UserProfile, PLACEHOLDER};
use crate::prompt::build_prompt;
use crate::usage::{self, GENERATE_ENDPOINT};

/// Result of a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub id: i64,
    pub text: String,
    /// RFC 3339.
    pub created_at: String,
    pub tokens_used: i64,
    pub cost: f64,
    /// Vector index point id; `None` when embeddings are disabled.
    pub point_id: Option<String>,
}

/// Generate, persist and index a passage for `owner`.
#[tracing::instrument(name = "generate passage", skip(ctx, profile))]
pub async fn generate_passage(
    ctx: &AppContext,
    owner: &str,
    profile: &UserProfile,
) -> ServiceResult<GenerationResponse> {
    let started = Instant::now();
    profile.validate()?;

    let context = retrieve_context(ctx, owner, profile).await;
    let prompt = build_prompt(profile, &context);

    let raw = ctx.llm.generate(&prompt).await?;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(ServiceError::Upstream("LLM returned empty text".to_string()));
    }

    let tokens_used = ctx.cost.estimate_tokens(&text);
    let cost = ctx.cost.calculate_cost(tokens_used);
    let now = chrono::Utc::now().timestamp();

    let mut tx = ctx.pool.begin().await?;
    let passage = history::insert_passage(&mut tx, owner, &text, now).await?;
    usage::insert_usage(
        &mut tx,
        owner,
        GENERATE_ENDPOINT,
        tokens_used,
        cost,
        duration_ms,
        now,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        passage_id = passage.id,
        tokens_used,
        duration_ms,
        "passage stored"
    );

    let point_id = match &ctx.index {
        Some(index) => {
            let metadata = PassageMetadata {
                user_id: owner.to_string(),
                passage_id: passage.id,
            };
            match index.store(&passage.text, metadata).await {
                Ok(point_id) => Some(point_id),
                Err(e) => {
                    tracing::error!(
                        passage_id = passage.id,
                        error = %format!("{:#}", e),
                        "indexing failed after commit"
                    );
                    return Err(ServiceError::upstream(e));
                }
            }
        }
        None => None,
    };

    Ok(GenerationResponse {
        id: passage.id,
        text: passage.text,
        created_at: format_timestamp(passage.created_at),
        tokens_used,
        cost,
        point_id,
    })
}

/// Owner-scoped nearest passages, rendered as a context block. Never fails.
async fn retrieve_context(ctx: &AppContext, owner: &str, profile: &UserProfile) -> String {
    let Some(index) = &ctx.index else {
        return String::new();
    };

    let query = retrieval_query(profile);
    if query.is_empty() {
        return String::new();
    }

    let retrieval = &ctx.config.retrieval;
    match index.search(&query, retrieval.context_k, Some(owner)).await {
        Ok(hits) => build_context(&hits, retrieval.context_preview_chars),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "context retrieval failed; continuing without context");
            String::new()
        }
    }
}

/// Join the profile's intent fields into one query string, skipping blanks.
pub fn retrieval_query(profile: &UserProfile) -> String {
    [
        Some(profile.manifestation_focus.as_str()),
        profile.next_year_goals.as_deref(),
        Some(profile.life_goals.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty() && *s != PLACEHOLDER)
    .collect::<Vec<_>>()
    .join(" ")
}

/// One bullet per hit, each truncated to `preview_chars` characters.
pub fn build_context(hits: &[ScoredPoint], preview_chars: usize) -> String {
    hits.iter()
        .map(|h| format!("- {}", preview(h.payload.text.trim(), preview_chars)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse every whitespace run to one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorPayload;

    fn hit(text: &str) -> ScoredPoint {
        ScoredPoint {
            point_id: "p".into(),
            payload: VectorPayload {
                user_id: "u".into(),
                passage_id: 1,
                text: text.into(),
                timestamp: String::new(),
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\n b\t\tc  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in ["x  y", "\n\nhello\r\n world \t", "already clean", "  "] {
            let once = normalize_whitespace(s);
            assert_eq!(normalize_whitespace(&once), once);
        }
    }

    #[test]
    fn test_retrieval_query_skips_blanks() {
        let profile = UserProfile {
            manifestation_focus: "Career growth".into(),
            next_year_goals: Some("  ".into()),
            life_goals: "Live by the ocean".into(),
            ..Default::default()
        };
        assert_eq!(retrieval_query(&profile), "Career growth Live by the ocean");

        let profile = UserProfile {
            next_year_goals: Some(PLACEHOLDER.into()),
            ..Default::default()
        };
        assert_eq!(retrieval_query(&profile), "");
    }

    #[test]
    fn test_build_context() {
        let long = "a".repeat(400);
        let ctx = build_context(&[hit("first passage"), hit(&long)], 300);
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "- first passage");
        assert_eq!(lines[1].chars().count(), 2 + 300 + 3);
        assert!(build_context(&[], 300).is_empty());
    }
}
