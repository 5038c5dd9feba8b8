//! Passage history: the `passages` table.
//!
//! Every query is scoped to an owner. A passage that exists but belongs to
//! someone else is indistinguishable from one that does not exist.

use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{ServiceError, ServiceResult};
use crate::models::GeneratedPassage;

/// Default page size for [`list`].
pub const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// A passage as returned by the history and search APIs.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub text: String,
    pub preview: String,
    /// RFC 3339.
    pub created_at: String,
}

impl HistoryItem {
    pub fn from_passage(passage: &GeneratedPassage, preview_chars: usize) -> Self {
        Self {
            id: passage.id,
            text: passage.text.clone(),
            preview: preview(&passage.text, preview_chars),
            created_at: format_timestamp(passage.created_at),
        }
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub fn format_timestamp(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_default()
}

/// Insert a passage on an open connection or transaction.
pub async fn insert_passage(
    conn: &mut SqliteConnection,
    user_id: &str,
    text: &str,
    created_at: i64,
) -> sqlx::Result<GeneratedPassage> {
    let result = sqlx::query("INSERT INTO passages (user_id, text, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(text)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

    Ok(GeneratedPassage {
        id: result.last_insert_rowid(),
        user_id: user_id.to_string(),
        text: text.to_string(),
        created_at,
    })
}

/// Fetch a passage owned by `owner`, or [`ServiceError::NotFound`].
pub async fn get_owned(pool: &SqlitePool, owner: &str, id: i64) -> ServiceResult<GeneratedPassage> {
    let row = sqlx::query(
        "SELECT id, user_id, text, created_at FROM passages WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(passage_from_row(&row)),
        None => Err(ServiceError::NotFound(format!("manifestation {}", id))),
    }
}

/// Owner's passages, newest first.
pub async fn list(
    pool: &SqlitePool,
    owner: &str,
    skip: i64,
    limit: i64,
) -> ServiceResult<Vec<GeneratedPassage>> {
    if skip < 0 {
        return Err(ServiceError::BadRequest("skip must be >= 0".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ServiceError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let rows = sqlx::query(
        r#"
        SELECT id, user_id, text, created_at
        FROM passages
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(owner)
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(passage_from_row).collect())
}

fn passage_from_row(row: &sqlx::sqlite::SqliteRow) -> GeneratedPassage {
    GeneratedPassage {
        id: row.get("id"),
        user_id: row.get("user_id"),
        text: row.get("text"),
        created_at: row.get("created_at"),
    }
}
