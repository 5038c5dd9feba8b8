//! Usage ledger: the append-only `usage_records` table.

use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::ServiceResult;
use crate::models::UsageRecord;

/// Endpoint name recorded for passage generation.
pub const GENERATE_ENDPOINT: &str = "generate";

/// Per-owner totals over the ledger and the passages table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_manifestations: i64,
    pub total_api_calls: i64,
    /// Milliseconds.
    pub total_generation_time: f64,
    pub total_cost: f64,
}

/// Append one record on an open connection or transaction.
pub async fn insert_usage(
    conn: &mut SqliteConnection,
    user_id: &str,
    endpoint: &str,
    tokens_used: i64,
    cost: f64,
    duration_ms: f64,
    created_at: i64,
) -> sqlx::Result<UsageRecord> {
    let result = sqlx::query(
        r#"
        INSERT INTO usage_records (user_id, endpoint, tokens_used, cost, duration_ms, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(endpoint)
    .bind(tokens_used)
    .bind(cost)
    .bind(duration_ms)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(UsageRecord {
        id: result.last_insert_rowid(),
        user_id: user_id.to_string(),
        endpoint: endpoint.to_string(),
        tokens_used,
        cost,
        duration_ms,
        created_at,
    })
}

/// Totals for `owner`. An owner with no activity gets all zeros.
pub async fn summary(pool: &SqlitePool, owner: &str) -> ServiceResult<UsageSummary> {
    let total_manifestations: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE user_id = ?")
            .bind(owner)
            .fetch_one(pool)
            .await?;

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS calls,
               COALESCE(SUM(duration_ms), 0.0) AS duration,
               COALESCE(SUM(cost), 0.0) AS cost
        FROM usage_records
        WHERE user_id = ?
        "#,
    )
    .bind(owner)
    .fetch_one(pool)
    .await?;

    Ok(UsageSummary {
        total_manifestations,
        total_api_calls: row.get("calls"),
        total_generation_time: row.get("duration"),
        total_cost: row.get("cost"),
    })
}
