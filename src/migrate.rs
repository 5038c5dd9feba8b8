use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// CLI entry point for `envision init`.
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Generated passages
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Usage ledger, append-only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0.0,
            duration_ms REAL NOT NULL DEFAULT 0.0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_collections (
            name TEXT PRIMARY KEY,
            vector_size INTEGER NOT NULL,
            distance TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector points carry their payload inline. passage_id is not
    // a foreign key: the two stores are written independently.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_points (
            collection TEXT NOT NULL,
            point_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            passage_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, point_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_user ON passages(user_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_usage_user ON usage_records(user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_points_owner ON vector_points(collection, user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
