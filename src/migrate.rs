use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Enrichment columns are NULL together or set together.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pull_requests (
            number INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            merged_at INTEGER,
            base_branch TEXT NOT NULL,
            head_branch TEXT NOT NULL,
            url TEXT NOT NULL,
            additions INTEGER NOT NULL DEFAULT 0,
            deletions INTEGER NOT NULL DEFAULT 0,
            changed_files INTEGER NOT NULL DEFAULT 0,
            why TEXT,
            business_impact TEXT,
            technical_changes TEXT,
            enrichment_areas TEXT,
            confidence_score REAL,
            enrichment_model TEXT,
            synced_at INTEGER NOT NULL,
            CHECK ((why IS NULL) = (enrichment_model IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_changes (
            pr_number INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            additions INTEGER NOT NULL DEFAULT 0,
            deletions INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            previous_path TEXT,
            PRIMARY KEY (pr_number, file_path),
            FOREIGN KEY (pr_number) REFERENCES pull_requests(number) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_changes_path ON file_changes(file_path)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pull_requests_merged_at ON pull_requests(merged_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
