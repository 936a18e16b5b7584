use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Tracked repositories; the name is the public identifier
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL DEFAULT 'git',
            url TEXT NOT NULL,
            username TEXT NOT NULL DEFAULT '',
            password TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            branch TEXT NOT NULL DEFAULT 'master',
            extra_config TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            public_key TEXT PRIMARY KEY,
            secret TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Persistent delete requests, drained by the delete worker
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delete_queue (
            name TEXT PRIMARY KEY,
            queued_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_files (
            repo_name TEXT NOT NULL,
            path TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            UNIQUE(repo_name, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per repository that has finished at least one index job
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_runs (
            repo_name TEXT PRIMARY KEY,
            last_run_at INTEGER NOT NULL,
            runs INTEGER NOT NULL,
            total_seconds INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repos_url ON repos(url)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexed_files_repo ON indexed_files(repo_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
