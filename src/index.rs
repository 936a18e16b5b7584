//! SQLite-backed file index.
//!
//! Tracks which files of each repository have been indexed and how long its
//! index jobs take. The crawler (outside this crate) calls
//! [`SqliteIndexService::record_file`] as it processes a repository and
//! [`SqliteIndexService::record_run`] when it finishes; the API reads counts,
//! trees and run times back. A full reindex clears the file rows so the
//! crawler starts over, but keeps run history.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use repo_gate_core::models::{FileTree, IndexRun, ProjectStats};
use repo_gate_core::store::IndexService;

const REINDEX_KEY: &str = "reindex_requested_at";

pub struct SqliteIndexService {
    pool: SqlitePool,
}

impl SqliteIndexService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_file(&self, repo_name: &str, path: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexed_files (repo_name, path, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(repo_name, path) DO UPDATE SET indexed_at = excluded.indexed_at
            "#,
        )
        .bind(repo_name)
        .bind(path)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records one finished index job for `repo_name`.
    pub async fn record_run(
        &self,
        repo_name: &str,
        finished_at: DateTime<Utc>,
        took: Duration,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_runs (repo_name, last_run_at, runs, total_seconds)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(repo_name) DO UPDATE SET
                last_run_at = excluded.last_run_at,
                runs = runs + 1,
                total_seconds = total_seconds + excluded.total_seconds
            "#,
        )
        .bind(repo_name)
        .bind(finished_at.timestamp())
        .bind(took.as_secs() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unix timestamp of the last full reindex request, if any.
    pub async fn reindex_requested_at(&self) -> Result<Option<i64>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_state WHERE key = ?")
                .bind(REINDEX_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }
}

#[async_trait]
impl IndexService for SqliteIndexService {
    async fn reindex_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let cleared = sqlx::query("DELETE FROM indexed_files")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(
            r#"
            INSERT INTO index_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(REINDEX_KEY)
        .bind(Utc::now().timestamp().to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(cleared, "full reindex requested");
        Ok(())
    }

    async fn project_stats(&self, name: &str) -> Result<ProjectStats> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_files WHERE repo_name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(ProjectStats {
            name: name.to_string(),
            total_files: count.max(0) as u64,
        })
    }

    async fn file_tree(&self, name: &str) -> Result<FileTree> {
        let paths: Vec<String> =
            sqlx::query_scalar("SELECT path FROM indexed_files WHERE repo_name = ? ORDER BY path")
                .bind(name)
                .fetch_all(&self.pool)
                .await?;
        Ok(FileTree {
            name: name.to_string(),
            paths,
        })
    }

    async fn index_run(&self, name: &str) -> Result<Option<IndexRun>> {
        let row = sqlx::query(
            "SELECT last_run_at, runs, total_seconds FROM index_runs WHERE repo_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let last_run_at: i64 = row.get("last_run_at");
        let runs: i64 = row.get("runs");
        let total: i64 = row.get("total_seconds");
        let last_run_at = DateTime::from_timestamp(last_run_at, 0)
            .with_context(|| format!("Invalid last_run_at for '{}': {}", name, last_run_at))?;
        Ok(Some(IndexRun {
            name: name.to_string(),
            last_run_at,
            runs: runs.max(0) as u64,
            average_seconds: (total / runs.max(1)).max(0) as u64,
        }))
    }
}
