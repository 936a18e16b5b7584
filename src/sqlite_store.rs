//! SQLite-backed repository and credential stores.
//!
//! [`SqliteStore`] implements both [`RepositoryStore`] and [`CredentialStore`]
//! over the `repos`, `delete_queue` and `api_keys` tables. Name uniqueness is
//! enforced by the `UNIQUE` constraint on `repos.name`, so two concurrent adds
//! of the same name cannot both succeed.
//!
//! Deletes are two-phase: [`queue_delete`](RepositoryStore::queue_delete)
//! records the request, and [`SqliteStore::process_delete_queue`] (run
//! periodically by the server) removes the repository, its indexed files and
//! its index run history.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repo_gate_core::models::{ApiCredential, RepoDescriptor, RepoKind, UNASSIGNED_ID};
use repo_gate_core::store::{CredentialStore, DuplicateName, RepositoryStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issues a new `APIK-` / `APISK-` key pair and stores it.
    pub async fn create_key(&self) -> Result<ApiCredential> {
        let public_key = format!("APIK-{}", uuid::Uuid::new_v4());
        let secret = format!("APISK-{}", uuid::Uuid::new_v4());

        sqlx::query("INSERT INTO api_keys (public_key, secret, created_at) VALUES (?, ?, ?)")
            .bind(&public_key)
            .bind(&secret)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to store API key")?;

        Ok(ApiCredential {
            public_key,
            secret: secret.into_bytes(),
        })
    }

    /// Stores a caller-chosen key pair.
    pub async fn insert_key(&self, credential: &ApiCredential) -> Result<()> {
        let secret = String::from_utf8(credential.secret.clone())
            .context("API secrets must be valid UTF-8")?;
        sqlx::query("INSERT INTO api_keys (public_key, secret, created_at) VALUES (?, ?, ?)")
            .bind(&credential.public_key)
            .bind(secret)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to store API key")?;
        Ok(())
    }

    /// Removes a key. Returns `false` if it did not exist.
    pub async fn delete_key(&self, public_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE public_key = ?")
            .bind(public_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Applies every queued delete. Returns the number of repositories removed.
    pub async fn process_delete_queue(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM delete_queue")
            .fetch_all(&mut *tx)
            .await?;

        let mut removed = 0;
        for name in &names {
            let result = sqlx::query("DELETE FROM repos WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();

            sqlx::query("DELETE FROM indexed_files WHERE repo_name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM index_runs WHERE repo_name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM delete_queue WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Names queued for deletion and not yet processed.
    pub async fn queued_deletes(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM delete_queue ORDER BY queued_at, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

fn row_to_repo(row: &SqliteRow) -> RepoDescriptor {
    let kind: String = row.get("kind");
    RepoDescriptor {
        id: row.get("id"),
        name: row.get("name"),
        kind: RepoKind::from_token(&kind),
        url: row.get("url"),
        username: row.get("username"),
        password: row.get("password"),
        source: row.get("source"),
        branch: row.get("branch"),
        extra_config: row.get("extra_config"),
    }
}

/// Maps a `UNIQUE(name)` violation to [`DuplicateName`] so callers can tell a
/// lost race from a broken database.
fn save_error(err: sqlx::Error, verb: &str, name: &str) -> anyhow::Error {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DuplicateName(name.to_string()).into()
        }
        other => anyhow::Error::new(other)
            .context(format!("Failed to {} repository '{}'", verb, name)),
    }
}

const REPO_COLUMNS: &str =
    "id, name, kind, url, username, password, source, branch, extra_config";

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<RepoDescriptor>> {
        let row = sqlx::query(&format!("SELECT {} FROM repos WHERE name = ?", REPO_COLUMNS))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_repo))
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<RepoDescriptor>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM repos WHERE url = ? ORDER BY id LIMIT 1",
            REPO_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_repo))
    }

    async fn get_all(&self) -> Result<Vec<RepoDescriptor>> {
        let rows = sqlx::query(&format!("SELECT {} FROM repos ORDER BY name", REPO_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_repo).collect())
    }

    async fn save(&self, repo: &RepoDescriptor) -> Result<()> {
        if repo.id == UNASSIGNED_ID {
            sqlx::query(
                r#"
                INSERT INTO repos (name, kind, url, username, password, source, branch, extra_config)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&repo.name)
            .bind(repo.kind.as_str())
            .bind(&repo.url)
            .bind(&repo.username)
            .bind(&repo.password)
            .bind(&repo.source)
            .bind(&repo.branch)
            .bind(&repo.extra_config)
            .execute(&self.pool)
            .await
            .map_err(|e| save_error(e, "insert", &repo.name))?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO repos (id, name, kind, url, username, password, source, branch, extra_config)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    url = excluded.url,
                    username = excluded.username,
                    password = excluded.password,
                    source = excluded.source,
                    branch = excluded.branch,
                    extra_config = excluded.extra_config
                "#,
            )
            .bind(repo.id)
            .bind(&repo.name)
            .bind(repo.kind.as_str())
            .bind(&repo.url)
            .bind(&repo.username)
            .bind(&repo.password)
            .bind(&repo.source)
            .bind(&repo.branch)
            .bind(&repo.extra_config)
            .execute(&self.pool)
            .await
            .map_err(|e| save_error(e, "replace", &repo.name))?;
        }
        Ok(())
    }

    async fn queue_delete(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO delete_queue (name, queued_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn resolve_secret(&self, public_key: &str) -> Result<Option<Vec<u8>>> {
        let secret: Option<String> =
            sqlx::query_scalar("SELECT secret FROM api_keys WHERE public_key = ?")
                .bind(public_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(secret.map(String::into_bytes))
    }
}
