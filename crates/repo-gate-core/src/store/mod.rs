//! Collaborator abstractions consumed by the command dispatcher.
//!
//! The dispatcher never reaches into a global registry. It is handed one
//! implementation of each trait at construction time (see
//! [`Collaborators`](crate::dispatch::Collaborators)).
//!
//! Implementations must be `Send + Sync`: a single instance is shared by every
//! in-flight command and may be called concurrently. They are responsible for
//! their own serialization (for example, a uniqueness constraint on
//! repository names).
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CredentialStore`] | Public key → shared secret |
//! | [`RepositoryStore`] | Persisted repository descriptors and the delete queue |
//! | [`JobQueue`] | Forced (re)index jobs for a single repository |
//! | [`IndexService`] | Full reindex trigger, per-repository index views and run history |
//! | [`DescriptorValidator`] | Business rules for new descriptors |
//! | [`AuditSink`] | One line per privileged command |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FileTree, IndexRun, ProjectStats, RepoDescriptor, ValidationOutcome};

/// Returned (inside `anyhow::Error`) by [`RepositoryStore::save`] when the
/// name is already taken.
#[derive(Debug, Error)]
#[error("repository name '{0}' is already in use")]
pub struct DuplicateName(pub String);

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the secret for `public_key`, or `None` if no such key exists.
    async fn resolve_secret(&self, public_key: &str) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<RepoDescriptor>>;

    async fn get_by_url(&self, url: &str) -> Result<Option<RepoDescriptor>>;

    async fn get_all(&self) -> Result<Vec<RepoDescriptor>>;

    /// Persists `repo`. An id of `-1` asks the store to assign one.
    ///
    /// Must fail with [`DuplicateName`] if another repository already uses
    /// the same name.
    async fn save(&self, repo: &RepoDescriptor) -> Result<()>;

    /// Records a persistent request to delete the named repository.
    ///
    /// Removal may happen later, on the store's own schedule.
    async fn queue_delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedules an index job for `repo`, bypassing any "recently indexed" check.
    async fn force_enqueue(&self, repo: &RepoDescriptor) -> Result<()>;
}

#[async_trait]
pub trait IndexService: Send + Sync {
    /// Discards the current index and records that a full reindex was
    /// requested. Scheduling the jobs is the caller's business.
    async fn reindex_all(&self) -> Result<()>;

    async fn project_stats(&self, name: &str) -> Result<ProjectStats>;

    async fn file_tree(&self, name: &str) -> Result<FileTree>;

    /// Job history for `name`, or `None` if it has never been indexed.
    async fn index_run(&self, name: &str) -> Result<Option<IndexRun>>;
}

pub trait DescriptorValidator: Send + Sync {
    fn validate(&self, repo: &RepoDescriptor) -> ValidationOutcome;
}

/// Receives audit lines. Logging must never fail a command.
pub trait AuditSink: Send + Sync {
    fn log(&self, message: &str);
}
