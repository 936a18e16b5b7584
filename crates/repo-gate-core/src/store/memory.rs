//! In-memory collaborator implementations for tests and embedders.
//!
//! Everything lives in `HashMap`/`Vec` behind `std::sync::RwLock` or `Mutex`.
//! Each type also exposes a few inspection helpers (recorded jobs, queued
//! deletes, audit lines) so callers can assert on side effects.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{FileTree, IndexRun, ProjectStats, RepoDescriptor, UNASSIGNED_ID};

use super::{AuditSink, CredentialStore, DuplicateName, IndexService, JobQueue, RepositoryStore};

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// Fixed set of public key → secret pairs.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, public_key: impl Into<String>, secret: impl Into<Vec<u8>>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(public_key.into(), secret.into());
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve_secret(&self, public_key: &str) -> Result<Option<Vec<u8>>> {
        let keys = self.keys.read().map_err(poisoned)?;
        Ok(keys.get(public_key).cloned())
    }
}

#[derive(Default)]
struct RepoTable {
    by_name: HashMap<String, RepoDescriptor>,
    next_id: i64,
    delete_queue: Vec<String>,
}

/// Repository store keyed by name. `save` rejects duplicate names.
///
/// `queue_delete` only records the request; call
/// [`process_deletes`](InMemoryRepoStore::process_deletes) to apply it.
#[derive(Default)]
pub struct InMemoryRepoStore {
    table: RwLock<RepoTable>,
}

impl InMemoryRepoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names queued for deletion and not yet processed, oldest first.
    pub fn queued_deletes(&self) -> Vec<String> {
        self.table
            .read()
            .map(|t| t.delete_queue.clone())
            .unwrap_or_default()
    }

    /// Removes every queued repository. Returns how many were removed.
    pub fn process_deletes(&self) -> Result<usize> {
        let mut table = self.table.write().map_err(poisoned)?;
        let queued = std::mem::take(&mut table.delete_queue);
        let mut removed = 0;
        for name in queued {
            if table.by_name.remove(&name).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.by_name.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RepositoryStore for InMemoryRepoStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<RepoDescriptor>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.by_name.get(name).cloned())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<RepoDescriptor>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.by_name.values().find(|r| r.url == url).cloned())
    }

    async fn get_all(&self) -> Result<Vec<RepoDescriptor>> {
        let table = self.table.read().map_err(poisoned)?;
        let mut all: Vec<RepoDescriptor> = table.by_name.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save(&self, repo: &RepoDescriptor) -> Result<()> {
        let mut table = self.table.write().map_err(poisoned)?;
        let mut stored = repo.clone();
        if stored.id == UNASSIGNED_ID {
            if table.by_name.contains_key(&stored.name) {
                return Err(DuplicateName(stored.name).into());
            }
            table.next_id += 1;
            stored.id = table.next_id;
        }
        table.by_name.insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn queue_delete(&self, name: &str) -> Result<()> {
        let mut table = self.table.write().map_err(poisoned)?;
        table.delete_queue.push(name.to_string());
        Ok(())
    }
}

/// Job queue that records every forced job instead of running it.
#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<RepoDescriptor>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<RepoDescriptor> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn force_enqueue(&self, repo: &RepoDescriptor) -> Result<()> {
        self.jobs.lock().map_err(poisoned)?.push(repo.clone());
        Ok(())
    }
}

/// Index holding file paths and run history per repository name.
#[derive(Default)]
pub struct InMemoryIndex {
    files: RwLock<HashMap<String, Vec<String>>>,
    runs: RwLock<HashMap<String, (DateTime<Utc>, u64, u64)>>,
    reindex_count: Mutex<usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, repo: &str, path: &str) {
        if let Ok(mut files) = self.files.write() {
            files
                .entry(repo.to_string())
                .or_default()
                .push(path.to_string());
        }
    }

    /// Records one finished index job that took `seconds`.
    pub fn record_run(&self, repo: &str, finished_at: DateTime<Utc>, seconds: u64) {
        if let Ok(mut runs) = self.runs.write() {
            let entry = runs.entry(repo.to_string()).or_insert((finished_at, 0, 0));
            entry.0 = finished_at;
            entry.1 += 1;
            entry.2 += seconds;
        }
    }

    pub fn reindex_count(&self) -> usize {
        self.reindex_count.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl IndexService for InMemoryIndex {
    async fn reindex_all(&self) -> Result<()> {
        self.files.write().map_err(poisoned)?.clear();
        *self.reindex_count.lock().map_err(poisoned)? += 1;
        Ok(())
    }

    async fn project_stats(&self, name: &str) -> Result<ProjectStats> {
        let files = self.files.read().map_err(poisoned)?;
        Ok(ProjectStats {
            name: name.to_string(),
            total_files: files.get(name).map_or(0, |f| f.len() as u64),
        })
    }

    async fn file_tree(&self, name: &str) -> Result<FileTree> {
        let files = self.files.read().map_err(poisoned)?;
        let mut paths = files.get(name).cloned().unwrap_or_default();
        paths.sort();
        Ok(FileTree {
            name: name.to_string(),
            paths,
        })
    }

    async fn index_run(&self, name: &str) -> Result<Option<IndexRun>> {
        let runs = self.runs.read().map_err(poisoned)?;
        Ok(runs.get(name).map(|&(last_run_at, count, total)| IndexRun {
            name: name.to_string(),
            last_run_at,
            runs: count,
            average_seconds: total / count.max(1),
        }))
    }
}

/// Audit sink that keeps every line in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}
