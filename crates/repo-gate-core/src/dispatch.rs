//! Command dispatcher: the gate sequence for every repository command.
//!
//! Each command runs the same linear pipeline and stops at the first failure:
//!
//! ```text
//! enabled? → pub/sig present? → secret lookup → verify ("+" form)
//!          → verify ("%20" form) → field validation → business rule
//!          → collaborator mutation → audit → CommandResult
//! ```
//!
//! The auth stages are skipped when [`ApiSettings::authentication`] is off.
//! Failures are returned as `CommandResult { success: false, .. }`; nothing
//! crosses this boundary as an error.
//!
//! Audit lines are only written while authentication is on: one per command
//! that reached the secret lookup.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use crate::canonical::Canonical;
use crate::error::CommandError;
use crate::models::{
    time_ago, CommandParams, CommandResult, FileTree, HmacAlgorithm, RepoDescriptor, RepoKind,
    UNASSIGNED_ID,
};
use crate::signature::verify;
use crate::store::{
    AuditSink, CredentialStore, DescriptorValidator, DuplicateName, IndexService, JobQueue,
    RepositoryStore,
};
use crate::validate::{
    validate_fields, CommandSpec, ValidatedFields, ADD, DELETE, ENQUEUE, HMAC_PARAM, LIST,
    PUBLIC_KEY_PARAM, REINDEX_ALL, SIGNATURE_PARAM,
};

/// Display lookups read the repository name from this parameter.
pub const REPO_NAME_PARAM: &str = "reponame";

/// Immutable feature toggles, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSettings {
    /// When off, every command answers "API not enabled".
    pub enabled: bool,
    /// When off, the signature gate is skipped; validation still runs.
    pub authentication: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            authentication: true,
        }
    }
}

/// Everything the dispatcher talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialStore>,
    pub repos: Arc<dyn RepositoryStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub index: Arc<dyn IndexService>,
    pub validator: Arc<dyn DescriptorValidator>,
    pub audit: Arc<dyn AuditSink>,
}

/// Authenticates, validates, and executes repository commands.
///
/// Stateless between calls; safe to share behind an `Arc` and call
/// concurrently.
pub struct CommandDispatcher {
    settings: ApiSettings,
    deps: Collaborators,
}

/// What the gate hands to a command body once it has been admitted.
struct Admission {
    /// Authenticated public key; `None` when authentication is disabled.
    caller: Option<String>,
    fields: ValidatedFields,
}

impl CommandDispatcher {
    pub fn new(settings: ApiSettings, deps: Collaborators) -> Self {
        Self { settings, deps }
    }

    pub fn settings(&self) -> ApiSettings {
        self.settings
    }

    /// Clears the index and forces an index job for every repository.
    pub async fn reindex_all(&self, params: &CommandParams) -> CommandResult {
        self.run(&REINDEX_ALL, params, |_| async move {
            self.deps
                .index
                .reindex_all()
                .await
                .map_err(CommandError::Operational)?;
            let repos = self
                .deps
                .repos
                .get_all()
                .await
                .map_err(CommandError::Operational)?;
            for repo in &repos {
                self.deps
                    .jobs
                    .force_enqueue(repo)
                    .await
                    .map_err(CommandError::Operational)?;
            }
            Ok(CommandResult::ok("reindex forced"))
        })
        .await
    }

    /// Forces an index job for the repository registered under `repoUrl`.
    pub async fn enqueue(&self, params: &CommandParams) -> CommandResult {
        self.run(&ENQUEUE, params, |fields| async move {
            let url = fields.value("repoUrl");
            let repo = self
                .deps
                .repos
                .get_by_url(url)
                .await
                .map_err(CommandError::Operational)?
                .ok_or_else(|| {
                    CommandError::NotFound(format!("Was unable to find repository {}", url))
                })?;
            self.deps
                .jobs
                .force_enqueue(&repo)
                .await
                .map_err(CommandError::Operational)?;
            Ok(CommandResult::ok(format!("Enqueued repository {}", url)))
        })
        .await
    }

    /// Returns every stored descriptor exactly as the store returns it.
    pub async fn list_all(&self, params: &CommandParams) -> CommandResult<Vec<RepoDescriptor>> {
        self.run(&LIST, params, |_| async move {
            let repos = self
                .deps
                .repos
                .get_all()
                .await
                .map_err(CommandError::Operational)?;
            Ok(CommandResult::ok_with("", repos))
        })
        .await
    }

    /// Queues the named repository for deletion.
    ///
    /// Deleting a name that does not resolve reports "repository already
    /// deleted" so clients can safely retry.
    pub async fn delete(&self, params: &CommandParams) -> CommandResult {
        self.run(&DELETE, params, |fields| async move {
            let name = fields.value("reponame");
            let existing = self
                .deps
                .repos
                .get_by_name(name)
                .await
                .map_err(CommandError::Operational)?;
            let Some(repo) = existing else {
                return Err(CommandError::NotFound(
                    "repository already deleted".to_string(),
                ));
            };
            self.deps
                .repos
                .queue_delete(&repo.name)
                .await
                .map_err(CommandError::Operational)?;
            Ok(CommandResult::ok("repository queued for deletion"))
        })
        .await
    }

    /// Registers a new repository.
    pub async fn add(&self, params: &CommandParams) -> CommandResult {
        self.run(&ADD, params, |fields| async move {
            let name = fields.value("reponame");
            let existing = self
                .deps
                .repos
                .get_by_name(name)
                .await
                .map_err(CommandError::Operational)?;
            if existing.is_some() {
                return Err(CommandError::Conflict(
                    "repository name already exists".to_string(),
                ));
            }

            let repo = RepoDescriptor {
                id: UNASSIGNED_ID,
                name: name.to_string(),
                kind: RepoKind::from_token(fields.value("repotype")),
                url: fields.value("repourl").to_string(),
                username: fields.value("repousername").to_string(),
                password: fields.value("repopassword").to_string(),
                source: fields.value("reposource").to_string(),
                branch: fields.value("repobranch").to_string(),
                extra_config: "{}".to_string(),
            };

            let outcome = self.deps.validator.validate(&repo);
            if !outcome.valid {
                return Err(CommandError::ValidationFailed(outcome.reason));
            }

            // A concurrent add can still win between the lookup and the save.
            self.deps.repos.save(&repo).await.map_err(|err| {
                if err.downcast_ref::<DuplicateName>().is_some() {
                    CommandError::Conflict("repository name already exists".to_string())
                } else {
                    CommandError::Operational(err)
                }
            })?;
            Ok(CommandResult::ok("added repository successfully"))
        })
        .await
    }

    // ── display lookups ────────────────────────────────────────────────

    /// Single-repository lookup for display, with credentials stripped.
    ///
    /// Not gated by the API toggle or by authentication.
    pub async fn repo_info(&self, params: &CommandParams) -> Result<Option<RepoDescriptor>> {
        let Some(name) = params.get(REPO_NAME_PARAM) else {
            return Ok(None);
        };
        let repo = self.deps.repos.get_by_name(name).await?;
        Ok(repo.map(|r| r.redacted()))
    }

    /// Number of indexed files as text; empty when no name was given.
    pub async fn file_count(&self, params: &CommandParams) -> Result<String> {
        let Some(name) = params.get(REPO_NAME_PARAM) else {
            return Ok(String::new());
        };
        let stats = self.deps.index.project_stats(name).await?;
        Ok(stats.total_files.to_string())
    }

    pub async fn file_tree(&self, params: &CommandParams) -> Result<Option<FileTree>> {
        match params.get(REPO_NAME_PARAM) {
            Some(name) => Ok(Some(self.deps.index.file_tree(name).await?)),
            None => Ok(None),
        }
    }

    /// When the repository was last indexed, as "how long ago" text.
    ///
    /// Empty when no name was given, the name is unknown, or the repository
    /// has never been indexed.
    pub async fn index_time(&self, params: &CommandParams) -> Result<String> {
        let Some(repo) = self.known_repo(params).await? else {
            return Ok(String::new());
        };
        let run = self.deps.index.index_run(&repo.name).await?;
        Ok(run
            .map(|r| time_ago(r.last_run_at, Utc::now()))
            .unwrap_or_default())
    }

    /// Average index duration plus one second, as text.
    ///
    /// Empty when no name was given or the name is unknown. A repository that
    /// has never been indexed reports `1`.
    pub async fn average_index_time_seconds(&self, params: &CommandParams) -> Result<String> {
        let Some(repo) = self.known_repo(params).await? else {
            return Ok(String::new());
        };
        let average = self
            .deps
            .index
            .index_run(&repo.name)
            .await?
            .map_or(0, |r| r.average_seconds);
        Ok((average + 1).to_string())
    }

    async fn known_repo(&self, params: &CommandParams) -> Result<Option<RepoDescriptor>> {
        match params.get(REPO_NAME_PARAM) {
            Some(name) => self.deps.repos.get_by_name(name).await,
            None => Ok(None),
        }
    }

    // ── gate ───────────────────────────────────────────────────────────

    async fn run<T, F, Fut>(
        &self,
        spec: &CommandSpec,
        params: &CommandParams,
        body: F,
    ) -> CommandResult<T>
    where
        F: FnOnce(ValidatedFields) -> Fut,
        Fut: Future<Output = Result<CommandResult<T>, CommandError>>,
    {
        let admission = match self.admit(spec, params).await {
            Ok(admission) => admission,
            Err(err) => return err.into(),
        };
        let caller = admission.caller;
        let outcome = body(admission.fields).await;
        self.conclude(spec, caller.as_deref(), outcome)
    }

    async fn admit(
        &self,
        spec: &CommandSpec,
        params: &CommandParams,
    ) -> Result<Admission, CommandError> {
        if !self.settings.enabled {
            return Err(CommandError::Disabled);
        }
        let caller = if self.settings.authentication {
            Some(self.authenticate(spec, params).await?)
        } else {
            None
        };
        match validate_fields(spec, params) {
            Ok(fields) => Ok(Admission { caller, fields }),
            Err(err) => {
                if let Some(public_key) = caller.as_deref() {
                    self.audit_rejected(spec, public_key, &err);
                }
                Err(err)
            }
        }
    }

    /// Returns the authenticated public key.
    async fn authenticate(
        &self,
        spec: &CommandSpec,
        params: &CommandParams,
    ) -> Result<String, CommandError> {
        let public_key = params
            .non_blank(PUBLIC_KEY_PARAM)
            .ok_or(CommandError::MissingParameter(PUBLIC_KEY_PARAM))?;
        let signature = params
            .non_blank(SIGNATURE_PARAM)
            .ok_or(CommandError::MissingParameter(SIGNATURE_PARAM))?;
        let algorithm = HmacAlgorithm::from_token(params.get(HMAC_PARAM));

        let secret = match self.deps.credentials.resolve_secret(public_key).await {
            Ok(secret) => secret,
            Err(source) => {
                let err = CommandError::Operational(source);
                self.audit_rejected(spec, public_key, &err);
                return Err(err);
            }
        };

        // Unknown keys go through the same comparisons as known ones.
        let known = secret.is_some();
        let secret = secret.unwrap_or_default();
        let canonical = Canonical::for_command(spec, params);
        let authentic = verify(canonical.as_str(), signature, &secret, algorithm)
            || verify(&canonical.percent20(), signature, &secret, algorithm);

        if !(known && authentic) {
            self.deps.audit.log(&format!(
                "Invalid signed {} API call using publicKey={}",
                spec.name, public_key
            ));
            return Err(CommandError::AuthenticationFailed);
        }
        Ok(public_key.to_string())
    }

    fn conclude<T>(
        &self,
        spec: &CommandSpec,
        caller: Option<&str>,
        outcome: Result<CommandResult<T>, CommandError>,
    ) -> CommandResult<T> {
        match outcome {
            Ok(result) => {
                if let Some(public_key) = caller {
                    self.deps.audit.log(&format!(
                        "Valid signed {} API call using publicKey={}",
                        spec.name, public_key
                    ));
                }
                result
            }
            Err(err) => {
                match caller {
                    Some(public_key) => self.audit_rejected(spec, public_key, &err),
                    None => log_operational(spec, &err),
                }
                err.into()
            }
        }
    }

    fn audit_rejected(&self, spec: &CommandSpec, public_key: &str, err: &CommandError) {
        log_operational(spec, err);
        self.deps.audit.log(&format!(
            "Rejected signed {} API call using publicKey={}: {}",
            spec.name, public_key, err
        ));
    }
}

fn log_operational(spec: &CommandSpec, err: &CommandError) {
    if let CommandError::Operational(source) = err {
        tracing::error!(command = spec.name, error = ?source, "collaborator failure");
    }
}
