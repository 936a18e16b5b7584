//! Integration tests for the SQLite-backed collaborators.
//!
//! These run the real dispatcher against a temporary database to prove that
//! the repository lifecycle (add → list → delete → purge) and key management
//! work end-to-end.

use std::time::Duration;

use repo_gate::config::Config;
use repo_gate::server::build_services;
use repo_gate::sqlite_store::SqliteStore;
use repo_gate::{db, migrate};
use repo_gate_core::models::{ApiCredential, CommandParams, HmacAlgorithm, RepoDescriptor, RepoKind};
use repo_gate_core::signature::sign_command;
use repo_gate_core::store::{CredentialStore, DuplicateName, IndexService, RepositoryStore};
use repo_gate_core::validate::{ADD, DELETE, ENQUEUE, LIST, REINDEX_ALL};
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir, authentication: bool) -> Config {
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"

[api]
enabled = true
authentication = {}
"#,
        tmp.path().join("rgate.sqlite").display(),
        authentication
    );
    toml::from_str(&config_content).unwrap()
}

async fn open_store(cfg: &Config) -> SqliteStore {
    let pool = db::connect(cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn credential() -> ApiCredential {
    ApiCredential {
        public_key: "APIK-integration".to_string(),
        secret: b"APISK-integration".to_vec(),
    }
}

fn signed(spec: &repo_gate_core::validate::CommandSpec, params: CommandParams) -> CommandParams {
    let key = credential();
    sign_command(spec, params, &key.public_key, &key.secret, HmacAlgorithm::Sha512)
}

fn add_params(name: &str) -> CommandParams {
    CommandParams::new()
        .with("reponame", name)
        .with("repourl", format!("https://github.com/example/{}.git", name))
        .with("repotype", "GIT")
        .with("repousername", "reader")
        .with("repopassword", "s3cret")
        .with("reposource", "github mirror")
        .with("repobranch", "")
}

fn descriptor(name: &str) -> RepoDescriptor {
    RepoDescriptor {
        id: -1,
        name: name.to_string(),
        kind: RepoKind::Svn,
        url: format!("svn://svn.example.org/{}", name),
        username: String::new(),
        password: String::new(),
        source: String::new(),
        branch: "trunk".to_string(),
        extra_config: "{}".to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
}

#[tokio::test]
async fn test_store_enforces_unique_names() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    let store = open_store(&cfg).await;

    store.save(&descriptor("alpha")).await.unwrap();
    let err = store.save(&descriptor("alpha")).await.unwrap_err();
    assert!(err.downcast_ref::<DuplicateName>().is_some());

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].id > 0);
    assert_eq!(all[0].kind, RepoKind::Svn);

    let by_url = store
        .get_by_url("svn://svn.example.org/alpha")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_url.name, "alpha");
}

#[tokio::test]
async fn test_save_with_id_replaces() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    let store = open_store(&cfg).await;

    store.save(&descriptor("alpha")).await.unwrap();
    let mut existing = store.get_by_name("alpha").await.unwrap().unwrap();
    existing.branch = "release".to_string();
    store.save(&existing).await.unwrap();

    let reloaded = store.get_by_name("alpha").await.unwrap().unwrap();
    assert_eq!(reloaded.id, existing.id);
    assert_eq!(reloaded.branch, "release");
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_key_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    let store = open_store(&cfg).await;

    let key = store.create_key().await.unwrap();
    assert!(key.public_key.starts_with("APIK-"));
    assert!(String::from_utf8_lossy(&key.secret).starts_with("APISK-"));

    let resolved = store.resolve_secret(&key.public_key).await.unwrap();
    assert_eq!(resolved, Some(key.secret.clone()));

    assert!(store.delete_key(&key.public_key).await.unwrap());
    assert!(!store.delete_key(&key.public_key).await.unwrap());
    assert_eq!(store.resolve_secret(&key.public_key).await.unwrap(), None);
}

#[tokio::test]
async fn test_signed_lifecycle_against_sqlite() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    let services = build_services(&cfg).await.unwrap();
    services.store.insert_key(&credential()).await.unwrap();
    let dispatcher = services.dispatcher.clone();

    // add
    let result = dispatcher.add(&signed(&ADD, add_params("alpha"))).await;
    assert!(result.success, "{}", result.message);
    let stored = services.store.get_by_name("alpha").await.unwrap().unwrap();
    assert_eq!(stored.branch, "master");
    assert_eq!(stored.kind, RepoKind::Git);
    assert_eq!(stored.source, "github mirror");

    // add again
    let again = dispatcher.add(&signed(&ADD, add_params("alpha"))).await;
    assert_eq!(again.message, "repository name already exists");

    // list carries credentials, display lookup does not
    let list = dispatcher.list_all(&signed(&LIST, CommandParams::new())).await;
    let repos = list.payload.unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].password, "s3cret");
    let shown = dispatcher
        .repo_info(&CommandParams::new().with("reponame", "alpha"))
        .await
        .unwrap()
        .unwrap();
    assert!(shown.password.is_empty());
    assert!(shown.username.is_empty());

    // delete queues, purge removes
    let deleted = dispatcher
        .delete(&signed(&DELETE, CommandParams::new().with("reponame", "alpha")))
        .await;
    assert!(deleted.success);
    assert_eq!(services.store.queued_deletes().await.unwrap(), vec!["alpha"]);
    assert_eq!(services.store.process_delete_queue().await.unwrap(), 1);

    let gone = dispatcher
        .delete(&signed(&DELETE, CommandParams::new().with("reponame", "alpha")))
        .await;
    assert!(!gone.success);
    assert_eq!(gone.message, "repository already deleted");
}

#[tokio::test]
async fn test_enqueue_reaches_job_receiver() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, false);
    let mut services = build_services(&cfg).await.unwrap();

    assert!(services.dispatcher.add(&add_params("beta")).await.success);
    let url = "https://github.com/example/beta.git";
    let result = services
        .dispatcher
        .enqueue(&CommandParams::new().with("repoUrl", url))
        .await;
    assert!(result.success);

    let job = services.jobs.recv().await.unwrap();
    assert_eq!(job.repo.name, "beta");
    assert!(job.forced);

    let missing = services
        .dispatcher
        .enqueue(&signed(&ENQUEUE, CommandParams::new().with("repoUrl", "https://nope")))
        .await;
    assert!(!missing.success);
}

#[tokio::test]
async fn test_reindex_clears_index() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, true);
    let services = build_services(&cfg).await.unwrap();
    services.store.insert_key(&credential()).await.unwrap();

    let index = services.index.clone();
    index.record_file("alpha", "src/lib.rs").await.unwrap();
    index.record_file("alpha", "Cargo.toml").await.unwrap();
    index.record_file("alpha", "Cargo.toml").await.unwrap();

    let count = services
        .dispatcher
        .file_count(&CommandParams::new().with("reponame", "alpha"))
        .await
        .unwrap();
    assert_eq!(count, "2");
    let tree = index.file_tree("alpha").await.unwrap();
    assert_eq!(tree.paths, vec!["Cargo.toml", "src/lib.rs"]);

    let result = services
        .dispatcher
        .reindex_all(&signed(&REINDEX_ALL, CommandParams::new()))
        .await;
    assert!(result.success);
    assert_eq!(index.project_stats("alpha").await.unwrap().total_files, 0);
    assert!(index.reindex_requested_at().await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_lose_with_conflict() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, false);
    let services = build_services(&cfg).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let dispatcher = services.dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.add(&add_params("alpha")).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.success {
            wins += 1;
        } else {
            assert_eq!(result.message, "repository name already exists");
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(services.store.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_index_time_lookups() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, false);
    let services = build_services(&cfg).await.unwrap();
    assert!(services.dispatcher.add(&add_params("alpha")).await.success);

    let alpha = CommandParams::new().with("reponame", "alpha");
    assert_eq!(services.dispatcher.index_time(&alpha).await.unwrap(), "");
    assert_eq!(
        services
            .dispatcher
            .average_index_time_seconds(&alpha)
            .await
            .unwrap(),
        "1"
    );

    let finished = chrono::Utc::now() - chrono::Duration::hours(3);
    services
        .index
        .record_run("alpha", finished, Duration::from_secs(40))
        .await
        .unwrap();
    services
        .index
        .record_run("alpha", finished, Duration::from_secs(20))
        .await
        .unwrap();

    assert_eq!(
        services.dispatcher.index_time(&alpha).await.unwrap(),
        "3 hours ago"
    );
    assert_eq!(
        services
            .dispatcher
            .average_index_time_seconds(&alpha)
            .await
            .unwrap(),
        "31"
    );
    let run = services.index.index_run("alpha").await.unwrap().unwrap();
    assert_eq!(run.runs, 2);

    // Unknown names read as empty even if run history exists for them.
    services
        .index
        .record_run("ghost", finished, Duration::from_secs(5))
        .await
        .unwrap();
    let ghost = CommandParams::new().with("reponame", "ghost");
    assert_eq!(services.dispatcher.index_time(&ghost).await.unwrap(), "");
    assert_eq!(
        services
            .dispatcher
            .average_index_time_seconds(&ghost)
            .await
            .unwrap(),
        ""
    );

    // Purging the repository drops its run history.
    services.store.queue_delete("alpha").await.unwrap();
    assert_eq!(services.store.process_delete_queue().await.unwrap(), 1);
    assert!(services.index.index_run("alpha").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reindex_enqueues_every_repository() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, false);
    let mut services = build_services(&cfg).await.unwrap();
    assert!(services.dispatcher.add(&add_params("alpha")).await.success);
    assert!(services.dispatcher.add(&add_params("beta")).await.success);

    let result = services.dispatcher.reindex_all(&CommandParams::new()).await;
    assert!(result.success, "{}", result.message);

    let first = services.jobs.recv().await.unwrap();
    let second = services.jobs.recv().await.unwrap();
    assert_eq!(first.repo.name, "alpha");
    assert_eq!(second.repo.name, "beta");
}
