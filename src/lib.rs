//! # Repo Gate
//!
//! A signed-command management API for tracked code repositories.
//!
//! Callers submit URL-borne commands (reindex, enqueue, list, delete, add).
//! Each one is authenticated with a shared-secret HMAC over a canonical query
//! string before it may touch the repository store, the job queue, or the
//! index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │   HTTP   │──▶│    CommandDispatcher     │──▶│ SQLite store │
//! │  (axum)  │   │ flag → auth → validate   │   │ repos / keys │
//! └──────────┘   │ → business rule → audit  │   └──────────────┘
//!                └──────┬──────────┬────────┘
//!                       ▼          ▼
//!                ┌──────────┐ ┌──────────┐
//!                │ job queue│ │  index   │
//!                └──────────┘ └──────────┘
//! ```
//!
//! The gate itself lives in [`repo_gate_core`]; this crate supplies the
//! configuration, persistence, queue, audit, HTTP, and CLI around it.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Schema migrations (idempotent) |
//! | [`sqlite_store`] | Repository and credential stores, persistent delete queue |
//! | [`index`] | Indexed-file bookkeeping and full reindex trigger |
//! | [`queue`] | Bounded in-process job queue |
//! | [`audit`] | Audit sinks (tracing, append-only file) |
//! | [`server`] | HTTP API (Axum) |

pub mod audit;
pub mod config;
pub mod db;
pub mod index;
pub mod migrate;
pub mod queue;
pub mod server;
pub mod sqlite_store;
