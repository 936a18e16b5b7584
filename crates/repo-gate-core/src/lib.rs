//! # Repo Gate Core
//!
//! Signed-command authentication and repository lifecycle dispatch, with no
//! runtime, database, or filesystem dependencies.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Descriptors, credentials, `CommandResult`, `CommandParams` |
//! | [`canonical`] | Canonical signing strings and the `%20` alternate form |
//! | [`signature`] | HMAC-SHA1/SHA512 signing and constant-time verification |
//! | [`validate`] | Per-command field tables and descriptor business rules |
//! | [`dispatch`] | The gate sequence for every command |
//! | [`store`] | Collaborator traits and in-memory implementations |
//! | [`error`] | Command failure taxonomy |

pub mod canonical;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod signature;
pub mod store;
pub mod validate;

pub use dispatch::{ApiSettings, Collaborators, CommandDispatcher};
pub use error::CommandError;
pub use models::{CommandParams, CommandResult, HmacAlgorithm, RepoDescriptor, RepoKind};
