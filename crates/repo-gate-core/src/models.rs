//! Core data models shared by the gate, the dispatcher, and every collaborator.
//!
//! These types describe tracked repositories, API credentials, and the
//! uniform response shape returned by each command.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id carried by a descriptor that has not been persisted yet.
pub const UNASSIGNED_ID: i64 = -1;

/// Branch used when a caller supplies a blank branch name.
pub const DEFAULT_BRANCH: &str = "master";

/// A public key and the shared secret it signs with.
///
/// Issued once and never mutated. Looked up by `public_key` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredential {
    pub public_key: String,
    pub secret: Vec<u8>,
}

/// Hash primitive used for the HMAC signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HmacAlgorithm {
    #[default]
    Sha1,
    Sha512,
}

impl HmacAlgorithm {
    /// Resolves the caller-supplied `hmac` token.
    ///
    /// `"sha512"` (any ASCII case) selects SHA-512. Every other value,
    /// including a missing one, selects SHA-1.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(t) if t.eq_ignore_ascii_case("sha512") => HmacAlgorithm::Sha512,
            _ => HmacAlgorithm::Sha1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HmacAlgorithm::Sha1 => "sha1",
            HmacAlgorithm::Sha512 => "sha512",
        }
    }
}

/// Version control flavour of a tracked repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    #[default]
    Git,
    Svn,
    File,
}

impl RepoKind {
    /// Trims and lowercases `token`; anything unrecognized becomes [`RepoKind::Git`].
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "svn" => RepoKind::Svn,
            "file" => RepoKind::File,
            _ => RepoKind::Git,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Git => "git",
            RepoKind::Svn => "svn",
            RepoKind::File => "file",
        }
    }
}

/// Persisted record describing one tracked repository.
///
/// Never mutated in place: changes go through the store as a replace or a
/// queued delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub id: i64,
    pub name: String,
    pub kind: RepoKind,
    pub url: String,
    pub username: String,
    pub password: String,
    pub source: String,
    pub branch: String,
    pub extra_config: String,
}

impl RepoDescriptor {
    /// Copy of this descriptor with the username and password cleared, for
    /// display-facing lookups.
    pub fn redacted(&self) -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            ..self.clone()
        }
    }
}

/// Result of a field or business-rule check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: String,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Uniform response shape of every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult<T = ()> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> CommandResult<T> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
        }
    }
}

/// File statistics for one indexed repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub name: String,
    pub total_files: u64,
}

/// Sorted list of indexed file paths for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    pub name: String,
    pub paths: Vec<String>,
}

/// Index job history for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRun {
    pub name: String,
    /// When the most recent index job finished.
    pub last_run_at: DateTime<Utc>,
    pub runs: u64,
    /// Mean duration of all recorded runs, in whole seconds.
    pub average_seconds: u64,
}

/// Coarse "how long ago" text for display, e.g. `3 hours ago`.
///
/// Times in the future read as `just now`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - then).num_seconds();

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        plural(delta / 60, "minute")
    } else if delta < 86400 {
        plural(delta / 3600, "hour")
    } else if delta < 86400 * 30 {
        plural(delta / 86400, "day")
    } else if delta < 86400 * 365 {
        plural(delta / (86400 * 30), "month")
    } else {
        plural(delta / (86400 * 365), "year")
    }
}

fn plural(amount: i64, unit: &str) -> String {
    format!("{} {}{} ago", amount, unit, if amount == 1 { "" } else { "s" })
}

/// The flat set of named query parameters carried by one inbound command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandParams(HashMap<String, String>);

impl CommandParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and the CLI.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the value only if it is present and not blank after trimming.
    pub fn non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }
}

impl From<HashMap<String, String>> for CommandParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CommandParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_token_defaults_to_sha1() {
        assert_eq!(HmacAlgorithm::from_token(None), HmacAlgorithm::Sha1);
        assert_eq!(HmacAlgorithm::from_token(Some("")), HmacAlgorithm::Sha1);
        assert_eq!(HmacAlgorithm::from_token(Some("md5")), HmacAlgorithm::Sha1);
        assert_eq!(HmacAlgorithm::from_token(Some("sha256")), HmacAlgorithm::Sha1);
    }

    #[test]
    fn test_hmac_token_case_insensitive() {
        assert_eq!(
            HmacAlgorithm::from_token(Some("SHA512")),
            HmacAlgorithm::Sha512
        );
        assert_eq!(
            HmacAlgorithm::from_token(Some("Sha512")),
            HmacAlgorithm::Sha512
        );
    }

    #[test]
    fn test_repo_kind_normalization() {
        assert_eq!(RepoKind::from_token(" SVN "), RepoKind::Svn);
        assert_eq!(RepoKind::from_token("file"), RepoKind::File);
        assert_eq!(RepoKind::from_token("Mercurial"), RepoKind::Git);
        assert_eq!(RepoKind::from_token(""), RepoKind::Git);
    }

    #[test]
    fn test_redacted_strips_credentials_only() {
        let repo = RepoDescriptor {
            id: 7,
            name: "alpha".into(),
            kind: RepoKind::Git,
            url: "https://example.com/alpha.git".into(),
            username: "bob".into(),
            password: "hunter2".into(),
            source: "upstream".into(),
            branch: "main".into(),
            extra_config: "{}".into(),
        };
        let shown = repo.redacted();
        assert!(shown.username.is_empty());
        assert!(shown.password.is_empty());
        assert_eq!(shown.name, "alpha");
        assert_eq!(shown.url, repo.url);
    }

    #[test]
    fn test_time_ago_buckets() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ago = |secs: i64| time_ago(now - chrono::Duration::seconds(secs), now);

        assert_eq!(ago(0), "just now");
        assert_eq!(ago(-30), "just now");
        assert_eq!(ago(59), "just now");
        assert_eq!(ago(60), "1 minute ago");
        assert_eq!(ago(5 * 60 + 10), "5 minutes ago");
        assert_eq!(ago(3_600), "1 hour ago");
        assert_eq!(ago(2 * 86_400), "2 days ago");
        assert_eq!(ago(45 * 86_400), "1 month ago");
        assert_eq!(ago(800 * 86_400), "2 years ago");
    }

    #[test]
    fn test_command_result_omits_missing_payload() {
        let result: CommandResult = CommandResult::failure("API not enabled");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "message": "API not enabled" })
        );
    }
}
