//! Field validation and descriptor business rules.
//!
//! Every command is described by one [`CommandSpec`]: its audit name plus an
//! ordered table of [`FieldRule`]s. The same table drives two things:
//!
//! - the canonical signing order (`pub` followed by the fields, in table order);
//! - [`validate_fields`], which checks presence and applies normalization.
//!
//! Validation fails fast on the first violation.

use std::collections::HashMap;

use url::Url;

use crate::error::CommandError;
use crate::models::{CommandParams, RepoDescriptor, RepoKind, ValidationOutcome, DEFAULT_BRANCH};
use crate::store::DescriptorValidator;

/// Name of the public key parameter. Always first in the canonical string.
pub const PUBLIC_KEY_PARAM: &str = "pub";
pub const SIGNATURE_PARAM: &str = "sig";
pub const HMAC_PARAM: &str = "hmac";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be present and not blank after trimming.
    NonBlank,
    /// Must be present; the empty string is accepted.
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    Verbatim,
    /// Trim, lowercase, unknown kinds become `git`.
    RepoKind,
    /// Blank becomes [`DEFAULT_BRANCH`].
    Branch,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub presence: Presence,
    pub normalize: Normalize,
}

impl FieldRule {
    const fn non_blank(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::NonBlank,
            normalize: Normalize::Verbatim,
        }
    }

    const fn present(name: &'static str, normalize: Normalize) -> Self {
        Self {
            name,
            presence: Presence::Present,
            normalize,
        }
    }
}

#[derive(Debug)]
pub struct CommandSpec {
    /// Name used in audit lines.
    pub name: &'static str,
    pub fields: &'static [FieldRule],
}

impl CommandSpec {
    /// Parameter names in canonical signing order.
    pub fn signed_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(PUBLIC_KEY_PARAM).chain(self.fields.iter().map(|f| f.name))
    }
}

pub static REINDEX_ALL: CommandSpec = CommandSpec {
    name: "repositoryReindex",
    fields: &[],
};

pub static ENQUEUE: CommandSpec = CommandSpec {
    name: "repositoryIndex",
    fields: &[FieldRule::non_blank("repoUrl")],
};

pub static LIST: CommandSpec = CommandSpec {
    name: "repoList",
    fields: &[],
};

pub static DELETE: CommandSpec = CommandSpec {
    name: "repoDelete",
    fields: &[FieldRule::non_blank("reponame")],
};

pub static ADD: CommandSpec = CommandSpec {
    name: "repoAdd",
    fields: &[
        FieldRule::non_blank("reponame"),
        FieldRule::non_blank("repourl"),
        FieldRule::present("repotype", Normalize::RepoKind),
        FieldRule::present("repousername", Normalize::Verbatim),
        FieldRule::present("repopassword", Normalize::Verbatim),
        FieldRule::present("reposource", Normalize::Verbatim),
        FieldRule::present("repobranch", Normalize::Branch),
    ],
};

/// Normalized field values that passed [`validate_fields`].
#[derive(Debug, Clone, Default)]
pub struct ValidatedFields(HashMap<&'static str, String>);

impl ValidatedFields {
    /// Value of a field declared in the command's table. Undeclared names read as `""`.
    pub fn value(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Checks `params` against `spec` and returns the normalized values.
pub fn validate_fields(
    spec: &CommandSpec,
    params: &CommandParams,
) -> Result<ValidatedFields, CommandError> {
    let mut out = HashMap::with_capacity(spec.fields.len());
    for rule in spec.fields {
        let raw = match rule.presence {
            Presence::NonBlank => params.non_blank(rule.name),
            Presence::Present => params.get(rule.name),
        }
        .ok_or(CommandError::MissingParameter(rule.name))?;

        let value = match rule.normalize {
            Normalize::Verbatim => raw.to_string(),
            Normalize::RepoKind => RepoKind::from_token(raw).as_str().to_string(),
            Normalize::Branch if raw.trim().is_empty() => DEFAULT_BRANCH.to_string(),
            Normalize::Branch => raw.to_string(),
        };
        out.insert(rule.name, value);
    }
    Ok(ValidatedFields(out))
}

/// Descriptor-level rules applied before a new repository is saved.
///
/// - names may only contain ASCII alphanumerics, `-`, `_` and `.`;
/// - git and svn urls must be absolute urls or scp-style `user@host:path`;
/// - a password requires a username.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDescriptorValidator;

impl DescriptorValidator for DefaultDescriptorValidator {
    fn validate(&self, repo: &RepoDescriptor) -> ValidationOutcome {
        if repo.name.trim().is_empty() {
            return ValidationOutcome::rejected("Repository name cannot be empty");
        }
        if !repo
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return ValidationOutcome::rejected(
                "Repository name must only contain alphanumeric characters, dashes, underscores or dots",
            );
        }
        if repo.url.trim().is_empty() {
            return ValidationOutcome::rejected("Repository location cannot be empty");
        }
        if matches!(repo.kind, RepoKind::Git | RepoKind::Svn) && !is_remote_location(&repo.url) {
            return ValidationOutcome::rejected(format!(
                "Repository location is not a valid {} url",
                repo.kind.as_str()
            ));
        }
        if repo.username.trim().is_empty() && !repo.password.is_empty() {
            return ValidationOutcome::rejected("A password was supplied without a username");
        }
        ValidationOutcome::ok()
    }
}

fn is_remote_location(location: &str) -> bool {
    if Url::parse(location).is_ok() {
        return true;
    }
    // scp-like syntax: git@github.com:owner/repo.git
    match location.split_once(':') {
        Some((user_host, path)) => {
            !path.is_empty() && user_host.contains('@') && !user_host.contains('/')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_params() -> CommandParams {
        CommandParams::new()
            .with("reponame", "alpha")
            .with("repourl", "https://github.com/boyter/alpha.git")
            .with("repotype", "git")
            .with("repousername", "")
            .with("repopassword", "")
            .with("reposource", "github")
            .with("repobranch", "main")
    }

    fn descriptor(name: &str, kind: RepoKind, url: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: -1,
            name: name.into(),
            kind,
            url: url.into(),
            username: String::new(),
            password: String::new(),
            source: String::new(),
            branch: "master".into(),
            extra_config: "{}".into(),
        }
    }

    #[test]
    fn test_signed_names_order() {
        let names: Vec<_> = ADD.signed_names().collect();
        assert_eq!(
            names,
            vec![
                "pub",
                "reponame",
                "repourl",
                "repotype",
                "repousername",
                "repopassword",
                "reposource",
                "repobranch"
            ]
        );
        assert_eq!(LIST.signed_names().collect::<Vec<_>>(), vec!["pub"]);
    }

    #[test]
    fn test_add_happy_path() {
        let fields = validate_fields(&ADD, &add_params()).unwrap();
        assert_eq!(fields.value("reponame"), "alpha");
        assert_eq!(fields.value("repobranch"), "main");
        assert_eq!(fields.value("repotype"), "git");
    }

    #[test]
    fn test_blank_branch_defaults_to_master() {
        let params = add_params().with("repobranch", "   ");
        let fields = validate_fields(&ADD, &params).unwrap();
        assert_eq!(fields.value("repobranch"), "master");
    }

    #[test]
    fn test_repotype_normalized() {
        let params = add_params().with("repotype", " SVN ");
        assert_eq!(validate_fields(&ADD, &params).unwrap().value("repotype"), "svn");

        let params = add_params().with("repotype", "Mercurial");
        assert_eq!(validate_fields(&ADD, &params).unwrap().value("repotype"), "git");
    }

    #[test]
    fn test_first_missing_field_reported() {
        let params = CommandParams::new().with("reponame", "alpha");
        let err = validate_fields(&ADD, &params).unwrap_err();
        assert_eq!(err.to_string(), "repourl is a required parameter");
    }

    #[test]
    fn test_blank_reponame_rejected_but_blank_username_accepted() {
        let params = add_params().with("reponame", "  ");
        let err = validate_fields(&ADD, &params).unwrap_err();
        assert_eq!(err.to_string(), "reponame is a required parameter");

        let params = add_params().with("repousername", "");
        assert!(validate_fields(&ADD, &params).is_ok());
    }

    #[test]
    fn test_present_fields_must_exist() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert("reponame".into(), "alpha".into());
        map.insert("repourl".into(), "https://example.com/a.git".into());
        map.insert("repotype".into(), "git".into());
        let err = validate_fields(&ADD, &CommandParams::from(map)).unwrap_err();
        assert_eq!(err.to_string(), "repousername is a required parameter");
    }

    #[test]
    fn test_commands_without_fields_always_pass() {
        assert!(validate_fields(&LIST, &CommandParams::new()).is_ok());
        assert!(validate_fields(&REINDEX_ALL, &CommandParams::new()).is_ok());
    }

    #[test]
    fn test_default_validator_accepts_common_locations() {
        let v = DefaultDescriptorValidator;
        assert!(v.validate(&descriptor("alpha", RepoKind::Git, "https://github.com/a/b.git")).valid);
        assert!(v.validate(&descriptor("alpha", RepoKind::Git, "git@github.com:a/b.git")).valid);
        assert!(v.validate(&descriptor("alpha", RepoKind::Svn, "svn://svn.example.org/repo")).valid);
        assert!(v.validate(&descriptor("alpha", RepoKind::File, "/srv/code/alpha")).valid);
    }

    #[test]
    fn test_default_validator_rejections() {
        let v = DefaultDescriptorValidator;
        assert!(!v.validate(&descriptor("bad name", RepoKind::Git, "https://x.org/a")).valid);
        assert!(!v.validate(&descriptor("alpha", RepoKind::Git, "not a url")).valid);

        let mut repo = descriptor("alpha", RepoKind::Git, "https://x.org/a");
        repo.password = "secret".into();
        let outcome = v.validate(&repo);
        assert!(!outcome.valid);
        assert!(outcome.reason.contains("username"));
    }
}
