//! Canonical signing strings.
//!
//! A client signs the string `name1=value1&name2=value2...` built from a fixed,
//! command-specific parameter order. Values are form-urlencoded: ASCII
//! alphanumerics and `* - . _` pass through, a space becomes `+`, and every
//! other byte of the UTF-8 encoding becomes `%XX`.
//!
//! Some clients escape a space as `%20` instead of `+`. [`Canonical::percent20`]
//! yields that second form so the verifier can accept either.
//!
//! ```
//! use repo_gate_core::canonical::Canonical;
//!
//! let c = Canonical::build(&[("pub", "APIK-1"), ("reponame", "my repo")]);
//! assert_eq!(c.as_str(), "pub=APIK-1&reponame=my+repo");
//! assert_eq!(c.percent20(), "pub=APIK-1&reponame=my%20repo");
//! ```

use url::form_urlencoded::byte_serialize;

use crate::models::CommandParams;
use crate::validate::CommandSpec;

/// The exact string a client was expected to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical(String);

impl Canonical {
    /// Serializes `pairs` in the order given. Names are emitted verbatim.
    pub fn build(pairs: &[(&str, &str)]) -> Self {
        let joined = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, encode_value(value)))
            .collect::<Vec<_>>()
            .join("&");
        Canonical(joined)
    }

    /// Canonical string of `params` in the signing order of `spec`.
    ///
    /// Absent parameters contribute an empty value.
    pub fn for_command(spec: &CommandSpec, params: &CommandParams) -> Self {
        let pairs: Vec<(&str, &str)> = spec
            .signed_names()
            .map(|name| (name, params.get(name).unwrap_or("")))
            .collect();
        Self::build(&pairs)
    }

    /// The `+`-for-space form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same string with every literal `+` replaced by `%20`.
    ///
    /// A `+` inside a value is already `%2B` at this point, so only encoded
    /// spaces are affected.
    pub fn percent20(&self) -> String {
        self.0.replace('+', "%20")
    }
}

fn encode_value(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
