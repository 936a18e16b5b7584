use thiserror::Error;

use crate::models::CommandResult;

/// Why a command was turned away.
///
/// The `Display` text is the exact `message` returned to the caller, so
/// variants must never carry secrets, signatures, or collaborator internals.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("API not enabled")]
    Disabled,

    #[error("{0} is a required parameter")]
    MissingParameter(&'static str),

    /// Bad signature or unknown public key. The two are indistinguishable.
    #[error("invalid signed url")]
    AuthenticationFailed,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("unable to process request")]
    Operational(#[source] anyhow::Error),
}

impl<T> From<CommandError> for CommandResult<T> {
    fn from(err: CommandError) -> Self {
        CommandResult::failure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(CommandError::Disabled.to_string(), "API not enabled");
        assert_eq!(
            CommandError::MissingParameter("sig").to_string(),
            "sig is a required parameter"
        );
        assert_eq!(
            CommandError::AuthenticationFailed.to_string(),
            "invalid signed url"
        );
    }

    #[test]
    fn test_operational_hides_cause() {
        let err = CommandError::Operational(anyhow::anyhow!("database is locked: secret=abc"));
        assert_eq!(err.to_string(), "unable to process request");
        let result: CommandResult = err.into();
        assert!(!result.success);
        assert!(!result.message.contains("secret"));
    }
}
