//! Error taxonomy shared by every janus crate.

use crate::model::RiskLevel;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The running OS, or this feature on it, is not supported.
    #[error("platform not supported: {0}")]
    PlatformNotSupported(String),

    /// Missing privilege; recoverable by re-requesting elevation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Caller-correctable input problem; nothing was attempted.
    #[error("validation failed (risk {risk_level}): {}", errors.join("; "))]
    Validation {
        risk_level: RiskLevel,
        errors: Vec<String>,
    },

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("network adapter error: {0}")]
    NetworkAdapter(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("restore failed: {0}")]
    Restore(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Another mutation already holds this resource.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Permission(_) | Error::ResourceBusy(_) | Error::Cancelled
        )
    }

    /// Recovery hint shown next to a denied or failed mutation.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Error::Backup(_) | Error::Restore(_) => Some(
                "no partial state change should be assumed; verify the current fingerprint before retrying",
            ),
            Error::Permission(_) => Some("re-run with administrator / root privileges"),
            Error::Validation { .. } => Some("correct the listed problems; nothing was changed"),
            Error::ResourceBusy(_) => Some("another change to this resource is in progress"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_error() {
        let err = Error::Validation {
            risk_level: RiskLevel::Critical,
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "validation failed (risk critical): a; b");
    }

    #[test]
    fn backup_failures_carry_verification_guidance() {
        let guidance = Error::Backup("disk full".to_string()).guidance();
        assert!(guidance.is_some_and(|g| g.contains("verify")));
        assert!(Error::Operation("x".to_string()).guidance().is_none());
    }
}
