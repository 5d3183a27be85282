//! Route controller error types

use lattice_common::error::{is_conflict_kube_error, is_retryable_kube_error};

use crate::traffic::TargetError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A traffic target could not be resolved; also reported on Route status
    #[error(transparent)]
    Traffic(#[from] TargetError),

    /// The configuration is already bound to another route
    #[error("configuration {configuration:?} is already bound to route {owner:?}")]
    ConfigurationConflict { configuration: String, owner: String },

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{0}")]
    Common(#[from] lattice_common::Error),

    #[error("missing namespace on {kind} {name}")]
    MissingNamespace { kind: String, name: String },
}

impl Error {
    /// Whether re-queueing the key can make progress
    ///
    /// A conflicting binding is retried because the other route may release
    /// the configuration.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Traffic(e) => e.is_retryable(),
            Error::ConfigurationConflict { .. } => true,
            Error::Kube(e) => is_retryable_kube_error(e),
            Error::Common(e) => e.is_retryable(),
            Error::MissingNamespace { .. } => false,
        }
    }

    /// Whether a write lost an optimistic-concurrency race against a newer object
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube(e) => is_conflict_kube_error(e),
            Error::Common(e) => e.is_conflict(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn conflict_is_retried() {
        let err = Error::ConfigurationConflict {
            configuration: "config".into(),
            owner: "other".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_conflict());
        assert_eq!(
            err.to_string(),
            r#"configuration "config" is already bound to route "other""#
        );
    }

    #[test]
    fn store_conflict_is_retried_but_forbidden_is_not() {
        let api = |code| {
            Error::from(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "nope".into(),
                reason: "Test".into(),
                code,
            }))
        };
        assert!(api(409).is_retryable());
        assert!(api(409).is_conflict());
        assert!(api(500).is_retryable());
        assert!(!api(500).is_conflict());
        assert!(!api(403).is_retryable());
    }

    #[test]
    fn resolution_errors_classify_through() {
        assert!(Error::from(TargetError::configuration_missing("config")).is_retryable());
        assert!(!Error::from(TargetError::invalid_traffic("bad")).is_retryable());
        let bad_key = lattice_common::Error::invalid_key("a/b/c", "segments");
        assert!(!Error::from(bad_key).is_retryable());
    }
}
