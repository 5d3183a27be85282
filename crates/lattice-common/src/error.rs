//! Error types shared by the Lattice route crates
//!
//! Errors are structured with fields so the reconcile loop can log the
//! offending resource and decide whether a retry can help.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for shared Lattice operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for CRD specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.traffic[0].percent")
        field: Option<String>,
    },

    /// A workqueue key that is not of the form `<namespace>/<name>`
    #[error("invalid resource key {key:?}: {message}")]
    InvalidKey {
        /// The key as received
        key: String,
        /// Why it could not be parsed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Controller configuration could not be loaded
    #[error("config error [{source_name}]: {message}")]
    Config {
        /// Where the configuration came from (file path, env var)
        source_name: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a config error naming where the configuration came from
    pub fn config(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            source_name: source_name.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Version conflicts (409) and throttling (429) heal on a later attempt
    /// against a fresher snapshot. Other 4xx responses do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => is_retryable_kube_error(source),
            Error::Validation { .. } => false,
            Error::InvalidKey { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
        }
    }

    /// Whether this is an optimistic-concurrency conflict from the API server
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube { source } => is_conflict_kube_error(source),
            _ => false,
        }
    }
}

/// Whether a raw kube-rs error is a 409 from a stale `resourceVersion`
pub fn is_conflict_kube_error(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Retry classification for raw kube-rs errors
///
/// Transport failures and 5xx are retried. Of the 4xx family only version
/// conflicts (409) and throttling (429) are.
pub fn is_retryable_kube_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(ae) => !(400..500).contains(&ae.code) || matches!(ae.code, 409 | 429),
        _ => true,
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(err.to_string())
    }
}
