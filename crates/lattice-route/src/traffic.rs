//! Traffic target resolution
//!
//! Resolves a Route's spec entries into concrete revision targets. A pinned
//! entry names its revision directly; a run-latest entry follows its
//! Configuration's latest ready revision. Resolution is all-or-nothing: the
//! first unresolvable entry fails the whole Route.

use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;
use tracing::debug;

use lattice_common::crd::{Route, TrafficRef, TrafficTarget};

use crate::listers::Listers;

/// Reason reported when a configuration is absent or not ready
pub const REASON_CONFIGURATION_MISSING: &str = "ConfigurationMissing";

/// Reason reported when a pinned revision is absent
pub const REASON_REVISION_MISSING: &str = "RevisionMissing";

/// Reason reported when the traffic entries are malformed
pub const REASON_INVALID_TRAFFIC: &str = "InvalidTraffic";

// =============================================================================
// Errors
// =============================================================================

/// Why a Route's traffic could not be resolved
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// The configuration is absent, not yet ready, or its ready revision is gone
    #[error("Referenced Configuration {name:?} not found")]
    ConfigurationMissing { name: String },

    /// A pinned revision is absent
    #[error("Referenced Revision {name:?} not found")]
    RevisionMissing { name: String },

    /// The traffic entries are malformed
    #[error("{message}")]
    InvalidTraffic { message: String },
}

impl TargetError {
    pub fn configuration_missing(name: impl Into<String>) -> Self {
        Self::ConfigurationMissing { name: name.into() }
    }

    pub fn revision_missing(name: impl Into<String>) -> Self {
        Self::RevisionMissing { name: name.into() }
    }

    pub fn invalid_traffic(message: impl Into<String>) -> Self {
        Self::InvalidTraffic {
            message: message.into(),
        }
    }

    /// Machine-readable condition reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing { .. } => REASON_CONFIGURATION_MISSING,
            Self::RevisionMissing { .. } => REASON_REVISION_MISSING,
            Self::InvalidTraffic { .. } => REASON_INVALID_TRAFFIC,
        }
    }

    /// Missing references may appear later; a malformed spec needs an edit
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidTraffic { .. })
    }
}

// =============================================================================
// Resolved traffic
// =============================================================================

/// A traffic entry with its revision resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionTarget {
    /// Group key; `""` for unnamed entries
    pub group: String,
    /// Configuration followed, for run-latest entries
    pub configuration_name: Option<String>,
    /// Concrete revision receiving the traffic
    pub revision_name: String,
    pub percent: u32,
    /// Whether the revision is serving; scale-to-zero is not handled, so always true
    pub active: bool,
}

/// Successful resolution of a Route's traffic, in spec order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficConfig {
    targets: Vec<RevisionTarget>,
}

impl TrafficConfig {
    /// Flattened targets in spec order
    pub fn targets(&self) -> &[RevisionTarget] {
        &self.targets
    }

    /// Targets grouped by group key; the default group `""` sorts first and
    /// each group keeps spec order
    pub fn groups(&self) -> BTreeMap<&str, Vec<&RevisionTarget>> {
        let mut groups: BTreeMap<&str, Vec<&RevisionTarget>> = BTreeMap::new();
        for target in &self.targets {
            groups.entry(target.group.as_str()).or_default().push(target);
        }
        groups
    }

    /// Configurations followed by run-latest entries
    pub fn configurations(&self) -> BTreeSet<&str> {
        self.targets
            .iter()
            .filter_map(|t| t.configuration_name.as_deref())
            .collect()
    }

    /// Sum of all target percents
    pub fn total_percent(&self) -> u32 {
        self.targets.iter().map(|t| t.percent).sum()
    }

    /// Traffic as reported on Route status
    pub fn status_traffic(&self) -> Vec<TrafficTarget> {
        self.targets
            .iter()
            .map(|t| TrafficTarget {
                name: (!t.group.is_empty()).then(|| t.group.clone()),
                revision_name: Some(t.revision_name.clone()),
                configuration_name: t.configuration_name.clone(),
                percent: t.percent,
            })
            .collect()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve every traffic entry of `route` against the snapshot
pub fn resolve(route: &Route, listers: &dyn Listers) -> Result<TrafficConfig, TargetError> {
    route.validate().map_err(|e| match e {
        lattice_common::Error::Validation {
            message,
            field: Some(field),
            ..
        } => TargetError::invalid_traffic(format!("{field}: {message}")),
        other => TargetError::invalid_traffic(other.to_string()),
    })?;

    let namespace = route.namespace().unwrap_or_default();
    let mut targets = Vec::with_capacity(route.spec.traffic.len());

    for entry in &route.spec.traffic {
        let Some(reference) = entry.reference() else {
            return Err(TargetError::invalid_traffic(
                "exactly one of revisionName or configurationName must be set",
            ));
        };

        let target = match reference {
            TrafficRef::Pinned { revision } => {
                let rev = listers
                    .revision(&namespace, revision)
                    .ok_or_else(|| TargetError::revision_missing(revision))?;
                if !rev.is_ready() {
                    debug!(revision = %revision, "pinned revision is not ready yet");
                }
                RevisionTarget {
                    group: entry.group().to_string(),
                    configuration_name: None,
                    revision_name: revision.to_string(),
                    percent: entry.percent,
                    active: true,
                }
            }
            TrafficRef::RunLatest { configuration } => {
                let revision = latest_ready_revision(listers, &namespace, configuration)?;
                RevisionTarget {
                    group: entry.group().to_string(),
                    configuration_name: Some(configuration.to_string()),
                    revision_name: revision,
                    percent: entry.percent,
                    active: true,
                }
            }
        };
        targets.push(target);
    }

    Ok(TrafficConfig { targets })
}

/// Latest ready revision of a configuration
///
/// Absence, not-yet-ready and a ready revision missing from the snapshot all
/// report `ConfigurationMissing`.
fn latest_ready_revision(
    listers: &dyn Listers,
    namespace: &str,
    configuration: &str,
) -> Result<String, TargetError> {
    let missing = || TargetError::configuration_missing(configuration);

    let cfg = listers
        .configuration(namespace, configuration)
        .ok_or_else(missing)?;
    let Some(revision) = cfg.latest_ready_revision() else {
        debug!(configuration = %configuration, "configuration has no ready revision");
        return Err(missing());
    };
    if listers.revision(namespace, revision).is_none() {
        debug!(
            configuration = %configuration,
            revision = %revision,
            "latest ready revision is not in the snapshot"
        );
        return Err(missing());
    }

    Ok(revision.to_string())
}
