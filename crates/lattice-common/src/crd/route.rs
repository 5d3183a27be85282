//! Route CRD types
//!
//! A `Route` splits traffic by percentage across revisions, either pinned by
//! name or following a Configuration's latest ready revision.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ConditionSet;
use crate::Error;

// =============================================================================
// Traffic
// =============================================================================

/// One traffic entry
///
/// In `spec.traffic` exactly one of `revisionName` or `configurationName` is
/// set. In `status.traffic` the revision is always resolved and the
/// configuration is kept when the entry followed one.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTarget {
    /// Optional group name; named groups get their own `<name>.<domain>` host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Revision pinned by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,

    /// Configuration whose latest ready revision receives the traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_name: Option<String>,

    /// Share of traffic, 0..=100
    pub percent: u32,
}

/// What a spec traffic entry points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficRef<'a> {
    /// A specific revision
    Pinned {
        /// Revision name
        revision: &'a str,
    },
    /// Whatever revision the configuration last reported ready
    RunLatest {
        /// Configuration name
        configuration: &'a str,
    },
}

impl TrafficTarget {
    /// Entry pinned to a revision
    pub fn pinned(revision: impl Into<String>, percent: u32) -> Self {
        Self {
            revision_name: Some(revision.into()),
            percent,
            ..Default::default()
        }
    }

    /// Entry following a configuration's latest ready revision
    pub fn run_latest(configuration: impl Into<String>, percent: u32) -> Self {
        Self {
            configuration_name: Some(configuration.into()),
            percent,
            ..Default::default()
        }
    }

    /// Place the entry in a named group
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Group key of the entry; unnamed entries share the default group `""`
    pub fn group(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Interpret a spec entry; `None` when it names both or neither target
    pub fn reference(&self) -> Option<TrafficRef<'_>> {
        match (&self.revision_name, &self.configuration_name) {
            (Some(revision), None) => Some(TrafficRef::Pinned { revision }),
            (None, Some(configuration)) => Some(TrafficRef::RunLatest { configuration }),
            _ => None,
        }
    }
}

// =============================================================================
// CRD
// =============================================================================

/// Percentage-weighted traffic policy over revisions
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.lattice.dev",
    version = "v1alpha1",
    kind = "Route",
    plural = "routes",
    shortname = "rt",
    namespaced,
    status = "RouteStatus",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".status.domain"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Ordered traffic entries; percents must sum to 100
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

/// Status of a Route
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    /// External domain serving this route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// `AllTrafficAssigned` and `Ready`
    #[serde(default)]
    pub conditions: ConditionSet,

    /// Resolved traffic, mirroring the spec with revision names filled in
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

impl Route {
    /// Validate the traffic entries
    ///
    /// Each entry must reference exactly one of a revision or a configuration,
    /// and the percents must add up to 100.
    pub fn validate(&self) -> Result<(), Error> {
        let resource = format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        );

        if self.spec.traffic.is_empty() {
            return Err(Error::validation_for_field(
                resource,
                "spec.traffic",
                "at least one traffic target is required",
            ));
        }

        for (i, target) in self.spec.traffic.iter().enumerate() {
            if target.reference().is_none() {
                return Err(Error::validation_for_field(
                    resource,
                    format!("spec.traffic[{i}]"),
                    "exactly one of revisionName or configurationName must be set",
                ));
            }
            if target.percent > 100 {
                return Err(Error::validation_for_field(
                    resource,
                    format!("spec.traffic[{i}].percent"),
                    format!("percent {} exceeds 100", target.percent),
                ));
            }
        }

        let total: u32 = self.spec.traffic.iter().map(|t| t.percent).sum();
        if total != 100 {
            return Err(Error::validation_for_field(
                resource,
                "spec.traffic",
                format!("traffic percents sum to {total}, want 100"),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
