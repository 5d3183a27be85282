//! Configuration CRD types
//!
//! A `Configuration` is a rollout lineage: it stamps out Revisions and reports
//! the latest created and latest ready one. The route controller only reads
//! its status and maintains the route binding.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ConditionSet;
use crate::ROUTE_LABEL_KEY;

/// Rollout lineage producing Revisions
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.lattice.dev",
    version = "v1alpha1",
    kind = "Configuration",
    plural = "configurations",
    shortname = "cfg",
    namespaced,
    status = "ConfigurationStatus",
    printcolumn = r#"{"name":"LatestReady","type":"string","jsonPath":".status.latestReadyRevisionName"}"#,
    printcolumn = r#"{"name":"Route","type":"string","jsonPath":".metadata.labels.serving\\.lattice\\.dev/route"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {}

/// Status of a Configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    /// Most recently created revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_created_revision_name: Option<String>,

    /// Most recently created revision that became ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,

    /// Readiness conditions
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl Configuration {
    /// Name of the Route this configuration is bound to, if any
    pub fn bound_route(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(ROUTE_LABEL_KEY))
            .map(String::as_str)
    }

    /// Copy of this configuration bound to `route`
    pub fn with_bound_route(&self, route: &str) -> Self {
        let mut bound = self.clone();
        bound
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(ROUTE_LABEL_KEY.to_string(), route.to_string());
        bound
    }

    /// Copy of this configuration with the binding removed
    pub fn without_bound_route(&self) -> Self {
        let mut unbound = self.clone();
        if let Some(labels) = unbound.metadata.labels.as_mut() {
            labels.remove(ROUTE_LABEL_KEY);
        }
        unbound
    }

    /// Latest ready revision, if the configuration has become ready
    pub fn latest_ready_revision(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.latest_ready_revision_name.as_deref())
    }
}
