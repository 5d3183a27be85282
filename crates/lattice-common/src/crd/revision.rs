//! Revision CRD types

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ConditionSet, CONDITION_READY};

/// Immutable snapshot of a workload, stamped out by a Configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.lattice.dev",
    version = "v1alpha1",
    kind = "Revision",
    plural = "revisions",
    shortname = "rev",
    namespaced,
    status = "RevisionStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {}

/// Status of a Revision
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    /// Readiness conditions
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl Revision {
    /// Whether the revision reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.is_true(CONDITION_READY))
    }
}
