//! Create/update/no-op convergence of managed children
//!
//! Each child kind implements [`ManagedChild`]; [`converge`] is the only place
//! that decides between create, update and no-op.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::Error;

/// Capabilities needed to converge one child object
#[async_trait]
pub trait ManagedChild: Send + Sync {
    /// Object type of the child
    type Resource: Resource + Clone + Send + Sync;

    /// Kind name used in logs
    const KIND: &'static str;

    /// Desired object, computed purely from the route's inputs
    fn desired(&self) -> Self::Resource;

    /// Current object from the snapshot
    fn existing(&self) -> Option<Arc<Self::Resource>>;

    /// Whether the controller-managed fields of both objects agree
    fn managed_fields_equal(&self, desired: &Self::Resource, existing: &Self::Resource) -> bool;

    /// Existing object with the managed fields of `desired` written over it
    ///
    /// Everything else, including `resourceVersion` and platform-assigned
    /// fields, is taken from `existing`.
    fn merge(&self, desired: Self::Resource, existing: &Self::Resource) -> Self::Resource;

    async fn create(&self, desired: &Self::Resource) -> Result<(), Error>;

    async fn update(&self, merged: &Self::Resource) -> Result<(), Error>;
}

/// What [`converge`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    Created,
    Updated,
    Unchanged,
}

/// Create the child if absent, update it if its managed fields drifted
pub async fn converge<C: ManagedChild>(child: &C) -> Result<Convergence, Error> {
    let desired = child.desired();
    let name = desired.name_any();

    let Some(existing) = child.existing() else {
        child.create(&desired).await?;
        info!(kind = C::KIND, name = %name, "created managed child");
        return Ok(Convergence::Created);
    };

    if child.managed_fields_equal(&desired, &existing) {
        debug!(kind = C::KIND, name = %name, "managed child up to date");
        return Ok(Convergence::Unchanged);
    }

    let merged = child.merge(desired, &existing);
    child.update(&merged).await?;
    info!(kind = C::KIND, name = %name, "updated managed child");
    Ok(Convergence::Updated)
}

// =============================================================================
// Metadata helpers
// =============================================================================

/// Whether `existing` carries every label and owner reference of `desired`
///
/// Labels and owners added by other parties are ignored.
pub fn managed_metadata_equal(desired: &ObjectMeta, existing: &ObjectMeta) -> bool {
    let labels_present = contains_all(desired.labels.as_ref(), existing.labels.as_ref());
    let owners_present = desired
        .owner_references
        .iter()
        .flatten()
        .all(|owner| {
            existing
                .owner_references
                .iter()
                .flatten()
                .any(|o| o.uid == owner.uid && o.controller == owner.controller)
        });
    labels_present && owners_present
}

/// Write the managed labels and owner references of `desired` into `existing`
pub fn merge_managed_metadata(desired: &ObjectMeta, existing: &mut ObjectMeta) {
    if let Some(labels) = &desired.labels {
        existing
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for owner in desired.owner_references.iter().flatten() {
        let owners = existing.owner_references.get_or_insert_with(Vec::new);
        owners.retain(|o| o.uid != owner.uid);
        owners.push(owner.clone());
    }
}

fn contains_all(
    wanted: Option<&BTreeMap<String, String>>,
    actual: Option<&BTreeMap<String, String>>,
) -> bool {
    wanted.into_iter().flatten().all(|(k, v)| {
        actual
            .and_then(|labels| labels.get(k))
            .is_some_and(|value| value == v)
    })
}
