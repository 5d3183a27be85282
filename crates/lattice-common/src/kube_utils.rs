//! Kubernetes helpers shared by the route controller

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::Error;

/// Split a `<namespace>/<name>` workqueue key
///
/// Both parts must be non-empty and there must be exactly one separator.
pub fn parse_key(key: &str) -> Result<(&str, &str), Error> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        (_, _, Some(_)) => Err(Error::invalid_key(key, "unexpected number of segments")),
        _ => Err(Error::invalid_key(key, "expected <namespace>/<name>")),
    }
}

/// Workqueue key of a namespaced object
pub fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Controller owner reference pointing at `owner`
///
/// Returns `None` until the object has been persisted (no uid yet).
pub fn controller_owner_reference<K>(owner: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    let meta = owner.meta();
    Some(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: meta.name.clone()?,
        uid: meta.uid.clone()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}
