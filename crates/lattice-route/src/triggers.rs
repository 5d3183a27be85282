//! Watch mappers: which Routes to re-reconcile when a dependency changes

use std::collections::BTreeSet;
use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use lattice_common::crd::{Configuration, Revision, Route, TrafficRef};

use crate::listers::Listers;

/// Routes affected by a change to `cfg`
///
/// Covers routes that follow it as well as the route it is bound to, so a
/// stale binding is released once the route stops referencing it.
pub fn routes_for_configuration(
    routes: &[Arc<Route>],
    cfg: &Configuration,
) -> Vec<ObjectRef<Route>> {
    let namespace = cfg.namespace().unwrap_or_default();
    let name = cfg.name_any();

    let mut affected: BTreeSet<String> = routes
        .iter()
        .filter(|route| route.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|route| {
            route.spec.traffic.iter().any(|entry| {
                matches!(
                    entry.reference(),
                    Some(TrafficRef::RunLatest { configuration }) if configuration == name
                )
            })
        })
        .map(|route| route.name_any())
        .collect();

    if let Some(owner) = cfg.bound_route() {
        affected.insert(owner.to_string());
    }

    to_refs(affected, &namespace)
}

/// Routes affected by a change to `rev`
///
/// A route is affected if it pins the revision or follows a configuration
/// whose latest ready revision it is.
pub fn routes_for_revision(
    routes: &[Arc<Route>],
    listers: &dyn Listers,
    rev: &Revision,
) -> Vec<ObjectRef<Route>> {
    let namespace = rev.namespace().unwrap_or_default();
    let name = rev.name_any();

    let affected: BTreeSet<String> = routes
        .iter()
        .filter(|route| route.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|route| {
            route.spec.traffic.iter().any(|entry| match entry.reference() {
                Some(TrafficRef::Pinned { revision }) => revision == name,
                Some(TrafficRef::RunLatest { configuration }) => listers
                    .configuration(&namespace, configuration)
                    .is_some_and(|cfg| cfg.latest_ready_revision() == Some(name.as_str())),
                None => false,
            })
        })
        .map(|route| route.name_any())
        .collect();

    to_refs(affected, &namespace)
}

fn to_refs(names: BTreeSet<String>, namespace: &str) -> Vec<ObjectRef<Route>> {
    names
        .into_iter()
        .map(|name| ObjectRef::new(&name).within(namespace))
        .collect()
}
