//! Desired state of the route's managed children
//!
//! Both children are named after the Route, live in its namespace, carry the
//! route label and a controller owner reference back to the Route.

mod endpoint;
mod mesh_rule;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use lattice_common::crd::Route;
use lattice_common::kube_utils::controller_owner_reference;
use lattice_common::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_ROUTE, ROUTE_LABEL_KEY};

pub use endpoint::{make_service, EndpointChild, ENDPOINT_PORT, ENDPOINT_PORT_NAME};
pub use mesh_rule::{make_virtual_service, MeshRuleChild};

/// Metadata shared by every managed child of `route`
fn child_metadata(route: &Route) -> ObjectMeta {
    let name = route.name_any();
    let labels = BTreeMap::from([
        (ROUTE_LABEL_KEY.to_string(), name.clone()),
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_ROUTE.to_string(),
        ),
    ]);

    ObjectMeta {
        name: Some(name),
        namespace: route.namespace(),
        labels: Some(labels),
        owner_references: controller_owner_reference(route).map(|owner| vec![owner]),
        ..Default::default()
    }
}
