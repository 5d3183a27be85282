//! Endpoint Service for a Route
//!
//! The Service gives the route a stable cluster-internal name. Its cluster IP
//! is assigned by the API server and is never part of the desired state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use lattice_common::crd::Route;

use super::child_metadata;
use crate::client::RouteClient;
use crate::converge::{managed_metadata_equal, merge_managed_metadata, ManagedChild};
use crate::listers::Listers;
use crate::Error;

/// Port name of the endpoint Service
pub const ENDPOINT_PORT_NAME: &str = "http";

/// Port exposed by the endpoint Service
pub const ENDPOINT_PORT: i32 = 80;

/// Desired endpoint Service for `route`
///
/// Fields the API server would otherwise default (type, protocol, target
/// port) are spelled out so a defaulted object compares equal.
pub fn make_service(route: &Route) -> Service {
    Service {
        metadata: child_metadata(route),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                name: Some(ENDPOINT_PORT_NAME.to_string()),
                port: ENDPOINT_PORT,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(ENDPOINT_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// The spec fields the controller owns
///
/// The selector is managed as absent: the Service has no pods of its own and
/// an empty map compares equal to none.
#[derive(Debug, PartialEq)]
struct ManagedSpec<'a> {
    type_: Option<&'a String>,
    ports: Option<&'a Vec<ServicePort>>,
    selector: Option<&'a BTreeMap<String, String>>,
}

fn managed_spec(service: &Service) -> ManagedSpec<'_> {
    let spec = service.spec.as_ref();
    ManagedSpec {
        type_: spec.and_then(|s| s.type_.as_ref()),
        ports: spec.and_then(|s| s.ports.as_ref()),
        selector: spec
            .and_then(|s| s.selector.as_ref())
            .filter(|selector| !selector.is_empty()),
    }
}

/// Endpoint Service of one route, converged through [`ManagedChild`]
pub struct EndpointChild<'a> {
    pub route: &'a Route,
    pub listers: &'a dyn Listers,
    pub client: &'a dyn RouteClient,
}

#[async_trait]
impl ManagedChild for EndpointChild<'_> {
    type Resource = Service;
    const KIND: &'static str = "Service";

    fn desired(&self) -> Service {
        make_service(self.route)
    }

    fn existing(&self) -> Option<Arc<Service>> {
        self.listers.service(
            &self.route.namespace().unwrap_or_default(),
            &self.route.name_any(),
        )
    }

    fn managed_fields_equal(&self, desired: &Service, existing: &Service) -> bool {
        managed_metadata_equal(&desired.metadata, &existing.metadata)
            && managed_spec(desired) == managed_spec(existing)
    }

    fn merge(&self, desired: Service, existing: &Service) -> Service {
        let mut merged = existing.clone();
        merge_managed_metadata(&desired.metadata, &mut merged.metadata);

        let desired_spec = desired.spec.unwrap_or_default();
        let spec = merged.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_ = desired_spec.type_;
        spec.ports = desired_spec.ports;
        spec.selector = desired_spec.selector;
        merged
    }

    async fn create(&self, desired: &Service) -> Result<(), Error> {
        self.client.create_service(desired).await
    }

    async fn update(&self, merged: &Service) -> Result<(), Error> {
        self.client.update_service(merged).await
    }
}
