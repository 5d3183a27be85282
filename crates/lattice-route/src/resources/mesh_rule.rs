//! VirtualService for a Route
//!
//! One HTTP route per traffic group. The default group answers on the route
//! domain and the cluster-local name; a named group answers on
//! `<group>.<domain>`. Destinations keep resolution order and percentages.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;

use lattice_common::crd::Route;
use lattice_common::mesh::{
    cluster_local_host, Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination,
    PortSelector, VirtualService, VirtualServiceSpec, INGRESS_GATEWAY, MESH_GATEWAY,
    REVISION_SERVICE_PORT,
};

use super::child_metadata;
use crate::client::RouteClient;
use crate::converge::{managed_metadata_equal, merge_managed_metadata, ManagedChild};
use crate::listers::Listers;
use crate::traffic::{RevisionTarget, TrafficConfig};
use crate::Error;

/// Desired VirtualService for `route`
pub fn make_virtual_service(
    route: &Route,
    traffic: &TrafficConfig,
    domain: &str,
) -> VirtualService {
    let namespace = route.namespace().unwrap_or_default();
    let internal_host = cluster_local_host(&route.name_any(), &namespace);

    let mut hosts = vec![domain.to_string(), internal_host.clone()];
    let mut http = Vec::new();

    for (group, targets) in traffic.groups() {
        let matches = if group.is_empty() {
            vec![
                HttpMatchRequest::authority(domain),
                HttpMatchRequest::authority(&internal_host),
            ]
        } else {
            let host = format!("{group}.{domain}");
            hosts.push(host.clone());
            vec![HttpMatchRequest::authority(host)]
        };

        http.push(HttpRoute {
            match_: matches,
            route: targets
                .into_iter()
                .map(|target| destination(target, &namespace))
                .collect(),
        });
    }

    VirtualService {
        metadata: child_metadata(route),
        spec: VirtualServiceSpec {
            hosts,
            gateways: vec![INGRESS_GATEWAY.to_string(), MESH_GATEWAY.to_string()],
            http,
        },
    }
}

fn destination(target: &RevisionTarget, namespace: &str) -> HttpRouteDestination {
    HttpRouteDestination {
        destination: Destination {
            host: cluster_local_host(&target.revision_name, namespace),
            port: Some(PortSelector {
                number: REVISION_SERVICE_PORT,
            }),
        },
        weight: target.percent,
    }
}

/// Mesh rule of one route, converged through [`ManagedChild`]
pub struct MeshRuleChild<'a> {
    pub route: &'a Route,
    pub traffic: &'a TrafficConfig,
    pub domain: &'a str,
    pub listers: &'a dyn Listers,
    pub client: &'a dyn RouteClient,
}

#[async_trait]
impl ManagedChild for MeshRuleChild<'_> {
    type Resource = VirtualService;
    const KIND: &'static str = "VirtualService";

    fn desired(&self) -> VirtualService {
        make_virtual_service(self.route, self.traffic, self.domain)
    }

    fn existing(&self) -> Option<Arc<VirtualService>> {
        self.listers.virtual_service(
            &self.route.namespace().unwrap_or_default(),
            &self.route.name_any(),
        )
    }

    fn managed_fields_equal(&self, desired: &VirtualService, existing: &VirtualService) -> bool {
        managed_metadata_equal(&desired.metadata, &existing.metadata)
            && desired.spec == existing.spec
    }

    fn merge(&self, desired: VirtualService, existing: &VirtualService) -> VirtualService {
        let mut merged = existing.clone();
        merge_managed_metadata(&desired.metadata, &mut merged.metadata);
        merged.spec = desired.spec;
        merged
    }

    async fn create(&self, desired: &VirtualService) -> Result<(), Error> {
        self.client.create_virtual_service(desired).await
    }

    async fn update(&self, merged: &VirtualService) -> Result<(), Error> {
        self.client.update_virtual_service(merged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converge::{converge, Convergence};
    use crate::testing::{configuration, revision, route, RecordingClient, Snapshot, Write};
    use crate::traffic::resolve;
    use lattice_common::crd::TrafficTarget;

    fn split_snapshot() -> Snapshot {
        Snapshot::default()
            .with_configuration(configuration("blue", Some("blue-00001")))
            .with_configuration(configuration("green", Some("green-00001")))
            .with_revision(revision("blue-00001"))
            .with_revision(revision("green-00001"))
    }

    fn weights(route: &HttpRoute) -> Vec<(String, u32)> {
        route
            .route
            .iter()
            .map(|d| (d.destination.host.clone(), d.weight))
            .collect()
    }

    #[test]
    fn single_target_routes_everything_to_one_revision() {
        let snapshot = Snapshot::default()
            .with_configuration(configuration("config", Some("config-00001")))
            .with_revision(revision("config-00001"));
        let route = route("becomes-ready", vec![TrafficTarget::run_latest("config", 100)]);
        let traffic = resolve(&route, &snapshot).unwrap();

        let vs = make_virtual_service(&route, &traffic, "becomes-ready.default.example.com");

        assert_eq!(vs.name_any(), "becomes-ready");
        assert_eq!(
            vs.spec.hosts,
            vec![
                "becomes-ready.default.example.com",
                "becomes-ready.default.svc.cluster.local"
            ]
        );
        assert_eq!(vs.spec.gateways, vec![INGRESS_GATEWAY, MESH_GATEWAY]);
        assert_eq!(vs.spec.http.len(), 1);
        assert_eq!(vs.spec.http[0].match_.len(), 2);
        assert_eq!(
            weights(&vs.spec.http[0]),
            vec![("config-00001.default.svc.cluster.local".to_string(), 100)]
        );
    }

    #[test]
    fn split_keeps_resolution_order_and_percent() {
        let route = route(
            "split",
            vec![
                TrafficTarget::run_latest("blue", 50),
                TrafficTarget::run_latest("green", 50),
            ],
        );
        let traffic = resolve(&route, &split_snapshot()).unwrap();

        let vs = make_virtual_service(&route, &traffic, "split.default.example.com");

        assert_eq!(
            weights(&vs.spec.http[0]),
            vec![
                ("blue-00001.default.svc.cluster.local".to_string(), 50),
                ("green-00001.default.svc.cluster.local".to_string(), 50),
            ]
        );
        let total: u32 = vs.spec.http.iter().flat_map(|r| &r.route).map(|d| d.weight).sum();
        assert_eq!(total, traffic.total_percent());
    }

    #[test]
    fn named_group_gets_its_own_host() {
        let route = route(
            "split",
            vec![
                TrafficTarget::run_latest("blue", 100),
                TrafficTarget::run_latest("green", 0).named("candidate"),
            ],
        );
        let traffic = resolve(&route, &split_snapshot()).unwrap();

        let vs = make_virtual_service(&route, &traffic, "split.default.example.com");

        assert_eq!(vs.spec.http.len(), 2);
        assert!(vs
            .spec
            .hosts
            .contains(&"candidate.split.default.example.com".to_string()));
        let candidate = &vs.spec.http[1];
        assert_eq!(
            candidate.match_[0].authority.as_ref().unwrap().exact.as_deref(),
            Some("candidate.split.default.example.com")
        );
        assert_eq!(
            weights(candidate),
            vec![("green-00001.default.svc.cluster.local".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn wiped_spec_is_restored() {
        let route = route(
            "split",
            vec![
                TrafficTarget::run_latest("blue", 50),
                TrafficTarget::run_latest("green", 50),
            ],
        );
        let snapshot = split_snapshot();
        let traffic = resolve(&route, &snapshot).unwrap();
        let desired = make_virtual_service(&route, &traffic, "split.default.example.com");
        let mut wiped = desired.clone();
        wiped.spec = VirtualServiceSpec::default();
        wiped.metadata.resource_version = Some("3".into());
        let snapshot = snapshot.with_virtual_service(wiped);
        let client = RecordingClient::default();
        let child = MeshRuleChild {
            route: &route,
            traffic: &traffic,
            domain: "split.default.example.com",
            listers: &snapshot,
            client: &client,
        };

        assert_eq!(converge(&child).await.unwrap(), Convergence::Updated);

        let writes = client.writes();
        let Write::UpdateVirtualService(updated) = &writes[0] else {
            panic!("expected virtual service update, got {:?}", writes[0]);
        };
        assert_eq!(updated.spec, desired.spec);
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("3"));
    }
}
