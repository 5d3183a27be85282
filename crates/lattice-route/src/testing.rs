//! Test fixtures: an in-memory snapshot and a client that records writes

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};

use lattice_common::crd::{
    Condition, Configuration, ConfigurationSpec, ConfigurationStatus, Revision, RevisionSpec,
    RevisionStatus, Route, RouteSpec, TrafficTarget, CONDITION_READY,
};
use lattice_common::mesh::VirtualService;

use crate::client::RouteClient;
use crate::controller::RouteContext;
use crate::domain::{DomainConfig, DomainRule};
use crate::listers::Listers;
use crate::Error;

pub const NAMESPACE: &str = "default";

// =============================================================================
// Fixtures
// =============================================================================

pub fn route(name: &str, traffic: Vec<TrafficTarget>) -> Route {
    let mut route = Route::new(name, RouteSpec { traffic });
    route.metadata.namespace = Some(NAMESPACE.to_string());
    route.metadata.uid = Some(format!("{name}-uid"));
    route.metadata.resource_version = Some("1".to_string());
    route
}

pub fn pinned_route(name: &str, revision: &str) -> Route {
    route(name, vec![TrafficTarget::pinned(revision, 100)])
}

pub fn configuration(name: &str, latest_ready: Option<&str>) -> Configuration {
    let mut cfg = Configuration::new(name, ConfigurationSpec {});
    cfg.metadata.namespace = Some(NAMESPACE.to_string());
    cfg.metadata.resource_version = Some("1".to_string());
    cfg.status = Some(ConfigurationStatus {
        latest_created_revision_name: latest_ready.map(str::to_string),
        latest_ready_revision_name: latest_ready.map(str::to_string),
        ..Default::default()
    });
    cfg
}

pub fn bound(cfg: Configuration, route: &str) -> Configuration {
    cfg.with_bound_route(route)
}

pub fn revision(name: &str) -> Revision {
    let mut rev = Revision::new(name, RevisionSpec {});
    rev.metadata.namespace = Some(NAMESPACE.to_string());
    rev.status = Some(RevisionStatus {
        conditions: [Condition::ready(CONDITION_READY)].into_iter().collect(),
    });
    rev
}

/// Domain rules used by the scenario tests
pub fn domains() -> DomainConfig {
    DomainConfig::new(vec![
        DomainRule::fallback("example.com"),
        DomainRule::selecting("another-example.com", [("app", "prod")]),
    ])
}

pub fn context(snapshot: Snapshot, client: Arc<dyn RouteClient>) -> RouteContext {
    RouteContext::new(client, Arc::new(snapshot), Arc::new(domains()))
}

// =============================================================================
// Snapshot
// =============================================================================

type Key = (String, String);

fn key_of<K: Resource>(obj: &K) -> Key {
    (
        obj.namespace().unwrap_or_else(|| NAMESPACE.to_string()),
        obj.name_any(),
    )
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Fixed in-memory [`Listers`]
#[derive(Clone, Default)]
pub struct Snapshot {
    routes: BTreeMap<Key, Arc<Route>>,
    configurations: BTreeMap<Key, Arc<Configuration>>,
    revisions: BTreeMap<Key, Arc<Revision>>,
    services: BTreeMap<Key, Arc<Service>>,
    virtual_services: BTreeMap<Key, Arc<VirtualService>>,
}

impl Snapshot {
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.insert(key_of(&route), Arc::new(route));
        self
    }

    pub fn with_configuration(mut self, cfg: Configuration) -> Self {
        self.configurations.insert(key_of(&cfg), Arc::new(cfg));
        self
    }

    pub fn with_revision(mut self, rev: Revision) -> Self {
        self.revisions.insert(key_of(&rev), Arc::new(rev));
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.insert(key_of(&service), Arc::new(service));
        self
    }

    pub fn with_virtual_service(mut self, vs: VirtualService) -> Self {
        self.virtual_services.insert(key_of(&vs), Arc::new(vs));
        self
    }

    /// Snapshot after the store accepted `writes`
    ///
    /// Created Services get a cluster IP the way the API server assigns one.
    pub fn apply(mut self, writes: &[Write]) -> Self {
        for write in writes {
            self = match write.clone() {
                Write::UpdateConfiguration(cfg) => self.with_configuration(cfg),
                Write::UpdateRouteStatus(route) => self.with_route(route),
                Write::CreateService(mut service) => {
                    let spec = service.spec.get_or_insert_with(Default::default);
                    spec.cluster_ip = Some("10.96.0.10".to_string());
                    self.with_service(service)
                }
                Write::UpdateService(service) => self.with_service(service),
                Write::CreateVirtualService(vs) | Write::UpdateVirtualService(vs) => {
                    self.with_virtual_service(vs)
                }
            };
        }
        self
    }
}

impl Listers for Snapshot {
    fn route(&self, namespace: &str, name: &str) -> Option<Arc<Route>> {
        self.routes.get(&key(namespace, name)).cloned()
    }

    fn configuration(&self, namespace: &str, name: &str) -> Option<Arc<Configuration>> {
        self.configurations.get(&key(namespace, name)).cloned()
    }

    fn configurations(&self, namespace: &str) -> Vec<Arc<Configuration>> {
        self.configurations
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, cfg)| cfg.clone())
            .collect()
    }

    fn revision(&self, namespace: &str, name: &str) -> Option<Arc<Revision>> {
        self.revisions.get(&key(namespace, name)).cloned()
    }

    fn service(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        self.services.get(&key(namespace, name)).cloned()
    }

    fn virtual_service(&self, namespace: &str, name: &str) -> Option<Arc<VirtualService>> {
        self.virtual_services.get(&key(namespace, name)).cloned()
    }
}

// =============================================================================
// Recording client
// =============================================================================

/// One write accepted by [`RecordingClient`]
#[derive(Clone, Debug)]
pub enum Write {
    UpdateConfiguration(Configuration),
    UpdateRouteStatus(Route),
    CreateService(Service),
    UpdateService(Service),
    CreateVirtualService(VirtualService),
    UpdateVirtualService(VirtualService),
}

impl Write {
    /// Short `verb kind/name` form for asserting write order
    pub fn describe(&self) -> String {
        match self {
            Write::UpdateConfiguration(cfg) => format!("update configuration/{}", cfg.name_any()),
            Write::UpdateRouteStatus(route) => format!("update-status route/{}", route.name_any()),
            Write::CreateService(svc) => format!("create service/{}", svc.name_any()),
            Write::UpdateService(svc) => format!("update service/{}", svc.name_any()),
            Write::CreateVirtualService(vs) => format!("create virtualservice/{}", vs.name_any()),
            Write::UpdateVirtualService(vs) => format!("update virtualservice/{}", vs.name_any()),
        }
    }
}

/// [`RouteClient`] that accepts every write and remembers it in order
#[derive(Default)]
pub struct RecordingClient {
    writes: Mutex<Vec<Write>>,
}

impl RecordingClient {
    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn described(&self) -> Vec<String> {
        self.writes().iter().map(Write::describe).collect()
    }

    fn record(&self, write: Write) -> Result<(), Error> {
        self.writes.lock().unwrap().push(write);
        Ok(())
    }
}

#[async_trait]
impl RouteClient for RecordingClient {
    async fn update_configuration(&self, configuration: &Configuration) -> Result<(), Error> {
        self.record(Write::UpdateConfiguration(configuration.clone()))
    }

    async fn update_route_status(&self, route: &Route) -> Result<(), Error> {
        self.record(Write::UpdateRouteStatus(route.clone()))
    }

    async fn create_service(&self, service: &Service) -> Result<(), Error> {
        self.record(Write::CreateService(service.clone()))
    }

    async fn update_service(&self, service: &Service) -> Result<(), Error> {
        self.record(Write::UpdateService(service.clone()))
    }

    async fn create_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error> {
        self.record(Write::CreateVirtualService(virtual_service.clone()))
    }

    async fn update_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error> {
        self.record(Write::UpdateVirtualService(virtual_service.clone()))
    }
}
