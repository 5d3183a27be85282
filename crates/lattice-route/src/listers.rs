//! Read-only snapshot lookups
//!
//! Every read the reconcile pipeline performs goes through [`Listers`]. The
//! production implementation is backed by reflector caches, so results may
//! lag the API server; writes carry the observed `resourceVersion` and the
//! server rejects them if the snapshot was stale.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::runtime::reflector::store::WriterDropped;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;

use lattice_common::crd::{Configuration, Revision, Route};
use lattice_common::mesh::VirtualService;

/// Indexed lookup by `(namespace, name)` over the objects the pipeline reads
pub trait Listers: Send + Sync {
    /// Route by key
    fn route(&self, namespace: &str, name: &str) -> Option<Arc<Route>>;

    /// Configuration by key
    fn configuration(&self, namespace: &str, name: &str) -> Option<Arc<Configuration>>;

    /// Every Configuration in a namespace
    fn configurations(&self, namespace: &str) -> Vec<Arc<Configuration>>;

    /// Revision by key
    fn revision(&self, namespace: &str, name: &str) -> Option<Arc<Revision>>;

    /// Endpoint Service by key
    fn service(&self, namespace: &str, name: &str) -> Option<Arc<Service>>;

    /// Mesh rule by key
    fn virtual_service(&self, namespace: &str, name: &str) -> Option<Arc<VirtualService>>;
}

/// [`Listers`] over reflector stores
#[derive(Clone)]
pub struct StoreListers {
    routes: Store<Route>,
    configurations: Store<Configuration>,
    revisions: Store<Revision>,
    services: Store<Service>,
    virtual_services: Store<VirtualService>,
}

impl StoreListers {
    /// Bundle the reflector readers
    pub fn new(
        routes: Store<Route>,
        configurations: Store<Configuration>,
        revisions: Store<Revision>,
        services: Store<Service>,
        virtual_services: Store<VirtualService>,
    ) -> Self {
        Self {
            routes,
            configurations,
            revisions,
            services,
            virtual_services,
        }
    }

    /// Wait until every dependency store has completed its initial list
    ///
    /// The route store is excluded: it is driven by the controller itself,
    /// which only reconciles objects it has already observed.
    pub async fn wait_until_ready(&self) -> Result<(), WriterDropped> {
        self.configurations.wait_until_ready().await?;
        self.revisions.wait_until_ready().await?;
        self.services.wait_until_ready().await?;
        self.virtual_services.wait_until_ready().await?;
        Ok(())
    }

    /// Routes currently cached, across namespaces
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.state()
    }
}

impl Listers for StoreListers {
    fn route(&self, namespace: &str, name: &str) -> Option<Arc<Route>> {
        self.routes.get(&ObjectRef::new(name).within(namespace))
    }

    fn configuration(&self, namespace: &str, name: &str) -> Option<Arc<Configuration>> {
        self.configurations
            .get(&ObjectRef::new(name).within(namespace))
    }

    fn configurations(&self, namespace: &str) -> Vec<Arc<Configuration>> {
        self.configurations
            .state()
            .into_iter()
            .filter(|cfg| cfg.namespace().as_deref() == Some(namespace))
            .collect()
    }

    fn revision(&self, namespace: &str, name: &str) -> Option<Arc<Revision>> {
        self.revisions.get(&ObjectRef::new(name).within(namespace))
    }

    fn service(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        self.services.get(&ObjectRef::new(name).within(namespace))
    }

    fn virtual_service(&self, namespace: &str, name: &str) -> Option<Arc<VirtualService>> {
        self.virtual_services
            .get(&ObjectRef::new(name).within(namespace))
    }
}
