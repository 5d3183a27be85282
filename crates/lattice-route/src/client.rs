//! Mutation surface against the API server
//!
//! Every write carries the `resourceVersion` observed in the snapshot, so a
//! stale write fails with 409 instead of clobbering a newer object.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use lattice_common::crd::{Configuration, Route};
use lattice_common::mesh::VirtualService;
use lattice_common::FIELD_MANAGER;

use crate::Error;

/// Trait abstracting the writes the route controller performs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RouteClient: Send + Sync {
    /// Replace a Configuration (binding label changes)
    async fn update_configuration(&self, configuration: &Configuration) -> Result<(), Error>;

    /// Write only the status subresource of a Route
    async fn update_route_status(&self, route: &Route) -> Result<(), Error>;

    /// Create the endpoint Service
    async fn create_service(&self, service: &Service) -> Result<(), Error>;

    /// Replace the endpoint Service
    async fn update_service(&self, service: &Service) -> Result<(), Error>;

    /// Create the mesh rule
    async fn create_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error>;

    /// Replace the mesh rule
    async fn update_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct RouteKubeClient {
    client: Client,
}

impl RouteKubeClient {
    /// Create a new RouteKubeClient wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, obj: &K) -> Result<Api<K>, Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>,
    {
        let namespace = obj.namespace().ok_or_else(|| Error::MissingNamespace {
            kind: K::kind(&()).to_string(),
            name: obj.name_any(),
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    async fn create<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        self.api(obj)?.create(&PostParams::default(), obj).await?;
        Ok(())
    }

    async fn replace<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        self.api(obj)?
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RouteClient for RouteKubeClient {
    async fn update_configuration(&self, configuration: &Configuration) -> Result<(), Error> {
        self.replace(configuration).await
    }

    async fn update_route_status(&self, route: &Route) -> Result<(), Error> {
        let api: Api<Route> = self.api(route)?;
        // resourceVersion in a merge patch is a precondition on the write
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": route.resource_version() },
            "status": route.status,
        });

        api.patch_status(
            &route.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<(), Error> {
        self.create(service).await
    }

    async fn update_service(&self, service: &Service) -> Result<(), Error> {
        self.replace(service).await
    }

    async fn create_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error> {
        self.create(virtual_service).await
    }

    async fn update_virtual_service(&self, virtual_service: &VirtualService) -> Result<(), Error> {
        self.replace(virtual_service).await
    }
}
