//! Service mesh types and constants for Istio
//!
//! The route controller programs Istio through `VirtualService` objects. The
//! CRD is owned by Istio; only the fields the controller writes are modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Cluster DNS suffix for service hostnames
pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Shared ingress gateway serving external route domains
pub const INGRESS_GATEWAY: &str = "lattice-system/lattice-ingress-gateway";

/// Reserved gateway name selecting every sidecar in the mesh
pub const MESH_GATEWAY: &str = "mesh";

/// Port revision services listen on
pub const REVISION_SERVICE_PORT: u32 = 80;

/// Fully-qualified cluster-local hostname of a service
pub fn cluster_local_host(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.{CLUSTER_DOMAIN}")
}

// =============================================================================
// VirtualService
// =============================================================================

/// Istio VirtualService spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    plural = "virtualservices",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Hostnames the rule applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Gateways and sidecars the rule is installed on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// Ordered HTTP routing rules; the first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,
}

/// One HTTP routing rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Match conditions, OR-ed together
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HttpMatchRequest>,

    /// Weighted destinations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
}

/// HTTP match condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    /// Match on the `:authority` (Host) header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<StringMatch>,
}

/// String matcher
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StringMatch {
    /// Exact match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
}

impl HttpMatchRequest {
    /// Match an exact authority
    pub fn authority(host: impl Into<String>) -> Self {
        Self {
            authority: Some(StringMatch {
                exact: Some(host.into()),
            }),
        }
    }
}

/// Weighted destination
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteDestination {
    /// Where traffic goes
    pub destination: Destination,

    /// Share of the rule's traffic, 0..=100
    pub weight: u32,
}

/// Destination service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Service hostname
    pub host: String,

    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

/// Port selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortSelector {
    /// Port number
    pub number: u32,
}
