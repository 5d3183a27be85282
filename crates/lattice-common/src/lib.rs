//! Common types for the Lattice route controller: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod mesh;
pub mod telemetry;

pub use error::Error;

/// Label placed on Configurations (binding) and on managed children (ownership)
/// whose value is the owning Route's name
pub const ROUTE_LABEL_KEY: &str = "serving.lattice.dev/route";

/// Standard managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on resources written by the route controller
pub const LABEL_MANAGED_BY_ROUTE: &str = "lattice-route";

/// Field manager used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "lattice-route-controller";
