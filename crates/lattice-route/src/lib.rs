//! Route reconciler
//!
//! Turns a `Route` into two converged children and a status:
//! - traffic resolution against Configurations and Revisions (`traffic`)
//! - single-owner Configuration binding (`binder`)
//! - domain selection by route labels (`domain`)
//! - desired Service and VirtualService synthesis (`resources`)
//! - create/update/no-op convergence (`converge`) driven by `controller`
//! - watch mappers from dependencies back to Routes (`triggers`)

pub mod binder;
pub mod client;
pub mod controller;
pub mod converge;
pub mod domain;
pub mod error;
pub mod listers;
pub mod resources;
pub mod traffic;
pub mod triggers;

#[cfg(test)]
mod testing;

pub use client::{RouteClient, RouteKubeClient};
pub use controller::{error_policy, reconcile, reconcile_key, RouteContext};
pub use domain::{DomainConfig, DomainRule};
pub use error::Error;
pub use listers::{Listers, StoreListers};
