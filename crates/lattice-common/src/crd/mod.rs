//! Custom Resource Definitions for the serving API
//!
//! Route, Configuration and Revision live in `serving.lattice.dev/v1alpha1`.

mod configuration;
mod revision;
mod route;
mod types;

pub use configuration::{Configuration, ConfigurationSpec, ConfigurationStatus};
pub use revision::{Revision, RevisionSpec, RevisionStatus};
pub use route::{Route, RouteSpec, RouteStatus, TrafficRef, TrafficTarget};
pub use types::{
    Condition, ConditionSet, ConditionStatus, CONDITION_ALL_TRAFFIC_ASSIGNED, CONDITION_READY,
};
