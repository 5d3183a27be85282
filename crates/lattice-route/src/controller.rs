//! Route controller implementation
//!
//! Reconciles a Route in a fixed order:
//! 1. fetch the route from the snapshot (gone means done)
//! 2. resolve traffic
//! 3. bind configurations, only if resolution succeeded
//! 4. pick the domain
//! 5. converge the endpoint Service
//! 6. converge the VirtualService, only if resolution succeeded
//! 7. write status if it changed
//!
//! A resolution failure still runs 4, 5 and 7 and is then returned so the
//! key is re-queued. A binding conflict or a store failure returns at once.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use lattice_common::crd::{
    Condition, ConditionStatus, Route, RouteStatus, CONDITION_ALL_TRAFFIC_ASSIGNED,
    CONDITION_READY,
};
use lattice_common::kube_utils::{object_key, parse_key};

use crate::binder::bind_configurations;
use crate::client::{RouteClient, RouteKubeClient};
use crate::converge::converge;
use crate::domain::DomainConfig;
use crate::listers::{Listers, StoreListers};
use crate::resources::{EndpointChild, MeshRuleChild};
use crate::traffic::{self, TargetError, TrafficConfig};
use crate::Error;

/// Requeue interval after a successful reconcile (periodic resync)
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after a retryable failure
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// Context
// =============================================================================

/// Everything a reconcile reads from or writes to
pub struct RouteContext {
    /// Writes against the API server
    pub client: Arc<dyn RouteClient>,
    /// Read-only snapshot lookups
    pub listers: Arc<dyn Listers>,
    /// Domain suffix rules
    pub domains: Arc<DomainConfig>,
}

impl RouteContext {
    pub fn new(
        client: Arc<dyn RouteClient>,
        listers: Arc<dyn Listers>,
        domains: Arc<DomainConfig>,
    ) -> Self {
        Self {
            client,
            listers,
            domains,
        }
    }

    /// Context backed by the API server and reflector stores
    pub fn from_client(client: Client, listers: StoreListers, domains: DomainConfig) -> Self {
        Self::new(
            Arc::new(RouteKubeClient::new(client)),
            Arc::new(listers),
            Arc::new(domains),
        )
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Reconcile the Route named by a `<namespace>/<name>` key
#[instrument(skip_all, fields(key = %key))]
pub async fn reconcile_key(key: &str, ctx: &RouteContext) -> Result<(), Error> {
    let (namespace, name) = parse_key(key)?;

    let Some(route) = ctx.listers.route(namespace, name) else {
        debug!("route no longer exists");
        return Ok(());
    };

    reconcile_route(&route, ctx).await
}

/// `kube::runtime::Controller` reconcile function
pub async fn reconcile(route: Arc<Route>, ctx: Arc<RouteContext>) -> Result<Action, Error> {
    reconcile_key(&object_key(route.as_ref()), &ctx).await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Error policy for the controller
pub fn error_policy(route: Arc<Route>, error: &Error, _ctx: Arc<RouteContext>) -> Action {
    if error.is_conflict() {
        debug!(
            route = %route.name_any(),
            error = %error,
            "write raced a newer object, will retry"
        );
        Action::requeue(RETRY_DELAY)
    } else if error.is_retryable() {
        warn!(route = %route.name_any(), error = %error, "reconciliation failed, will retry");
        Action::requeue(RETRY_DELAY)
    } else {
        error!(route = %route.name_any(), error = %error, "reconciliation failed permanently");
        Action::await_change()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

async fn reconcile_route(route: &Route, ctx: &RouteContext) -> Result<(), Error> {
    let listers = ctx.listers.as_ref();
    let client = ctx.client.as_ref();

    let resolution = traffic::resolve(route, listers);
    match &resolution {
        Ok(traffic) => {
            debug!(targets = traffic.targets().len(), "resolved traffic");
            bind_configurations(route, traffic, listers, client).await?;
        }
        Err(err) => {
            warn!(reason = err.reason(), error = %err, "traffic resolution failed");
        }
    }

    let domain = ctx.domains.domain_for(route);

    converge(&EndpointChild {
        route,
        listers,
        client,
    })
    .await?;

    if let Ok(traffic) = &resolution {
        converge(&MeshRuleChild {
            route,
            traffic,
            domain: &domain,
            listers,
            client,
        })
        .await?;
    }

    let status = compute_status(route, &resolution, &domain);
    if route.status.as_ref() == Some(&status) {
        debug!("status unchanged, skipping update");
    } else {
        let mut updated = route.clone();
        updated.status = Some(status);
        client.update_route_status(&updated).await?;
        info!(domain = %domain, ready = resolution.is_ok(), "updated route status");
    }

    resolution.map(|_| ()).map_err(Error::from)
}

/// Status the route should report for a resolution outcome
///
/// On failure the previously reported traffic is kept: the mesh rule was not
/// touched and still routes it.
pub fn compute_status(
    route: &Route,
    resolution: &Result<TrafficConfig, TargetError>,
    domain: &str,
) -> RouteStatus {
    let mut status = route.status.clone().unwrap_or_default();
    status.domain = Some(domain.to_string());

    match resolution {
        Ok(traffic) => {
            status
                .conditions
                .set(Condition::ready(CONDITION_ALL_TRAFFIC_ASSIGNED));
            status.conditions.set(Condition::ready(CONDITION_READY));
            status.traffic = traffic.status_traffic();
        }
        Err(err) => {
            for type_ in [CONDITION_ALL_TRAFFIC_ASSIGNED, CONDITION_READY] {
                status.conditions.set(Condition::new(
                    type_,
                    ConditionStatus::False,
                    err.reason(),
                    err.to_string(),
                ));
            }
        }
    }

    status
}
