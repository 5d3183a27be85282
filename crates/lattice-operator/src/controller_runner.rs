//! Controller runner - builds the Route controller and its reflectors
//!
//! `build_route_controllers` returns a Vec of boxed futures that the caller
//! drives to completion. Nothing runs until they are polled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use lattice_common::crd::{Configuration, Revision, Route};
use lattice_common::mesh::VirtualService;
use lattice_common::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_ROUTE};
use lattice_route::triggers::{routes_for_configuration, routes_for_revision};
use lattice_route::{error_policy, reconcile, DomainConfig, RouteContext, StoreListers};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Position of the Route controller in [`build_route_controllers`]' output
pub const ROUTE_CONTROLLER: usize = 0;

/// Names of the futures returned by [`build_route_controllers`], in order
const CONTROLLER_NAMES: [&str; 5] = [
    "Route controller",
    "Configuration reflector",
    "Revision reflector",
    "Service reflector",
    "VirtualService reflector",
];

/// Name of the future at `index` in [`build_route_controllers`]' output
pub fn controller_name(index: usize) -> &'static str {
    CONTROLLER_NAMES.get(index).copied().unwrap_or("unknown")
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Only children this controller manages
fn managed_watcher_config() -> WatcherConfig {
    watcher_config().labels(&format!("{LABEL_MANAGED_BY}={LABEL_MANAGED_BY_ROUTE}"))
}

/// Reflector cache for `api` plus the future that keeps it filled
fn reflected<K>(api: Api<K>, config: WatcherConfig) -> (Store<K>, ControllerFuture)
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + Send
        + Sync
        + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = watcher::watcher(api, config)
        .default_backoff()
        .reflect(writer)
        .for_each(|event| {
            if let Err(e) = event {
                tracing::warn!(kind = %K::kind(&()), error = %e, "reflector watch error");
            }
            std::future::ready(())
        });
    (reader, Box::pin(stream))
}

/// Build the Route controller and the reflectors it reads from
///
/// The controller starts only after every dependency cache has completed its
/// initial list.
pub fn build_route_controllers(
    client: Client,
    domains: DomainConfig,
    concurrency: u16,
) -> Vec<ControllerFuture> {
    let routes: Api<Route> = Api::all(client.clone());
    let configurations: Api<Configuration> = Api::all(client.clone());
    let revisions: Api<Revision> = Api::all(client.clone());
    let services: Api<Service> = Api::all(client.clone());
    let virtual_services: Api<VirtualService> = Api::all(client.clone());

    let (configuration_store, configuration_reflector) =
        reflected(configurations.clone(), watcher_config());
    let (revision_store, revision_reflector) = reflected(revisions.clone(), watcher_config());
    let (service_store, service_reflector) = reflected(services.clone(), managed_watcher_config());
    let (virtual_service_store, virtual_service_reflector) =
        reflected(virtual_services.clone(), managed_watcher_config());

    let controller = Controller::new(routes, watcher_config())
        .with_config(ControllerConfig::default().concurrency(concurrency));

    let listers = StoreListers::new(
        controller.store(),
        configuration_store,
        revision_store,
        service_store,
        virtual_service_store,
    );
    let ctx = Arc::new(RouteContext::from_client(client, listers.clone(), domains));

    let listers_for_configurations = listers.clone();
    let listers_for_revisions = listers.clone();

    let controller = controller
        .owns(services, managed_watcher_config())
        .owns(virtual_services, managed_watcher_config())
        .watches(configurations, watcher_config(), move |cfg| {
            let affected = routes_for_configuration(&listers_for_configurations.routes(), &cfg);
            tracing::debug!(
                configuration = ?cfg.metadata.name,
                affected_count = affected.len(),
                "Triggering re-reconciliation of routes following configuration"
            );
            affected
        })
        .watches(revisions, watcher_config(), move |rev| {
            let listers = &listers_for_revisions;
            let affected = routes_for_revision(&listers.routes(), listers, &rev);
            tracing::debug!(
                revision = ?rev.metadata.name,
                affected_count = affected.len(),
                "Triggering re-reconciliation of routes serving revision"
            );
            affected
        });

    let route_ctrl: ControllerFuture = Box::pin(async move {
        tracing::info!("Waiting for dependency caches to sync");
        if let Err(e) = listers.wait_until_ready().await {
            tracing::error!(error = %e, "dependency cache closed before initial sync");
            return;
        }
        tracing::info!("Caches synced, starting Route controller");

        controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Route"))
            .await;
    });

    tracing::info!("- Route controller (concurrency {concurrency})");
    tracing::info!("- Configuration, Revision, Service and VirtualService reflectors");

    // Order matches CONTROLLER_NAMES
    vec![
        route_ctrl,
        configuration_reflector,
        revision_reflector,
        service_reflector,
        virtual_service_reflector,
    ]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
