//! Configuration binding
//!
//! A Configuration whose latest revision a Route serves is bound to that
//! Route. Each Configuration is bound to at most one Route; the check runs
//! over every referenced configuration before anything is written.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::info;

use lattice_common::crd::{Configuration, Route};

use crate::client::RouteClient;
use crate::listers::Listers;
use crate::traffic::{TargetError, TrafficConfig};
use crate::Error;

/// Bring the bindings in line with the route's resolved traffic
///
/// Fails with [`Error::ConfigurationConflict`] without writing anything if a
/// referenced configuration belongs to another route. Otherwise unbinds the
/// configurations the route no longer follows, then binds the new ones.
pub async fn bind_configurations(
    route: &Route,
    traffic: &TrafficConfig,
    listers: &dyn Listers,
    client: &dyn RouteClient,
) -> Result<(), Error> {
    let namespace = route.namespace().unwrap_or_default();
    let route_name = route.name_any();
    let wanted = traffic.configurations();

    let mut to_bind: Vec<Arc<Configuration>> = Vec::new();
    for name in &wanted {
        let cfg = listers
            .configuration(&namespace, name)
            .ok_or_else(|| TargetError::configuration_missing(*name))?;
        match cfg.bound_route() {
            Some(owner) if owner != route_name => {
                return Err(Error::ConfigurationConflict {
                    configuration: name.to_string(),
                    owner: owner.to_string(),
                });
            }
            Some(_) => {}
            None => to_bind.push(cfg),
        }
    }

    let mut stale: Vec<Arc<Configuration>> = listers
        .configurations(&namespace)
        .into_iter()
        .filter(|cfg| cfg.bound_route() == Some(route_name.as_str()))
        .filter(|cfg| !wanted.contains(cfg.name_any().as_str()))
        .collect();
    stale.sort_by_key(|cfg| cfg.name_any());

    for cfg in stale {
        client
            .update_configuration(&cfg.without_bound_route())
            .await?;
        info!(configuration = %cfg.name_any(), route = %route_name, "unbound configuration");
    }

    for cfg in to_bind {
        client
            .update_configuration(&cfg.with_bound_route(&route_name))
            .await?;
        info!(configuration = %cfg.name_any(), route = %route_name, "bound configuration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bound, configuration, revision, route, RecordingClient, Snapshot, Write};
    use crate::traffic::resolve;
    use lattice_common::crd::TrafficTarget;

    fn ready(name: &str) -> (Configuration, lattice_common::crd::Revision) {
        let rev = format!("{name}-00001");
        (configuration(name, Some(&rev)), revision(&rev))
    }

    fn snapshot(configs: Vec<Configuration>) -> Snapshot {
        configs.into_iter().fold(Snapshot::default(), |snap, cfg| {
            let rev = cfg.latest_ready_revision().map(str::to_string);
            let snap = snap.with_configuration(cfg);
            match rev {
                Some(rev) => snap.with_revision(revision(&rev)),
                None => snap,
            }
        })
    }

    #[tokio::test]
    async fn binds_unbound_configuration() {
        let (cfg, _) = ready("config");
        let snap = snapshot(vec![cfg]);
        let route = route("web", vec![TrafficTarget::run_latest("config", 100)]);
        let traffic = resolve(&route, &snap).unwrap();
        let client = RecordingClient::default();

        bind_configurations(&route, &traffic, &snap, &client)
            .await
            .unwrap();

        let writes = client.writes();
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            Write::UpdateConfiguration(cfg) => {
                assert_eq!(cfg.name_any(), "config");
                assert_eq!(cfg.bound_route(), Some("web"));
            }
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_bound_to_self_writes_nothing() {
        let (cfg, _) = ready("config");
        let snap = snapshot(vec![bound(cfg, "web")]);
        let route = route("web", vec![TrafficTarget::run_latest("config", 100)]);
        let traffic = resolve(&route, &snap).unwrap();
        let client = RecordingClient::default();

        bind_configurations(&route, &traffic, &snap, &client)
            .await
            .unwrap();

        assert!(client.writes().is_empty());
    }

    /// Story: two routes race for the same configuration
    ///
    /// The second route is refused before it writes anything, even for the
    /// configurations it could have bound.
    #[tokio::test]
    async fn story_conflict_writes_nothing() {
        let (free, _) = ready("free");
        let (taken, _) = ready("taken");
        let snap = snapshot(vec![free, bound(taken, "other")]);
        let route = route(
            "web",
            vec![
                TrafficTarget::run_latest("free", 50),
                TrafficTarget::run_latest("taken", 50),
            ],
        );
        let traffic = resolve(&route, &snap).unwrap();
        let client = RecordingClient::default();

        let err = bind_configurations(&route, &traffic, &snap, &client)
            .await
            .unwrap_err();

        match err {
            Error::ConfigurationConflict {
                configuration,
                owner,
            } => {
                assert_eq!(configuration, "taken");
                assert_eq!(owner, "other");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(client.writes().is_empty());
    }

    #[tokio::test]
    async fn switching_unbinds_before_binding() {
        let (old, _) = ready("old");
        let (new, _) = ready("new");
        let (unrelated, _) = ready("unrelated");
        let snap = snapshot(vec![bound(old, "web"), new, bound(unrelated, "other")]);
        let route = route("web", vec![TrafficTarget::run_latest("new", 100)]);
        let traffic = resolve(&route, &snap).unwrap();
        let client = RecordingClient::default();

        bind_configurations(&route, &traffic, &snap, &client)
            .await
            .unwrap();

        let summary: Vec<_> = client
            .writes()
            .iter()
            .map(|w| match w {
                Write::UpdateConfiguration(cfg) => {
                    (cfg.name_any(), cfg.bound_route().map(str::to_string))
                }
                other => panic!("unexpected write {other:?}"),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("old".to_string(), None),
                ("new".to_string(), Some("web".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn pinned_only_route_releases_its_bindings() {
        let (old, rev) = ready("old");
        let snap = snapshot(vec![bound(old, "web")]);
        let route = crate::testing::pinned_route("web", &rev.name_any());
        let traffic = resolve(&route, &snap).unwrap();
        let client = RecordingClient::default();

        bind_configurations(&route, &traffic, &snap, &client)
            .await
            .unwrap();

        let writes = client.writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            &writes[0],
            Write::UpdateConfiguration(cfg) if cfg.bound_route().is_none()
        ));
    }
}
