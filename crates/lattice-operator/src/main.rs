//! Lattice route controller - publishes Routes as mesh traffic rules

mod controller_runner;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};

use lattice_common::crd::{Configuration, Revision, Route};
use lattice_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use lattice_common::FIELD_MANAGER;
use lattice_route::DomainConfig;

use crate::controller_runner::{build_route_controllers, controller_name, ROUTE_CONTROLLER};

const DEFAULT_CONCURRENCY: u16 = 4;

/// Lattice route controller
#[derive(Parser, Debug)]
#[command(name = "lattice-route-controller", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Route controller (default mode)
    ///
    /// Watches Routes and the Configurations, Revisions, Services and
    /// VirtualServices they depend on, and keeps each Route's endpoint,
    /// mesh rule and status converged.
    Controller(ControllerArgs),
}

#[derive(Args, Debug)]
struct ControllerArgs {
    /// Domain suffix rules (YAML); defaults to example.com for every route
    #[arg(long, env = "LATTICE_DOMAIN_CONFIG")]
    domain_config: Option<PathBuf>,

    /// Routes reconciled in parallel
    #[arg(long, env = "LATTICE_ROUTE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: u16,

    /// Apply the serving CRDs with server-side apply before starting
    #[arg(long)]
    install_crds: bool,

    /// Log output format (text or json)
    #[arg(long, env = "LATTICE_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            domain_config: None,
            concurrency: DEFAULT_CONCURRENCY,
            install_crds: false,
            log_format: LogFormat::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in serving_crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

fn serving_crds() -> [CustomResourceDefinition; 3] {
    [Route::crd(), Configuration::crd(), Revision::crd()]
}

/// Ensure the serving CRDs are installed
///
/// Uses server-side apply so the installed schema always matches this binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in serving_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All serving CRDs installed/updated");
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        format: args.log_format,
        filter: None,
    })?;

    let domains = match &args.domain_config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading domain config");
            DomainConfig::load(path)?
        }
        None => DomainConfig::default(),
    };

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crds {
        ensure_crds_installed(&client).await?;
    }

    tracing::info!("Starting Lattice route controller...");
    let controllers = build_route_controllers(client, domains, args.concurrency);

    // Reflectors never finish on their own; the controller returns on shutdown signal.
    let ((), finished, _) = futures::future::select_all(controllers).await;
    let name = controller_name(finished);
    if finished != ROUTE_CONTROLLER {
        tracing::error!(controller = name, "exited before the Route controller");
        anyhow::bail!("{name} exited unexpectedly");
    }

    tracing::info!(controller = name, "Shutting down");
    Ok(())
}
