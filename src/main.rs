//! Rigger - runs post-provisioning hooks against a freshly created cluster

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rigger::cluster::{CidrRanges, ProvisionedCluster};
use rigger::config::Charts;
use rigger::deploy::HelmInvoker;
use rigger::hook::HookSet;
use rigger::k8s::KubeApiFactory;
use rigger::runner::{HookRunner, ProvisioningEvent};

/// Rigger - post-provisioning hook runner for freshly created Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "rigger", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a provisioning event against a cluster
    ///
    /// Reads the event file, builds a handle for the target cluster, and
    /// executes the listed hooks in order. Exits non-zero on the first
    /// fatal hook failure.
    Run(RunArgs),

    /// List the built-in hooks
    Hooks,
}

/// Run mode arguments
#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the provisioning event YAML file
    #[arg(short = 'f', long = "event")]
    event_file: PathBuf,

    /// Path to the kubeconfig of the freshly created cluster
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: PathBuf,

    /// Optional charts file overriding the built-in chart coordinates
    #[arg(long)]
    charts: Option<PathBuf>,

    /// Pod network CIDR, when the provisioner knows it
    #[arg(long)]
    pod_cidr: Option<String>,

    /// Service network CIDR, when the provisioner knows it
    #[arg(long)]
    service_cidr: Option<String>,

    /// Whether the monitoring stack is enabled on the cluster
    #[arg(long)]
    monitoring: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_event(args).await,
        Commands::Hooks => {
            let hooks = HookSet::builtin(
                Charts::builtin(),
                Arc::new(HelmInvoker::new()),
                Arc::new(KubeApiFactory),
            );
            for name in hooks.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn run_event(args: RunArgs) -> anyhow::Result<()> {
    let event_yaml = tokio::fs::read_to_string(&args.event_file).await?;
    let event = ProvisioningEvent::from_yaml(&event_yaml)?;

    let charts = match &args.charts {
        Some(path) => Charts::from_yaml(&tokio::fs::read_to_string(path).await?)?,
        None => Charts::builtin(),
    };

    let kubeconfig = tokio::fs::read(&args.kubeconfig).await?;
    let mut cluster =
        ProvisionedCluster::new(event.cluster.clone(), kubeconfig).with_monitoring(args.monitoring);
    if let (Some(pod), Some(service)) = (args.pod_cidr, args.service_cidr) {
        cluster = cluster.with_cidrs(CidrRanges { pod, service });
    }

    let hooks = HookSet::builtin(charts, Arc::new(HelmInvoker::new()), Arc::new(KubeApiFactory));
    HookRunner::new(hooks).run(&event, &cluster).await?;
    Ok(())
}
