//! Install-service-mesh hook
//!
//! Deploys the Istio control plane chart, labels namespaces for automatic
//! sidecar injection, and wires the mesh into the monitoring stack when the
//! cluster has monitoring enabled. The cluster's mesh-enabled flag is only
//! set after every prior step has succeeded; it witnesses a completed
//! install, it is never set speculatively.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Hook;
use crate::cluster::ClusterHandle;
use crate::config::ChartConfig;
use crate::deploy::{DeploymentInvoker, DeploymentSpec};
use crate::k8s::ClusterApiFactory;
use crate::params::{self, RawHookParams};
use crate::{Error, Result, SIDECAR_INJECTION_ENABLED, SIDECAR_INJECTION_LABEL};

/// Parameters of the install-service-mesh hook
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMeshParams {
    /// Namespaces to label with `istio-injection=enabled`
    pub auto_sidecar_inject_namespaces: Vec<String>,
    /// Prevent sidecars from intercepting requests to destinations outside
    /// the cluster, by limiting interception to the cluster's CIDR ranges
    pub bypass_egress_traffic: bool,
    /// Enable mutual TLS inside the mesh
    #[serde(rename = "mtls")]
    pub enable_mtls: bool,
}

/// Values document for the mesh chart
#[derive(Debug, Default, Serialize)]
struct MeshValues {
    global: GlobalValues,
}

#[derive(Debug, Default, Serialize)]
struct GlobalValues {
    mtls: MtlsValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<ProxyValues>,
}

#[derive(Debug, Default, Serialize)]
struct MtlsValues {
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ProxyValues {
    #[serde(rename = "includeIPRanges")]
    include_ip_ranges: String,
}

/// Hook that installs the service mesh control plane
pub struct InstallServiceMesh {
    config: ChartConfig,
    invoker: Arc<dyn DeploymentInvoker>,
    api: Arc<dyn ClusterApiFactory>,
}

impl InstallServiceMesh {
    /// Create the hook with its chart configuration and collaborators
    pub fn new(
        config: ChartConfig,
        invoker: Arc<dyn DeploymentInvoker>,
        api: Arc<dyn ClusterApiFactory>,
    ) -> Self {
        Self {
            config,
            invoker,
            api,
        }
    }

    /// Derive the chart values from bound parameters and cluster state
    ///
    /// A failed CIDR lookup degrades rather than aborts: the proxy section is
    /// omitted entirely and sidecars will intercept all traffic.
    async fn build_values(
        &self,
        cluster: &dyn ClusterHandle,
        params: &ServiceMeshParams,
    ) -> MeshValues {
        let mut values = MeshValues {
            global: GlobalValues {
                mtls: MtlsValues {
                    enabled: params.enable_mtls,
                },
                proxy: None,
            },
        };

        if params.bypass_egress_traffic {
            match cluster.pod_and_service_cidrs().await {
                Ok(ranges) => {
                    values.global.proxy = Some(ProxyValues {
                        include_ip_ranges: ranges.include_ip_ranges(),
                    });
                }
                Err(e) => warn!(
                    cluster = %cluster.name(),
                    error = %e,
                    "Could not resolve cluster CIDR ranges; sidecars will intercept external requests"
                ),
            }
        }

        values
    }
}

#[async_trait]
impl Hook for InstallServiceMesh {
    fn name(&self) -> &'static str {
        "install-service-mesh"
    }

    async fn run(&self, cluster: &dyn ClusterHandle, params: RawHookParams) -> Result<()> {
        let params: ServiceMeshParams = params::bind(params)?;
        info!(cluster = %cluster.name(), ?params, "Installing service mesh");

        let values = self.build_values(cluster, &params).await;
        let rendered = serde_yaml::to_string(&values)
            .map_err(|e| Error::serialization(format!("failed to render mesh values: {e}")))?;

        let spec = DeploymentSpec {
            chart: self.config.chart.clone(),
            release: self.config.release.clone(),
            namespace: self.config.namespace.clone(),
            values: rendered.into_bytes(),
            version: self.config.version.clone(),
            // Install is asynchronous; readiness is not polled by this hook
            wait: false,
        };
        self.invoker.install(cluster, &spec).await?;

        let kubeconfig = cluster.kubeconfig().await?;
        let api = self.api.connect(&kubeconfig).await?;

        for namespace in &params.auto_sidecar_inject_namespaces {
            api.label_namespace(namespace, SIDECAR_INJECTION_LABEL, SIDECAR_INJECTION_ENABLED)
                .await?;
        }

        if cluster.monitoring_enabled() {
            api.register_metrics_targets().await?;
            api.register_dashboards().await?;
        }

        cluster.set_mesh_enabled(true);
        info!(cluster = %cluster.name(), "Service mesh installed");
        Ok(())
    }
}
