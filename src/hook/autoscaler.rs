//! Install-cluster-autoscaler hook
//!
//! Deploys the cluster-autoscaler chart when the provisioning request asks
//! for node autoscaling. An invocation without bounds is not an error: it
//! means autoscaling was not requested, and the hook succeeds without
//! deploying anything.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::Hook;
use crate::cluster::ClusterHandle;
use crate::config::ChartConfig;
use crate::deploy::{DeploymentInvoker, DeploymentSpec};
use crate::params::{self, RawHookParams};
use crate::{Error, Result};

/// Parameters of the install-cluster-autoscaler hook
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterAutoscalerParams {
    /// Minimum node count of the default pool
    pub min_nodes: Option<u32>,
    /// Maximum node count of the default pool
    pub max_nodes: Option<u32>,
}

impl ClusterAutoscalerParams {
    /// Validated scaling bounds, or `None` when autoscaling was not requested
    fn bounds(&self) -> Result<Option<(u32, u32)>> {
        match (self.min_nodes, self.max_nodes) {
            (None, None) => Ok(None),
            (Some(min), Some(max)) if min <= max => Ok(Some((min, max))),
            (Some(min), Some(max)) => Err(Error::binding(format!(
                "minNodes ({min}) must not exceed maxNodes ({max})"
            ))),
            _ => Err(Error::binding(
                "minNodes and maxNodes must be set together",
            )),
        }
    }
}

/// Hook that installs the cluster autoscaler
pub struct InstallClusterAutoscaler {
    config: ChartConfig,
    invoker: Arc<dyn DeploymentInvoker>,
}

impl InstallClusterAutoscaler {
    /// Create the hook with its chart configuration and deployment boundary
    pub fn new(config: ChartConfig, invoker: Arc<dyn DeploymentInvoker>) -> Self {
        Self { config, invoker }
    }
}

/// Derive the autoscaler chart values for the cluster's default node pool
fn build_values(cluster_name: &str, min: u32, max: u32) -> serde_json::Value {
    serde_json::json!({
        "autoDiscovery": { "clusterName": cluster_name },
        "extraArgs": {
            "nodes": format!("{min}:{max}:default-pool"),
            "skip-nodes-with-local-storage": false
        }
    })
}

#[async_trait]
impl Hook for InstallClusterAutoscaler {
    fn name(&self) -> &'static str {
        "install-cluster-autoscaler"
    }

    async fn run(&self, cluster: &dyn ClusterHandle, params: RawHookParams) -> Result<()> {
        let params: ClusterAutoscalerParams = params::bind(params)?;

        let Some((min, max)) = params.bounds()? else {
            info!(cluster = %cluster.name(), "Autoscaling not requested, skipping autoscaler install");
            return Ok(());
        };
        info!(cluster = %cluster.name(), min, max, "Installing cluster autoscaler");

        let values = build_values(cluster.name(), min, max);
        let rendered = serde_yaml::to_string(&values).map_err(|e| {
            Error::serialization(format!("failed to render autoscaler values: {e}"))
        })?;

        let spec = DeploymentSpec {
            chart: self.config.chart.clone(),
            release: self.config.release.clone(),
            namespace: self.config.namespace.clone(),
            values: rendered.into_bytes(),
            version: self.config.version.clone(),
            wait: false,
        };
        self.invoker.install(cluster, &spec).await?;

        info!(cluster = %cluster.name(), "Cluster autoscaler installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::cluster::MockClusterHandle;
    use crate::config::Charts;
    use crate::deploy::MockDeploymentInvoker;

    fn named_cluster() -> MockClusterHandle {
        let mut cluster = MockClusterHandle::new();
        cluster.expect_name().return_const("test-cluster".to_string());
        cluster
    }

    fn hook(invoker: MockDeploymentInvoker) -> InstallClusterAutoscaler {
        InstallClusterAutoscaler::new(Charts::builtin().autoscaler, Arc::new(invoker))
    }

    #[tokio::test]
    async fn no_bounds_means_no_install_and_success() {
        let mut invoker = MockDeploymentInvoker::new();
        invoker.expect_install().times(0);

        hook(invoker).run(&named_cluster(), json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn bounds_drive_the_node_pool_argument() {
        let mut invoker = MockDeploymentInvoker::new();
        invoker
            .expect_install()
            .withf(|_, spec| {
                let values = String::from_utf8(spec.values.clone()).unwrap();
                values.contains("1:5:default-pool") && values.contains("clusterName: test-cluster")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        hook(invoker)
            .run(&named_cluster(), json!({"minNodes": 1, "maxNodes": 5}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inverted_bounds_are_a_binding_error() {
        let mut invoker = MockDeploymentInvoker::new();
        invoker.expect_install().times(0);

        let err = hook(invoker)
            .run(&named_cluster(), json!({"minNodes": 5, "maxNodes": 1}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[tokio::test]
    async fn half_specified_bounds_are_a_binding_error() {
        let mut invoker = MockDeploymentInvoker::new();
        invoker.expect_install().times(0);

        let err = hook(invoker)
            .run(&named_cluster(), json!({"maxNodes": 4}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("set together"));
    }
}
