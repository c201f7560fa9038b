//! Install-ingress-controller hook
//!
//! Deploys the ingress controller chart. When a base domain is supplied, the
//! controller's service is annotated so external-dns publishes a wildcard
//! record for it.

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

/// Parameters of the install-ingress-controller hook
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressControllerParams {
    /// Base domain to publish a wildcard DNS record for
    pub domain: Option<String>,
}

/// Hook that installs the ingress controller
pub struct InstallIngressController {
    config: ChartConfig,
    invoker: Arc<dyn DeploymentInvoker>,
}

impl InstallIngressController {
    /// Create the hook with its chart configuration and deployment boundary
    pub fn new(config: ChartConfig, invoker: Arc<dyn DeploymentInvoker>) -> Self {
        Self { config, invoker }
    }
}

/// Derive the controller chart values
fn build_values(params: &IngressControllerParams) -> serde_json::Value {
    let mut values = serde_json::json!({
        "controller": {
            "publishService": { "enabled": true },
            "watchIngressWithoutClass": true
        }
    });
    if let Some(domain) = &params.domain {
        values["controller"]["service"] = serde_json::json!({
            "annotations": {
                "external-dns.alpha.kubernetes.io/hostname": format!("*.{domain}")
            }
        });
    }
    values
}

#[async_trait]
impl Hook for InstallIngressController {
    fn name(&self) -> &'static str {
        "install-ingress-controller"
    }

    async fn run(&self, cluster: &dyn ClusterHandle, params: RawHookParams) -> Result<()> {
        let params: IngressControllerParams = params::bind(params)?;
        info!(cluster = %cluster.name(), ?params, "Installing ingress controller");

        let values = build_values(&params);
        let rendered = serde_yaml::to_string(&values)
            .map_err(|e| Error::serialization(format!("failed to render ingress values: {e}")))?;

        let spec = DeploymentSpec {
            chart: self.config.chart.clone(),
            release: self.config.release.clone(),
            namespace: self.config.namespace.clone(),
            values: rendered.into_bytes(),
            version: self.config.version.clone(),
            wait: false,
        };
        self.invoker.install(cluster, &spec).await?;

        info!(cluster = %cluster.name(), "Ingress controller installed");
        Ok(())
    }
}
