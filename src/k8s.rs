//! Cluster API boundary
//!
//! The post-deployment mutations a hook performs against the cluster itself:
//! labeling namespaces and registering monitoring integrations. Everything
//! goes through server-side apply with a fixed field manager, so every
//! operation is idempotent under re-invocation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::{Error, Result};

/// Field manager used for all server-side apply patches
const FIELD_MANAGER: &str = "rigger";

/// Namespace where the monitoring stack lives
const MONITORING_NAMESPACE: &str = "monitoring";

/// Mutations a hook performs against the cluster API after deployment
///
/// Each operation is idempotent under re-invocation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Apply a label to a namespace
    async fn label_namespace(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Register the mesh's metrics targets with the monitoring stack
    async fn register_metrics_targets(&self) -> Result<()>;

    /// Register the mesh's dashboards with the monitoring stack
    async fn register_dashboards(&self) -> Result<()>;
}

/// Constructs a [`ClusterApi`] from a cluster's kubeconfig
///
/// Hooks obtain the kubeconfig from their cluster handle mid-run, so client
/// construction is behind a trait and mockable like the client itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApiFactory: Send + Sync {
    /// Build a client for the cluster described by the kubeconfig bytes
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn ClusterApi>>;
}

/// Production factory backed by kube-rs
pub struct KubeApiFactory;

#[async_trait]
impl ClusterApiFactory for KubeApiFactory {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn ClusterApi>> {
        let yaml = std::str::from_utf8(kubeconfig)
            .map_err(|e| Error::config(format!("kubeconfig is not valid UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| Error::config(format!("failed to parse kubeconfig: {e}")))?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::config(format!("failed to load kubeconfig: {e}")))?;
        let client = Client::try_from(config)?;
        Ok(Box::new(KubeClusterApi { client }))
    }
}

/// Production [`ClusterApi`] backed by a kube-rs client
pub struct KubeClusterApi {
    client: Client,
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn label_namespace(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": namespace,
                "labels": { key: value }
            }
        });
        let params = PatchParams::apply(FIELD_MANAGER).force();
        namespaces
            .patch(namespace, &params, &Patch::Apply(&patch))
            .await
            .map_err(|e| {
                Error::labeling(format!("failed to label namespace {namespace}: {e}"))
            })?;
        info!(namespace, label = %format!("{key}={value}"), "Labeled namespace");
        Ok(())
    }

    async fn register_metrics_targets(&self) -> Result<()> {
        self.apply_configmap(metrics_targets_configmap(), "metrics targets")
            .await
    }

    async fn register_dashboards(&self) -> Result<()> {
        self.apply_configmap(dashboards_configmap(), "dashboards").await
    }
}

impl KubeClusterApi {
    async fn apply_configmap(&self, configmap: ConfigMap, what: &str) -> Result<()> {
        let name = configmap
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::integration(format!("{what} configmap has no name")))?;
        let configmaps: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), MONITORING_NAMESPACE);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        configmaps
            .patch(&name, &params, &Patch::Apply(&configmap))
            .await
            .map_err(|e| Error::integration(format!("failed to register mesh {what}: {e}")))?;
        info!(configmap = %name, "Registered mesh {what} with monitoring stack");
        Ok(())
    }
}

fn monitoring_configmap(
    name: &str,
    label: (&str, &str),
    data: std::collections::BTreeMap<String, String>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(MONITORING_NAMESPACE.to_string()),
            labels: Some(std::collections::BTreeMap::from([(
                label.0.to_string(),
                label.1.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// ConfigMap announcing the mesh's scrape targets to the monitoring stack
///
/// The monitoring stack watches ConfigMaps labeled `rigger.io/scrape-config`
/// in its own namespace and merges them into its scrape configuration.
fn metrics_targets_configmap() -> ConfigMap {
    let scrape_config = r#"- job_name: istio-mesh
  kubernetes_sd_configs:
    - role: endpoints
      namespaces:
        names:
          - istio-system
  relabel_configs:
    - source_labels: [__meta_kubernetes_service_name, __meta_kubernetes_endpoint_port_name]
      action: keep
      regex: istio-telemetry;prometheus
- job_name: istio-pilot
  kubernetes_sd_configs:
    - role: endpoints
      namespaces:
        names:
          - istio-system
  relabel_configs:
    - source_labels: [__meta_kubernetes_service_name, __meta_kubernetes_endpoint_port_name]
      action: keep
      regex: istio-pilot;http-monitoring
"#;
    monitoring_configmap(
        "istio-mesh-metrics",
        ("rigger.io/scrape-config", "true"),
        std::collections::BTreeMap::from([(
            "istio-mesh.yaml".to_string(),
            scrape_config.to_string(),
        )]),
    )
}

/// ConfigMap carrying the mesh dashboards for the monitoring stack
///
/// Dashboards labeled `grafana_dashboard` are picked up by the dashboard
/// sidecar shipped with the monitoring chart.
fn dashboards_configmap() -> ConfigMap {
    let dashboard = serde_json::json!({
        "title": "Istio Mesh",
        "uid": "istio-mesh",
        "tags": ["istio", "rigger"],
        "panels": [
            { "title": "Global Request Volume", "type": "stat",
              "targets": [{ "expr": "round(sum(irate(istio_requests_total[1m])), 0.001)" }] },
            { "title": "Global Success Rate", "type": "stat",
              "targets": [{ "expr": "sum(rate(istio_requests_total{response_code!~\"5.*\"}[1m])) / sum(rate(istio_requests_total[1m]))" }] }
        ]
    });
    monitoring_configmap(
        "istio-mesh-dashboards",
        ("grafana_dashboard", "1"),
        std::collections::BTreeMap::from([(
            "istio-mesh.json".to_string(),
            dashboard.to_string(),
        )]),
    )
}
