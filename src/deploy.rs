//! Chart deployment boundary
//!
//! Hooks never author charts; they derive a [`DeploymentSpec`] and hand it to
//! a [`DeploymentInvoker`]. The production invoker shells out to
//! `helm upgrade --install`, which gives the two properties the hook contract
//! needs: the target namespace is created if absent, and re-invocation with
//! identical inputs upgrades in place instead of failing.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::cluster::ClusterHandle;
use crate::{Error, Result};

/// Ephemeral description of one chart deployment
///
/// Derived inside a hook from cluster state and hook parameters; not persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentSpec {
    /// Chart reference, `repository/name`
    pub chart: String,
    /// Release name
    pub release: String,
    /// Target namespace (created if absent)
    pub namespace: String,
    /// Serialized values document for the chart
    pub values: Vec<u8>,
    /// Chart version to install
    pub version: String,
    /// Whether to block until the workload reports ready
    pub wait: bool,
}

/// External collaborator that turns a values payload into a running workload
///
/// Must be idempotent with respect to re-invocation with identical inputs,
/// since the surrounding provisioning workflow may retry whole events.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentInvoker: Send + Sync {
    /// Install or upgrade a chart release on the given cluster
    async fn install<'a>(
        &self,
        cluster: &'a (dyn ClusterHandle + 'a),
        spec: &DeploymentSpec,
    ) -> Result<()>;
}

/// Helm-backed deployment invoker
pub struct HelmInvoker;

impl HelmInvoker {
    /// Create a new invoker
    pub fn new() -> Self {
        Self
    }
}

impl Default for HelmInvoker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the helm argument list for a deployment spec
///
/// Values are passed on stdin (`-f -`); the kubeconfig path points at the
/// target cluster.
fn helm_args(spec: &DeploymentSpec, kubeconfig_path: &Path) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        spec.release.clone(),
        spec.chart.clone(),
        "--namespace".to_string(),
        spec.namespace.clone(),
        "--create-namespace".to_string(),
        "--version".to_string(),
        spec.version.clone(),
        "--kubeconfig".to_string(),
        kubeconfig_path.display().to_string(),
        "-f".to_string(),
        "-".to_string(),
    ];
    if spec.wait {
        args.push("--wait".to_string());
    }
    args
}

/// Create the temp file holding the target cluster's kubeconfig
///
/// Unique per invocation: two concurrent installs, or a retried event racing
/// a stale run, must never share a kubeconfig path. The file is removed when
/// the handle drops.
fn kubeconfig_tempfile(cluster: &str, release: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("{cluster}-{release}-kubeconfig-"))
        .tempfile()
}

#[async_trait]
impl DeploymentInvoker for HelmInvoker {
    async fn install<'a>(
        &self,
        cluster: &'a (dyn ClusterHandle + 'a),
        spec: &DeploymentSpec,
    ) -> Result<()> {
        let kubeconfig = cluster.kubeconfig().await?;
        let kubeconfig_file = kubeconfig_tempfile(cluster.name(), &spec.release)
            .map_err(|e| deployment_error(spec, format!("failed to create kubeconfig file: {e}")))?;
        tokio::fs::write(kubeconfig_file.path(), &kubeconfig)
            .await
            .map_err(|e| deployment_error(spec, format!("failed to write kubeconfig: {e}")))?;

        info!(
            chart = %spec.chart,
            release = %spec.release,
            namespace = %spec.namespace,
            version = %spec.version,
            "Installing chart release"
        );

        let mut child = Command::new("helm")
            .args(helm_args(spec, kubeconfig_file.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| deployment_error(spec, format!("failed to run helm: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&spec.values)
                .await
                .map_err(|e| deployment_error(spec, format!("failed to pipe values to helm: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| deployment_error(spec, format!("failed to run helm: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(deployment_error(spec, stderr.trim().to_string()));
        }

        info!(release = %spec.release, "Chart release installed");
        Ok(())
    }
}

/// Wrap a deployment failure with the chart and release it concerned
pub fn deployment_error(spec: &DeploymentSpec, message: impl Into<String>) -> Error {
    Error::Deployment {
        chart: spec.chart.clone(),
        release: spec.release.clone(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            chart: "rigger-stable/istio".to_string(),
            release: "istio".to_string(),
            namespace: "istio-system".to_string(),
            values: b"global:\n  mtls:\n    enabled: true\n".to_vec(),
            version: "1.1.8".to_string(),
            wait: false,
        }
    }

    #[test]
    fn helm_args_install_into_namespace_with_pinned_version() {
        let args = helm_args(&spec(), Path::new("/tmp/kc"));
        assert_eq!(args[0], "upgrade");
        assert!(args.contains(&"--install".to_string()));
        assert!(args.contains(&"istio".to_string()));
        assert!(args.contains(&"rigger-stable/istio".to_string()));
        assert!(args.contains(&"--create-namespace".to_string()));

        let version_idx = args.iter().position(|a| a == "--version").unwrap();
        assert_eq!(args[version_idx + 1], "1.1.8");
    }

    #[test]
    fn helm_args_wait_flag_is_opt_in() {
        assert!(!helm_args(&spec(), Path::new("/tmp/kc")).contains(&"--wait".to_string()));

        let mut waiting = spec();
        waiting.wait = true;
        assert!(helm_args(&waiting, Path::new("/tmp/kc")).contains(&"--wait".to_string()));
    }

    #[test]
    fn kubeconfig_files_are_unique_per_invocation() {
        let first = kubeconfig_tempfile("prod-eu-1", "istio").unwrap();
        let second = kubeconfig_tempfile("prod-eu-1", "istio").unwrap();

        assert_ne!(first.path(), second.path());
        let name = first.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("prod-eu-1-istio-kubeconfig-"));
    }

    #[tokio::test]
    async fn install_surfaces_kubeconfig_failures_before_running_helm() {
        let mut cluster = crate::cluster::MockClusterHandle::new();
        cluster
            .expect_kubeconfig()
            .returning(|| Err(crate::Error::config("kubeconfig not yet written")));

        let err = HelmInvoker::new()
            .install(&cluster, &spec())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kubeconfig not yet written"));
    }

    #[test]
    fn deployment_errors_name_the_chart_and_release() {
        let err = deployment_error(&spec(), "no such chart");
        assert!(err.to_string().contains("rigger-stable/istio"));
        assert!(err.to_string().contains("release istio"));
        assert!(err.to_string().contains("no such chart"));
    }
}
