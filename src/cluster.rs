//! Handle over a freshly provisioned cluster
//!
//! Hooks never see provisioning internals; they borrow a [`ClusterHandle`]
//! exposing the minimal surface they need: identity, network ranges, a
//! kubeconfig, and two flags. The handle outlives every hook in one
//! provisioning event and must not be shared across events.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Pod and service CIDR ranges of a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CidrRanges {
    /// Pod network range (e.g. "10.0.0.0/16")
    pub pod: String,
    /// Service cluster IP range (e.g. "10.1.0.0/16")
    pub service: String,
}

impl CidrRanges {
    /// Comma-joined form expected by the mesh proxy configuration
    pub fn include_ip_ranges(&self) -> String {
        format!("{},{}", self.pod, self.service)
    }
}

/// Capability surface a hook borrows for the duration of one invocation
///
/// Implemented by the provisioning subsystem; mocked in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Cluster identity
    fn name(&self) -> &str;

    /// Pod and service CIDR ranges
    ///
    /// Only consulted when a hook wants to bypass egress traffic. Failure is
    /// recoverable: callers log and proceed without the ranges.
    async fn pod_and_service_cidrs(&self) -> Result<CidrRanges>;

    /// Kubeconfig for the cluster, as raw YAML bytes
    ///
    /// Fatal if it fails; nothing downstream can proceed without it.
    async fn kubeconfig(&self) -> Result<Vec<u8>>;

    /// Whether the monitoring stack is enabled on this cluster
    fn monitoring_enabled(&self) -> bool;

    /// Whether a service mesh has been confirmed installed
    fn mesh_enabled(&self) -> bool;

    /// Record that the service mesh is (or is not) installed
    ///
    /// Called only after the mesh install is confirmed; this is the hook's
    /// durable outcome on the cluster object.
    fn set_mesh_enabled(&self, enabled: bool);
}

/// Concrete cluster handle backed by values the provisioning subsystem knows
///
/// The mesh flag is written at most once per event, by the mesh hook, and is
/// read-only afterwards; an atomic keeps the trait object `Sync` without a lock.
pub struct ProvisionedCluster {
    name: String,
    cidrs: Option<CidrRanges>,
    kubeconfig: Vec<u8>,
    monitoring: bool,
    mesh_enabled: AtomicBool,
}

impl ProvisionedCluster {
    /// Create a handle for a cluster with a known kubeconfig
    pub fn new(name: impl Into<String>, kubeconfig: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            cidrs: None,
            kubeconfig,
            monitoring: false,
            mesh_enabled: AtomicBool::new(false),
        }
    }

    /// Set the pod and service CIDR ranges, when the provisioner knows them
    pub fn with_cidrs(mut self, cidrs: CidrRanges) -> Self {
        self.cidrs = Some(cidrs);
        self
    }

    /// Mark the monitoring stack as enabled on this cluster
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring = enabled;
        self
    }
}

#[async_trait]
impl ClusterHandle for ProvisionedCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pod_and_service_cidrs(&self) -> Result<CidrRanges> {
        self.cidrs.clone().ok_or_else(|| {
            Error::dependency_lookup(format!(
                "pod and service CIDR ranges are not known for cluster {}",
                self.name
            ))
        })
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        if self.kubeconfig.is_empty() {
            return Err(Error::config(format!(
                "no kubeconfig available for cluster {}",
                self.name
            )));
        }
        Ok(self.kubeconfig.clone())
    }

    fn monitoring_enabled(&self) -> bool {
        self.monitoring
    }

    fn mesh_enabled(&self) -> bool {
        self.mesh_enabled.load(Ordering::SeqCst)
    }

    fn set_mesh_enabled(&self, enabled: bool) {
        self.mesh_enabled.store(enabled, Ordering::SeqCst);
    }
}
