//! The hook contract and the built-in hook set
//!
//! A hook is a named, state-free unit of post-provisioning work. Hooks are an
//! open set: the runner looks them up by name in a [`HookSet`] and stays
//! agnostic to how many exist or what they do. Every hook is pure
//! orchestration over the deployment and cluster API boundaries; no chart
//! authoring lives here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::ClusterHandle;
use crate::config::Charts;
use crate::deploy::DeploymentInvoker;
use crate::k8s::ClusterApiFactory;
use crate::params::RawHookParams;
use crate::Result;

mod autoscaler;
mod ingress;
mod mesh;

pub use autoscaler::{ClusterAutoscalerParams, InstallClusterAutoscaler};
pub use ingress::{IngressControllerParams, InstallIngressController};
pub use mesh::{InstallServiceMesh, ServiceMeshParams};

/// A named unit of post-provisioning work
///
/// Implementations bind their raw parameters, derive a deployment
/// configuration from cluster state, invoke the deployment boundary, and
/// perform post-deployment cluster mutations. A hook reports its outcome
/// through the returned `Result`; it never corrupts cluster state on partial
/// failure beyond what it documents.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Stable name the runner resolves invocations against
    fn name(&self) -> &'static str;

    /// Run the hook once against the given cluster
    async fn run(&self, cluster: &dyn ClusterHandle, params: RawHookParams) -> Result<()>;
}

/// Ordered, name-addressable collection of hooks
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookSet {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook to the set
    pub fn register(mut self, hook: Box<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Look up a hook by name
    pub fn get(&self, name: &str) -> Option<&dyn Hook> {
        self.hooks
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Names of all registered hooks, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// The built-in hooks, wired to the given collaborators
    pub fn builtin(
        charts: Charts,
        invoker: Arc<dyn DeploymentInvoker>,
        api: Arc<dyn ClusterApiFactory>,
    ) -> Self {
        Self::new()
            .register(Box::new(InstallServiceMesh::new(
                charts.mesh,
                invoker.clone(),
                api,
            )))
            .register(Box::new(InstallIngressController::new(
                charts.ingress,
                invoker.clone(),
            )))
            .register(Box::new(InstallClusterAutoscaler::new(
                charts.autoscaler,
                invoker,
            )))
    }
}
