//! Rigger - post-provisioning hook runner for freshly created Kubernetes clusters
//!
//! Rigger runs an ordered pipeline of named, parameterized actions ("hooks")
//! against a cluster right after it has been provisioned: installing a service
//! mesh, an ingress controller, a cluster autoscaler, and similar add-ons that
//! turn a bare control plane into a usable cluster.
//!
//! # Architecture
//!
//! A [`runner::ProvisioningEvent`] names a cluster and lists hook invocations
//! in the order they must run. The [`runner::HookRunner`] executes them
//! sequentially against a [`cluster::ClusterHandle`], stopping at the first
//! fatal error. Hooks deploy charts through the [`deploy::DeploymentInvoker`]
//! boundary and mutate cluster state through the [`k8s::ClusterApi`] boundary,
//! so both can be mocked in tests and swapped in production.
//!
//! # Modules
//!
//! - [`runner`] - Provisioning events and the sequential hook runner
//! - [`hook`] - The hook contract and the built-in hook set
//! - [`params`] - Binding of untyped hook parameters into typed structs
//! - [`cluster`] - Handle over a freshly provisioned cluster
//! - [`deploy`] - Chart deployment boundary (Helm-backed in production)
//! - [`k8s`] - Cluster API boundary (labeling, monitoring integrations)
//! - [`config`] - Chart coordinates and versions passed into hooks
//! - [`error`] - Error types and their fatal/recoverable classification

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod deploy;
pub mod error;
pub mod hook;
pub mod k8s;
pub mod params;
pub mod runner;

pub use error::{Error, Severity};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label applied to namespaces that should receive automatic sidecar injection
pub const SIDECAR_INJECTION_LABEL: &str = "istio-injection";

/// Value of the sidecar injection label
pub const SIDECAR_INJECTION_ENABLED: &str = "enabled";
