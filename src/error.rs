//! Error types for post-provisioning hooks
//!
//! Every hook stage has its own error variant so a failure always names the
//! phase it came from. Each variant carries a fixed [`Severity`] that drives
//! the runner's abort decision: the classification lives here, in one table,
//! rather than at individual call sites.

use thiserror::Error;

/// How the runner must react to an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Abort the current provisioning event; remaining hooks do not run
    Fatal,
    /// Log and continue; the hook or event proceeds in degraded mode
    Recoverable,
}

/// Main error type for hook execution
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Raw hook parameters could not be bound to their typed form
    #[error("parameter binding error: {0}")]
    Binding(String),

    /// Hook or chart configuration is invalid or missing
    #[error("configuration error: {0}")]
    Config(String),

    /// Serializing a derived value (chart values, manifests) failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Chart deployment failed
    #[error("installing {chart} (release {release}) failed: {message}")]
    Deployment {
        /// Chart reference that was being installed
        chart: String,
        /// Release name of the failed install
        release: String,
        /// Underlying failure reported by the deployment subsystem
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Namespace labeling failed
    #[error("labeling error: {0}")]
    Labeling(String),

    /// Registering a monitoring integration (metrics targets, dashboards) failed
    #[error("integration registration error: {0}")]
    Integration(String),

    /// A best-effort dependency lookup (e.g. cluster CIDR ranges) failed
    #[error("dependency lookup error: {0}")]
    DependencyLookup(String),

    /// A hook failed; wraps the underlying stage error with the hook identity
    #[error("hook {hook} failed: {source}")]
    HookFailed {
        /// Name of the failing hook
        hook: String,
        /// The stage error that aborted the hook
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a binding error with the given message
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a labeling error with the given message
    pub fn labeling(msg: impl Into<String>) -> Self {
        Self::Labeling(msg.into())
    }

    /// Create an integration registration error with the given message
    pub fn integration(msg: impl Into<String>) -> Self {
        Self::Integration(msg.into())
    }

    /// Create a dependency lookup error with the given message
    pub fn dependency_lookup(msg: impl Into<String>) -> Self {
        Self::DependencyLookup(msg.into())
    }

    /// Wrap a stage error with the identity of the hook it aborted
    pub fn hook_failed(hook: impl Into<String>, source: Error) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            source: Box::new(source),
        }
    }

    /// The severity table driving the runner's abort decision
    ///
    /// Only dependency lookups are recoverable: a missing CIDR range degrades
    /// a feature, everything else leaves the cluster in a state the operator
    /// must see. A wrapped hook failure inherits the severity of its cause.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DependencyLookup(_) => Severity::Recoverable,
            Self::HookFailed { source, .. } => source.severity(),
            _ => Severity::Fatal,
        }
    }
}
