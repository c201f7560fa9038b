//! Provisioning events and the sequential hook runner
//!
//! One event, one cluster, one logical thread of control: hooks run strictly
//! in declared order because later hooks may read durable outcomes written by
//! earlier ones, and the deployment boundary is not guaranteed safe for
//! concurrent installs into the same namespace. The runner stops at the first
//! fatal error and does not roll back prior hooks' effects; deployment side
//! effects are not transactional, and that is a documented limitation.

use serde::Deserialize;
use tracing::{info, warn};

use crate::cluster::ClusterHandle;
use crate::hook::HookSet;
use crate::params::RawHookParams;
use crate::{Error, Result, Severity};

/// One hook invocation within a provisioning event
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInvocation {
    /// Name of the hook to run
    pub name: String,
    /// Untyped parameters handed to the hook's binder
    #[serde(default)]
    pub params: RawHookParams,
}

/// A cluster plus the ordered hooks to run against it
///
/// Immutable once the runner begins executing it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningEvent {
    /// Identity of the freshly created cluster
    pub cluster: String,
    /// Hook invocations, in the order they must run
    #[serde(default)]
    pub hooks: Vec<HookInvocation>,
}

impl ProvisioningEvent {
    /// Parse an event from its YAML representation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid provisioning event: {e}")))
    }
}

/// Executes a provisioning event's hooks in declared order
pub struct HookRunner {
    hooks: HookSet,
}

impl HookRunner {
    /// Create a runner over the given hook set
    pub fn new(hooks: HookSet) -> Self {
        Self { hooks }
    }

    /// Run every hook of the event against the cluster, in order
    ///
    /// Stops at the first fatal error and returns it wrapped with the failing
    /// hook's identity. Recoverable hook outcomes are logged and the event
    /// continues. Prior hooks' effects are never rolled back.
    pub async fn run(&self, event: &ProvisioningEvent, cluster: &dyn ClusterHandle) -> Result<()> {
        for invocation in &event.hooks {
            let hook = self.hooks.get(&invocation.name).ok_or_else(|| {
                Error::hook_failed(
                    &invocation.name,
                    Error::config(format!("unknown hook: {}", invocation.name)),
                )
            })?;

            info!(
                cluster = %event.cluster,
                hook = %invocation.name,
                "Running post-provisioning hook"
            );
            match hook.run(cluster, invocation.params.clone()).await {
                Ok(()) => {}
                Err(e) if e.severity() == Severity::Recoverable => {
                    warn!(
                        cluster = %event.cluster,
                        hook = %invocation.name,
                        error = %e,
                        "Hook degraded, continuing with remaining hooks"
                    );
                }
                Err(e) => return Err(Error::hook_failed(&invocation.name, e)),
            }
        }

        info!(cluster = %event.cluster, hooks = event.hooks.len(), "Provisioning event complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::cluster::MockClusterHandle;
    use crate::hook::Hook;

    /// Call log shared between scripted hooks
    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    /// Scripted hook that records its invocation in a shared log
    ///
    /// A plain test implementation rather than a mockall mock: the runner
    /// tests care about ordering across several hooks, which is simplest to
    /// observe with a shared log.
    struct ScriptedHook {
        name: &'static str,
        outcome: Option<fn() -> Error>,
        log: CallLog,
    }

    impl ScriptedHook {
        fn ok(name: &'static str, log: &CallLog) -> Box<Self> {
            Box::new(Self {
                name,
                outcome: None,
                log: log.clone(),
            })
        }

        fn failing(name: &'static str, error: fn() -> Error, log: &CallLog) -> Box<Self> {
            Box::new(Self {
                name,
                outcome: Some(error),
                log: log.clone(),
            })
        }
    }

    #[async_trait]
    impl Hook for ScriptedHook {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _cluster: &dyn ClusterHandle, _params: RawHookParams) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            match self.outcome {
                None => Ok(()),
                Some(error) => Err(error()),
            }
        }
    }

    fn event(hook_names: &[&str]) -> ProvisioningEvent {
        ProvisioningEvent {
            cluster: "test-cluster".to_string(),
            hooks: hook_names
                .iter()
                .map(|name| HookInvocation {
                    name: name.to_string(),
                    params: json!({}),
                })
                .collect(),
        }
    }

    // ==========================================================================
    // Story: Hooks Run in Declared Order
    // ==========================================================================

    #[tokio::test]
    async fn hooks_run_in_declared_order_not_registration_order() {
        let log: CallLog = Arc::default();
        let hooks = HookSet::new()
            .register(ScriptedHook::ok("mesh", &log))
            .register(ScriptedHook::ok("ingress", &log));

        let runner = HookRunner::new(hooks);
        runner
            .run(&event(&["ingress", "mesh"]), &MockClusterHandle::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["ingress", "mesh"]);
    }

    // ==========================================================================
    // Story: First Fatal Error Aborts the Event
    // ==========================================================================

    #[tokio::test]
    async fn first_fatal_error_stops_remaining_hooks() {
        let log: CallLog = Arc::default();
        let hooks = HookSet::new()
            .register(ScriptedHook::ok("first", &log))
            .register(ScriptedHook::failing(
                "second",
                || Error::labeling("patch denied"),
                &log,
            ))
            .register(ScriptedHook::ok("third", &log));

        let runner = HookRunner::new(hooks);
        let err = runner
            .run(&event(&["first", "second", "third"]), &MockClusterHandle::new())
            .await
            .unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert!(err.to_string().contains("hook second failed"));
        assert!(err.to_string().contains("patch denied"));
    }

    #[tokio::test]
    async fn recoverable_hook_outcomes_do_not_stop_the_event() {
        let log: CallLog = Arc::default();
        let hooks = HookSet::new()
            .register(ScriptedHook::failing(
                "degraded",
                || Error::dependency_lookup("cidrs unknown"),
                &log,
            ))
            .register(ScriptedHook::ok("after", &log));

        let runner = HookRunner::new(hooks);
        runner
            .run(&event(&["degraded", "after"]), &MockClusterHandle::new())
            .await
            .expect("recoverable outcome continues the event");

        assert_eq!(*log.lock().unwrap(), vec!["degraded", "after"]);
    }

    #[tokio::test]
    async fn unknown_hook_names_fail_the_event() {
        let runner = HookRunner::new(HookSet::new());
        let err = runner
            .run(&event(&["no-such-hook"]), &MockClusterHandle::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown hook: no-such-hook"));
    }

    #[tokio::test]
    async fn an_event_with_no_hooks_is_a_no_op() {
        let runner = HookRunner::new(HookSet::new());
        runner
            .run(&event(&[]), &MockClusterHandle::new())
            .await
            .unwrap();
    }

    // ==========================================================================
    // Story: Event Files
    // ==========================================================================

    #[test]
    fn events_parse_from_yaml_with_optional_params() {
        let event = ProvisioningEvent::from_yaml(
            r#"
cluster: prod-eu-1
hooks:
  - name: install-service-mesh
    params:
      mtls: true
      autoSidecarInjectNamespaces: [default]
  - name: install-ingress-controller
"#,
        )
        .unwrap();

        assert_eq!(event.cluster, "prod-eu-1");
        assert_eq!(event.hooks.len(), 2);
        assert_eq!(event.hooks[0].name, "install-service-mesh");
        assert_eq!(event.hooks[0].params["mtls"], serde_json::json!(true));
        // Absent params arrive as null and bind to defaults
        assert!(event.hooks[1].params.is_null());
    }

    #[test]
    fn malformed_event_files_are_config_errors() {
        let err = ProvisioningEvent::from_yaml("hooks: {not: a list}").unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }
}
