//! The delegating `imbalancer` policy
//!
//! Runs exactly one child policy chosen by name from its config, replaces
//! it when the name changes, and forwards everything else untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ImbalancerConfig, IMBALANCER_POLICY_NAME};
use crate::policy::{
    ChannelArgs, ChannelControlHelper, DelegatingParent, LoadBalancingPolicy, OrphanablePolicy,
    ParentOwningDelegatingHelper, PolicyArgs, PolicyError, UpdateArgs,
};
use crate::registry::PolicyRegistry;
use crate::serializer::WorkSerializer;

/// Part of the policy its child's helper keeps alive: only what is needed
/// to relay reports, never the child itself
pub struct ImbalancerCore {
    helper: Arc<dyn ChannelControlHelper>,
    shutting_down: AtomicBool,
}

impl DelegatingParent for ImbalancerCore {
    fn policy_name(&self) -> &str {
        IMBALANCER_POLICY_NAME
    }

    fn parent_helper(&self) -> &dyn ChannelControlHelper {
        self.helper.as_ref()
    }

    fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

/// Helper handed to every child
pub type ImbalancerHelper = ParentOwningDelegatingHelper<ImbalancerCore>;

struct ChildPolicy {
    name: String,
    policy: OrphanablePolicy,
}

pub struct ImbalancerLb {
    core: Arc<ImbalancerCore>,
    work_serializer: WorkSerializer,
    registry: Arc<PolicyRegistry>,
    child: Option<ChildPolicy>,
    shutting_down: bool,
}

impl ImbalancerLb {
    pub fn new(args: PolicyArgs) -> Self {
        Self {
            core: Arc::new(ImbalancerCore {
                helper: args.channel_control_helper,
                shutting_down: AtomicBool::new(false),
            }),
            work_serializer: args.work_serializer,
            registry: args.registry,
            child: None,
            shutting_down: false,
        }
    }

    /// Name of the running child, if any
    pub fn child_policy_name(&self) -> Option<&str> {
        self.child.as_ref().map(|c| c.name.as_str())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    fn create_child_policy(
        &self,
        name: &str,
        args: &ChannelArgs,
    ) -> Result<OrphanablePolicy, PolicyError> {
        let lb_args = PolicyArgs {
            work_serializer: self.work_serializer.clone(),
            channel_control_helper: Arc::new(ImbalancerHelper::new(Arc::clone(&self.core))),
            args: args.clone(),
            registry: Arc::clone(&self.registry),
        };
        self.registry
            .create_policy(name, lb_args)
            .map_err(|e| match e {
                PolicyError::ChildCreationFailed(_) => e,
                other => PolicyError::ChildCreationFailed(format!("{name}: {other}")),
            })
    }
}

impl LoadBalancingPolicy for ImbalancerLb {
    fn name(&self) -> &str {
        IMBALANCER_POLICY_NAME
    }

    fn update_locked(&mut self, args: UpdateArgs) -> Result<(), PolicyError> {
        if self.shutting_down {
            tracing::debug!("imbalancer: ignoring update after shutdown");
            return Ok(());
        }
        let (child_name, child_config) = {
            let config = args
                .config
                .as_deref()
                .and_then(|c| c.downcast_ref::<ImbalancerConfig>())
                .ok_or_else(|| {
                    PolicyError::InvalidConfiguration("imbalancer: missing config".to_string())
                })?;
            (config.child_policy_name().to_string(), config.child_config())
        };

        let needs_child = self
            .child
            .as_ref()
            .map_or(true, |current| current.name != child_name);
        if needs_child {
            if let Some(previous) = self.child.take() {
                tracing::info!(
                    previous = %previous.name,
                    next = %child_name,
                    "imbalancer: replacing child policy"
                );
                drop(previous);
            }
            let policy = self
                .create_child_policy(&child_name, &args.args)
                .inspect_err(|e| {
                    tracing::warn!(child = %child_name, error = %e, "imbalancer: child creation failed");
                })?;
            tracing::info!(child = %child_name, "imbalancer: created child policy");
            self.child = Some(ChildPolicy {
                name: child_name,
                policy,
            });
        }

        let Some(child) = self.child.as_mut() else {
            return Err(PolicyError::ChildCreationFailed(
                "imbalancer: no child policy".to_string(),
            ));
        };
        tracing::debug!(child = %child.name, "imbalancer: forwarding update");
        child.policy.update_locked(UpdateArgs {
            config: Some(child_config),
            ..args
        })
    }

    fn exit_idle_locked(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child.policy.exit_idle_locked();
        }
    }

    fn reset_backoff_locked(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child.policy.reset_backoff_locked();
        }
    }

    fn shutdown_locked(&mut self) {
        self.shutting_down = true;
        // Reports the child already queued on the serializer must not
        // reach the transport.
        self.core.shutting_down.store(true, Ordering::Release);
        if let Some(child) = self.child.take() {
            tracing::debug!(child = %child.name, "imbalancer: releasing child policy");
        }
    }
}
