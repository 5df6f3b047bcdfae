//! Transport-side owner of a top-level policy
//!
//! # Responsibilities
//! - Parse LB configs through the registry
//! - Run every policy operation on the connection's work serializer
//! - Publish the latest connectivity state and picker to callers

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::policy::{
    ChannelArgs, ChannelControlHelper, ConnectivityState, LoadBalancingConfig, OrphanablePolicy,
    PickArgs, PickResult, Picker, PolicyArgs, PolicyError, QueuePicker, ServerAddress,
    TraceSeverity, UpdateArgs,
};
use crate::registry::PolicyRegistry;
use crate::serializer::{SerializerError, WorkSerializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Serializer(#[from] SerializerError),

    #[error("Policy host is shut down")]
    ShutDown,
}

/// Latest state published by the policy
#[derive(Clone)]
pub struct ChannelState {
    pub connectivity: ConnectivityState,
    pub status: Result<(), PolicyError>,
    pub picker: Arc<dyn Picker>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            connectivity: ConnectivityState::Idle,
            status: Ok(()),
            picker: Arc::new(QueuePicker),
        }
    }
}

impl fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelState")
            .field("connectivity", &self.connectivity)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Helper given to the top-level policy
struct HostHelper {
    authority: String,
    state_tx: watch::Sender<ChannelState>,
    reresolution_requests: AtomicUsize,
    // Set once SHUTDOWN is published; later reports are ignored.
    shut_down: AtomicBool,
}

impl HostHelper {
    /// Publish SHUTDOWN as the final state
    fn publish_shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state_tx.send_replace(ChannelState {
            connectivity: ConnectivityState::Shutdown,
            status: Ok(()),
            picker: Arc::new(QueuePicker),
        });
    }
}

impl ChannelControlHelper for HostHelper {
    fn update_state(
        &self,
        state: ConnectivityState,
        status: Result<(), PolicyError>,
        picker: Arc<dyn Picker>,
    ) {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::debug!(authority = %self.authority, state = %state, "Ignoring report after shutdown");
            return;
        }
        match &status {
            Ok(()) => tracing::debug!(authority = %self.authority, state = %state, "Connectivity update"),
            Err(e) => tracing::warn!(
                authority = %self.authority,
                state = %state,
                status = %e,
                "Connectivity update"
            ),
        }
        self.state_tx.send_replace(ChannelState {
            connectivity: state,
            status,
            picker,
        });
    }

    fn request_reresolution(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.reresolution_requests.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(authority = %self.authority, "Re-resolution requested");
    }

    fn authority(&self) -> String {
        self.authority.clone()
    }

    fn add_trace_event(&self, severity: TraceSeverity, message: &str) {
        match severity {
            TraceSeverity::Info => tracing::info!(authority = %self.authority, "{}", message),
            TraceSeverity::Warning => tracing::warn!(authority = %self.authority, "{}", message),
            TraceSeverity::Error => tracing::error!(authority = %self.authority, "{}", message),
        }
    }
}

#[derive(Default)]
struct PolicySlot {
    policy: Option<OrphanablePolicy>,
    // Last accepted config, reused for resolver errors.
    config: Option<Arc<dyn LoadBalancingConfig>>,
    shut_down: bool,
}

/// Owns one top-level policy for one logical connection
pub struct PolicyHost {
    serializer: WorkSerializer,
    registry: Arc<PolicyRegistry>,
    helper: Arc<HostHelper>,
    // Only locked from serializer jobs, so never contended.
    slot: Arc<Mutex<PolicySlot>>,
    state_rx: watch::Receiver<ChannelState>,
    args: ChannelArgs,
}

impl PolicyHost {
    /// Create a host with its own work serializer. Must be called from
    /// within a Tokio runtime.
    pub fn new(registry: Arc<PolicyRegistry>, authority: &str, args: ChannelArgs) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::default());
        Self {
            serializer: WorkSerializer::new(format!("lb:{authority}")),
            registry,
            helper: Arc::new(HostHelper {
                authority: authority.to_string(),
                state_tx,
                reresolution_requests: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
            }),
            slot: Arc::new(Mutex::new(PolicySlot::default())),
            state_rx,
            args,
        }
    }

    pub fn work_serializer(&self) -> &WorkSerializer {
        &self.serializer
    }

    /// Parse `lb_config` and deliver it with `addresses` to the policy,
    /// creating or replacing the top-level policy when its name changes
    pub async fn update(
        &self,
        lb_config: &Value,
        addresses: Vec<ServerAddress>,
    ) -> Result<(), HostError> {
        let config = self.registry.parse_load_balancing_config(lb_config)?;
        let update = UpdateArgs {
            addresses: Ok(addresses),
            config: Some(Arc::clone(&config)),
            resolution_note: String::new(),
            args: self.args.clone(),
        };
        let policy_args = PolicyArgs {
            work_serializer: self.serializer.clone(),
            channel_control_helper: self.helper.clone(),
            args: self.args.clone(),
            registry: Arc::clone(&self.registry),
        };
        let registry = Arc::clone(&self.registry);
        let slot = Arc::clone(&self.slot);

        self.serializer
            .run(move || {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.shut_down {
                    return Err(HostError::ShutDown);
                }
                let name = config.name();
                if slot.policy.as_ref().map_or(true, |p| p.name() != name) {
                    tracing::info!(policy = %name, "Creating top-level policy");
                    slot.policy = None;
                    slot.policy = Some(registry.create_policy(name, policy_args)?);
                }
                slot.config = Some(Arc::clone(&config));
                match slot.policy.as_mut() {
                    Some(policy) => policy.update_locked(update).map_err(HostError::from),
                    None => Err(HostError::ShutDown),
                }
            })
            .await?
    }

    /// Deliver a resolver failure to the current policy
    pub async fn resolver_error(&self, error: PolicyError) -> Result<(), HostError> {
        let slot = Arc::clone(&self.slot);
        let args = self.args.clone();
        self.serializer
            .run(move || {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let config = slot.config.clone();
                let Some(policy) = slot.policy.as_mut() else {
                    return Ok(());
                };
                policy
                    .update_locked(UpdateArgs {
                        addresses: Err(error),
                        config,
                        resolution_note: String::new(),
                        args,
                    })
                    .map_err(HostError::from)
            })
            .await?
    }

    pub async fn exit_idle(&self) -> Result<(), HostError> {
        self.with_policy(|policy| policy.exit_idle_locked()).await
    }

    pub async fn reset_backoff(&self) -> Result<(), HostError> {
        self.with_policy(|policy| policy.reset_backoff_locked()).await
    }

    /// Shut the policy down and close the serializer. Every later call fails.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        let slot = Arc::clone(&self.slot);
        let helper = Arc::clone(&self.helper);
        self.serializer
            .run(move || {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.shut_down {
                    return;
                }
                slot.shut_down = true;
                slot.config = None;
                slot.policy = None;
                helper.publish_shutdown();
                tracing::info!(authority = %helper.authority, "Policy host shut down");
            })
            .await?;
        self.serializer.close();
        Ok(())
    }

    /// Pick a backend for one call using the latest picker
    pub fn pick(&self, args: &PickArgs) -> PickResult {
        let picker = Arc::clone(&self.state_rx.borrow().picker);
        picker.pick(args)
    }

    /// Snapshot of the latest published state
    pub fn state(&self) -> ChannelState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Number of re-resolution requests the policy has made
    pub fn reresolution_requests(&self) -> usize {
        self.helper.reresolution_requests.load(Ordering::SeqCst)
    }

    async fn with_policy<F>(&self, op: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut OrphanablePolicy) + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        self.serializer
            .run(move || {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(policy) = slot.policy.as_mut() {
                    op(policy);
                }
            })
            .await?;
        Ok(())
    }
}

impl Drop for PolicyHost {
    fn drop(&mut self) {
        // Release the policy on the serializer, like every other operation.
        let slot = Arc::clone(&self.slot);
        let helper = Arc::clone(&self.helper);
        let _ = self.serializer.schedule(move || {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.shut_down = true;
            slot.config = None;
            slot.policy = None;
            helper.publish_shutdown();
        });
        self.serializer.close();
    }
}
