//! Load balancing policy interface shared by the engine, the registry and
//! the built-in child policies

mod address;
mod channel_args;
mod connectivity;
mod helper;
mod picker;

pub use address::ServerAddress;
pub use channel_args::ChannelArgs;
pub use connectivity::ConnectivityState;
pub use helper::{ChannelControlHelper, DelegatingParent, ParentOwningDelegatingHelper, TraceSeverity};
pub use picker::{FailPicker, PickArgs, PickResult, Picker, QueuePicker};

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::registry::PolicyRegistry;
use crate::serializer::WorkSerializer;

/// Errors produced while parsing, creating or updating a policy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Invalid load balancing configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown load balancing policy: {0}")]
    UnknownPolicy(String),

    #[error("Invalid configuration for policy '{policy}': {reason}")]
    InvalidChildConfiguration { policy: String, reason: String },

    #[error("Failed to create child policy: {0}")]
    ChildCreationFailed(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Extension trait to allow downcasting
pub trait AsAny: std::any::Any {
    fn as_any(&self) -> &dyn std::any::Any;
}

impl<T: std::any::Any> AsAny for T {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Parsed, validated configuration for one policy.
///
/// Configs are immutable once built and shared through `Arc`.
pub trait LoadBalancingConfig: AsAny + fmt::Debug + Send + Sync {
    /// Name of the policy this config belongs to
    fn name(&self) -> &str;
}

impl dyn LoadBalancingConfig {
    /// Downcast to the concrete config type of a policy
    pub fn downcast_ref<T: LoadBalancingConfig>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Arguments handed to a policy when it is created
#[derive(Clone)]
pub struct PolicyArgs {
    /// Serializer every `*_locked` call and report of this policy runs on
    pub work_serializer: WorkSerializer,
    /// Reverse channel used to report connectivity state and pickers
    pub channel_control_helper: Arc<dyn ChannelControlHelper>,
    /// Channel arguments at creation time
    pub args: ChannelArgs,
    /// Registry used to build and configure nested policies
    pub registry: Arc<PolicyRegistry>,
}

impl fmt::Debug for PolicyArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyArgs")
            .field("work_serializer", &self.work_serializer)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A resolver result (plus config) delivered to a policy
#[derive(Debug, Clone)]
pub struct UpdateArgs {
    /// Resolved addresses, or the resolver error
    pub addresses: Result<Vec<ServerAddress>, PolicyError>,
    /// Config for the receiving policy
    pub config: Option<Arc<dyn LoadBalancingConfig>>,
    /// Human readable note from the resolver, appended to failure statuses
    pub resolution_note: String,
    /// Channel arguments
    pub args: ChannelArgs,
}

impl UpdateArgs {
    /// Build update args for a successful resolution
    pub fn new(addresses: Vec<ServerAddress>, config: Arc<dyn LoadBalancingConfig>) -> Self {
        Self {
            addresses: Ok(addresses),
            config: Some(config),
            resolution_note: String::new(),
            args: ChannelArgs::default(),
        }
    }

    /// Replace the channel arguments
    pub fn with_args(mut self, args: ChannelArgs) -> Self {
        self.args = args;
        self
    }
}

/// A client-side load balancing policy.
///
/// Every method is invoked from the policy's work serializer, never
/// concurrently and never re-entrantly.
pub trait LoadBalancingPolicy: Send {
    /// Registered name of the policy
    fn name(&self) -> &str;

    /// Apply a new resolver result and config
    fn update_locked(&mut self, args: UpdateArgs) -> Result<(), PolicyError>;

    /// Leave IDLE and start connecting, if applicable
    fn exit_idle_locked(&mut self);

    /// Reset any connection backoff state
    fn reset_backoff_locked(&mut self);

    /// Release all resources; no further calls will be made
    fn shutdown_locked(&mut self);
}

/// Owned handle to a live policy that shuts it down when dropped
pub struct OrphanablePolicy {
    inner: Box<dyn LoadBalancingPolicy>,
}

impl OrphanablePolicy {
    pub fn new<P: LoadBalancingPolicy + 'static>(policy: P) -> Self {
        Self {
            inner: Box::new(policy),
        }
    }
}

impl Deref for OrphanablePolicy {
    type Target = dyn LoadBalancingPolicy;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for OrphanablePolicy {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for OrphanablePolicy {
    fn drop(&mut self) {
        self.inner.shutdown_locked();
    }
}

impl fmt::Debug for OrphanablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OrphanablePolicy").field(&self.inner.name()).finish()
    }
}
