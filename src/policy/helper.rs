//! Reverse control channel from a policy to its owner

use std::sync::Arc;

use super::{ConnectivityState, Picker, PolicyError};

/// Severity of a channel trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSeverity {
    Info,
    Warning,
    Error,
}

/// Interface a policy uses to talk back to whatever owns it.
///
/// For a top-level policy this is the transport; for a child policy it is
/// a helper provided by the parent.
pub trait ChannelControlHelper: Send + Sync {
    /// Publish a new connectivity state together with its picker
    fn update_state(
        &self,
        state: ConnectivityState,
        status: Result<(), PolicyError>,
        picker: Arc<dyn Picker>,
    );

    /// Ask the resolver for a fresh address list
    fn request_reresolution(&self);

    /// Authority (target host) of the channel
    fn authority(&self) -> String;

    /// Record a trace event on the channel
    fn add_trace_event(&self, severity: TraceSeverity, message: &str);
}

/// Implemented by parents that hand a [`ParentOwningDelegatingHelper`] to
/// their child
pub trait DelegatingParent: Send + Sync {
    /// Name reports are attributed to
    fn policy_name(&self) -> &str;

    /// Helper the parent itself was given by its owner
    fn parent_helper(&self) -> &dyn ChannelControlHelper;

    /// Once true, state reports and re-resolution requests from the child
    /// are dropped
    fn is_shut_down(&self) -> bool {
        false
    }
}

/// Helper that forwards every call to the parent's own helper.
///
/// It holds a strong reference to the parent so the parent outlives any
/// child that can still report through it.
pub struct ParentOwningDelegatingHelper<P: DelegatingParent> {
    parent: Arc<P>,
}

impl<P: DelegatingParent> ParentOwningDelegatingHelper<P> {
    pub fn new(parent: Arc<P>) -> Self {
        Self { parent }
    }

    pub fn parent(&self) -> &Arc<P> {
        &self.parent
    }
}

impl<P: DelegatingParent> ChannelControlHelper for ParentOwningDelegatingHelper<P> {
    fn update_state(
        &self,
        state: ConnectivityState,
        status: Result<(), PolicyError>,
        picker: Arc<dyn Picker>,
    ) {
        if self.parent.is_shut_down() {
            tracing::trace!(
                policy = self.parent.policy_name(),
                state = %state,
                "Dropping child connectivity update after shutdown"
            );
            return;
        }
        tracing::trace!(
            policy = self.parent.policy_name(),
            state = %state,
            "Relaying child connectivity update"
        );
        self.parent.parent_helper().update_state(state, status, picker);
    }

    fn request_reresolution(&self) {
        if self.parent.is_shut_down() {
            return;
        }
        tracing::trace!(
            policy = self.parent.policy_name(),
            "Relaying child re-resolution request"
        );
        self.parent.parent_helper().request_reresolution();
    }

    fn authority(&self) -> String {
        self.parent.parent_helper().authority()
    }

    fn add_trace_event(&self, severity: TraceSeverity, message: &str) {
        self.parent.parent_helper().add_trace_event(severity, message);
    }
}
