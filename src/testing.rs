//! Instrumented policies and helpers shared by unit tests

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::imbalancer::register_imbalancer_policy;
use crate::policies::register_builtin_policies;
use crate::policy::{
    ChannelArgs, ChannelControlHelper, ConnectivityState, LoadBalancingConfig, LoadBalancingPolicy,
    OrphanablePolicy, Picker, PolicyArgs, PolicyError, QueuePicker, TraceSeverity, UpdateArgs,
};
use crate::registry::{PolicyFactory, PolicyRegistry};
use crate::serializer::WorkSerializer;

/// One observed call on a recording policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Created { policy: String, instance: usize },
    Update { policy: String, instance: usize, label: Option<String> },
    ExitIdle { policy: String, instance: usize },
    ResetBackoff { policy: String, instance: usize },
    Shutdown { policy: String, instance: usize },
}

/// Shared, ordered log of calls across all recording policies
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    next_instance: Arc<AtomicUsize>,
}

impl CallLog {
    fn push(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Instances created and not yet shut down
    pub fn live_instances(&self) -> usize {
        let calls = self.calls.lock().unwrap();
        let created = calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::Created { .. }))
            .count();
        let shut_down = calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::Shutdown { .. }))
            .count();
        created - shut_down
    }

    /// Labels of every update, in the order they were applied
    pub fn update_labels(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Update { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Config for a recording policy: `{"label": "...", "failUpdate": bool}`
#[derive(Debug)]
pub struct RecordingConfig {
    policy: String,
    pub label: Option<String>,
    pub fail_update: bool,
}

impl LoadBalancingConfig for RecordingConfig {
    fn name(&self) -> &str {
        &self.policy
    }
}

pub struct RecordingFactory {
    name: String,
    log: CallLog,
    fail_creation: bool,
}

impl RecordingFactory {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            fail_creation: false,
        }
    }

    /// Make `create_policy` return `None`
    pub fn failing_creation(mut self) -> Self {
        self.fail_creation = true;
        self
    }
}

impl PolicyFactory for RecordingFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records every call it receives"
    }

    fn create_policy(&self, args: PolicyArgs) -> Option<OrphanablePolicy> {
        if self.fail_creation {
            return None;
        }
        let instance = self.log.next_instance.fetch_add(1, Ordering::SeqCst);
        self.log.push(RecordedCall::Created {
            policy: self.name.clone(),
            instance,
        });
        Some(OrphanablePolicy::new(RecordingPolicy {
            name: self.name.clone(),
            instance,
            log: self.log.clone(),
            helper: args.channel_control_helper,
            serializer: args.work_serializer,
            shut_down: false,
        }))
    }

    fn parse_config(
        &self,
        json: &Value,
        _registry: &PolicyRegistry,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidChildConfiguration {
            policy: self.name.clone(),
            reason: reason.to_string(),
        };
        let object = json.as_object().ok_or_else(|| invalid("config must be an object"))?;
        let label = match object.get("label") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(invalid("label must be a string")),
        };
        let fail_update = object
            .get("failUpdate")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(Arc::new(RecordingConfig {
            policy: self.name.clone(),
            label,
            fail_update,
        }))
    }
}

pub struct RecordingPolicy {
    name: String,
    instance: usize,
    log: CallLog,
    helper: Arc<dyn ChannelControlHelper>,
    serializer: WorkSerializer,
    shut_down: bool,
}

impl LoadBalancingPolicy for RecordingPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_locked(&mut self, args: UpdateArgs) -> Result<(), PolicyError> {
        let config = args
            .config
            .as_deref()
            .and_then(|c| c.downcast_ref::<RecordingConfig>())
            .ok_or_else(|| PolicyError::InvalidConfiguration("recorder: missing config".into()))?;
        self.log.push(RecordedCall::Update {
            policy: self.name.clone(),
            instance: self.instance,
            label: config.label.clone(),
        });
        if config.fail_update {
            return Err(PolicyError::Unavailable("recorder rejected update".to_string()));
        }
        self.helper
            .update_state(ConnectivityState::Ready, Ok(()), Arc::new(QueuePicker));
        Ok(())
    }

    fn exit_idle_locked(&mut self) {
        self.log.push(RecordedCall::ExitIdle {
            policy: self.name.clone(),
            instance: self.instance,
        });
        // Report asynchronously, the way a child reacting to a connection
        // event would.
        let helper = Arc::clone(&self.helper);
        let _ = self.serializer.schedule(move || {
            helper.update_state(ConnectivityState::Connecting, Ok(()), Arc::new(QueuePicker));
        });
    }

    fn reset_backoff_locked(&mut self) {
        self.log.push(RecordedCall::ResetBackoff {
            policy: self.name.clone(),
            instance: self.instance,
        });
    }

    fn shutdown_locked(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.log.push(RecordedCall::Shutdown {
            policy: self.name.clone(),
            instance: self.instance,
        });
    }
}

type StateReport = (ConnectivityState, Result<(), PolicyError>, Arc<dyn Picker>);

/// Stand-in for the transport's helper that records every report
pub struct RecordingHelper {
    authority: String,
    states: Mutex<Vec<StateReport>>,
    reresolutions: AtomicUsize,
    trace_events: Mutex<Vec<(TraceSeverity, String)>>,
}

impl RecordingHelper {
    pub fn new(authority: &str) -> Self {
        Self {
            authority: authority.to_string(),
            states: Mutex::new(Vec::new()),
            reresolutions: AtomicUsize::new(0),
            trace_events: Mutex::new(Vec::new()),
        }
    }

    pub fn states(&self) -> Vec<(ConnectivityState, Result<(), PolicyError>)> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .map(|(state, status, _)| (*state, status.clone()))
            .collect()
    }

    pub fn latest(&self) -> Option<StateReport> {
        self.states.lock().unwrap().last().cloned()
    }

    pub fn reresolution_requests(&self) -> usize {
        self.reresolutions.load(Ordering::SeqCst)
    }

    pub fn trace_events(&self) -> Vec<(TraceSeverity, String)> {
        self.trace_events.lock().unwrap().clone()
    }
}

impl ChannelControlHelper for RecordingHelper {
    fn update_state(
        &self,
        state: ConnectivityState,
        status: Result<(), PolicyError>,
        picker: Arc<dyn Picker>,
    ) {
        self.states.lock().unwrap().push((state, status, picker));
    }

    fn request_reresolution(&self) {
        self.reresolutions.fetch_add(1, Ordering::SeqCst);
    }

    fn authority(&self) -> String {
        self.authority.clone()
    }

    fn add_trace_event(&self, severity: TraceSeverity, message: &str) {
        self.trace_events
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

/// Registry with the default policies plus `recorder_a` and `recorder_b`
pub fn recording_registry(log: &CallLog) -> Arc<PolicyRegistry> {
    let mut builder = PolicyRegistry::builder();
    register_builtin_policies(&mut builder).unwrap();
    register_imbalancer_policy(&mut builder).unwrap();
    builder
        .register(Arc::new(RecordingFactory::new("recorder_a", log.clone())))
        .unwrap();
    builder
        .register(Arc::new(RecordingFactory::new("recorder_b", log.clone())))
        .unwrap();
    builder
        .register(Arc::new(
            RecordingFactory::new("recorder_broken", log.clone()).failing_creation(),
        ))
        .unwrap();
    builder.build()
}

/// Policy args wired to a fresh serializer and recording helper.
/// Must be called from within a Tokio runtime.
pub fn policy_args(registry: &Arc<PolicyRegistry>) -> (PolicyArgs, Arc<RecordingHelper>) {
    let helper = Arc::new(RecordingHelper::new("test.authority"));
    let args = PolicyArgs {
        work_serializer: WorkSerializer::new("test"),
        channel_control_helper: helper.clone(),
        args: ChannelArgs::new(),
        registry: Arc::clone(registry),
    };
    (args, helper)
}
