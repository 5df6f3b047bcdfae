//! Pickers: the data-plane half of a policy

use std::fmt;

use super::{PolicyError, ServerAddress};

/// Per-call information available to a picker
#[derive(Debug, Clone, Default)]
pub struct PickArgs {
    /// Full method path of the call, e.g. `/pkg.Service/Method`
    pub path: String,
    /// Initial call metadata
    pub metadata: Vec<(String, String)>,
}

impl PickArgs {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: Vec::new(),
        }
    }
}

/// Outcome of a single pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickResult {
    /// Send the call to this address
    Complete { address: ServerAddress },
    /// No decision yet; retry when a new picker arrives
    Queue,
    /// Fail the call unless it is wait-for-ready
    Fail(PolicyError),
    /// Fail the call unconditionally
    Drop(PolicyError),
}

/// Trait for picking a backend for each call.
///
/// Pickers are immutable snapshots published with every state update and
/// may be used concurrently from many calls.
pub trait Picker: fmt::Debug + Send + Sync {
    fn pick(&self, args: &PickArgs) -> PickResult;
}

/// Picker that queues every call
#[derive(Debug, Default)]
pub struct QueuePicker;

impl Picker for QueuePicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::Queue
    }
}

/// Picker that fails every call with a fixed status
#[derive(Debug)]
pub struct FailPicker {
    status: PolicyError,
}

impl FailPicker {
    pub fn new(status: PolicyError) -> Self {
        Self { status }
    }
}

impl Picker for FailPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::Fail(self.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_picker() {
        assert_eq!(QueuePicker.pick(&PickArgs::new("/svc/M")), PickResult::Queue);
    }

    #[test]
    fn test_fail_picker() {
        let status = PolicyError::Unavailable("no backends".to_string());
        let picker = FailPicker::new(status.clone());

        assert_eq!(picker.pick(&PickArgs::default()), PickResult::Fail(status.clone()));
        assert_eq!(picker.pick(&PickArgs::default()), PickResult::Fail(status));
    }
}
