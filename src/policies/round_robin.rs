//! Round-robin policy: cycles through every resolved address in order

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::usable_addresses;
use crate::policy::{
    ChannelControlHelper, ConnectivityState, LoadBalancingConfig, LoadBalancingPolicy,
    OrphanablePolicy, PickArgs, PickResult, Picker, PolicyArgs, PolicyError, ServerAddress,
    UpdateArgs,
};
use crate::registry::{PolicyFactory, PolicyRegistry};

pub const ROUND_ROBIN_POLICY_NAME: &str = "round_robin";

/// Round-robin takes no options; any object is accepted
#[derive(Debug, Default)]
pub struct RoundRobinConfig;

impl LoadBalancingConfig for RoundRobinConfig {
    fn name(&self) -> &str {
        ROUND_ROBIN_POLICY_NAME
    }
}

/// Picker that cycles through addresses in order
#[derive(Debug)]
pub struct RoundRobinPicker {
    addresses: Vec<ServerAddress>,
    counter: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(addresses: Vec<ServerAddress>) -> Result<Self, PolicyError> {
        if addresses.is_empty() {
            return Err(PolicyError::Unavailable(
                "RoundRobinPicker requires at least one address".to_string(),
            ));
        }
        Ok(Self {
            addresses,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn addresses(&self) -> &[ServerAddress] {
        &self.addresses
    }
}

impl Picker for RoundRobinPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        PickResult::Complete {
            address: self.addresses[idx],
        }
    }
}

pub struct RoundRobin {
    helper: Arc<dyn ChannelControlHelper>,
    addresses: Vec<ServerAddress>,
    shut_down: bool,
}

impl RoundRobin {
    pub fn new(args: PolicyArgs) -> Self {
        Self {
            helper: args.channel_control_helper,
            addresses: Vec::new(),
            shut_down: false,
        }
    }
}

impl LoadBalancingPolicy for RoundRobin {
    fn name(&self) -> &str {
        ROUND_ROBIN_POLICY_NAME
    }

    fn update_locked(&mut self, args: UpdateArgs) -> Result<(), PolicyError> {
        if self.shut_down {
            return Ok(());
        }
        let Some(addresses) =
            usable_addresses(ROUND_ROBIN_POLICY_NAME, self.helper.as_ref(), args, &self.addresses)?
        else {
            return Ok(());
        };

        tracing::debug!(addresses = addresses.len(), "round_robin: new address list");
        self.addresses = addresses;
        let picker = RoundRobinPicker::new(self.addresses.clone())?;
        self.helper
            .update_state(ConnectivityState::Ready, Ok(()), Arc::new(picker));
        Ok(())
    }

    fn exit_idle_locked(&mut self) {}

    fn reset_backoff_locked(&mut self) {}

    fn shutdown_locked(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            tracing::debug!("round_robin: shut down");
        }
    }
}

pub struct RoundRobinFactory;

impl PolicyFactory for RoundRobinFactory {
    fn name(&self) -> &str {
        ROUND_ROBIN_POLICY_NAME
    }

    fn description(&self) -> &str {
        "Spreads calls across all resolved addresses in turn"
    }

    fn create_policy(&self, args: PolicyArgs) -> Option<OrphanablePolicy> {
        Some(OrphanablePolicy::new(RoundRobin::new(args)))
    }

    fn parse_config(
        &self,
        json: &Value,
        _registry: &PolicyRegistry,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError> {
        if !json.is_object() {
            return Err(PolicyError::InvalidChildConfiguration {
                policy: ROUND_ROBIN_POLICY_NAME.to_string(),
                reason: "config must be an object".to_string(),
            });
        }
        Ok(Arc::new(RoundRobinConfig))
    }
}
