//! Pick-first policy: sends every call to the first resolved address

use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::usable_addresses;
use crate::policy::{
    ChannelControlHelper, ConnectivityState, LoadBalancingConfig, LoadBalancingPolicy,
    OrphanablePolicy, PickArgs, PickResult, Picker, PolicyArgs, PolicyError, ServerAddress,
    UpdateArgs,
};
use crate::registry::{PolicyFactory, PolicyRegistry};

pub const PICK_FIRST_POLICY_NAME: &str = "pick_first";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickFirstConfig {
    /// Shuffle the address list before choosing
    #[serde(default)]
    pub shuffle_address_list: bool,
}

impl LoadBalancingConfig for PickFirstConfig {
    fn name(&self) -> &str {
        PICK_FIRST_POLICY_NAME
    }
}

#[derive(Debug)]
struct PickFirstPicker {
    address: ServerAddress,
}

impl Picker for PickFirstPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        PickResult::Complete {
            address: self.address,
        }
    }
}

pub struct PickFirst {
    helper: Arc<dyn ChannelControlHelper>,
    addresses: Vec<ServerAddress>,
    selected: Option<ServerAddress>,
    shut_down: bool,
}

impl PickFirst {
    pub fn new(args: PolicyArgs) -> Self {
        Self {
            helper: args.channel_control_helper,
            addresses: Vec::new(),
            selected: None,
            shut_down: false,
        }
    }

    /// Address currently receiving all calls
    pub fn selected(&self) -> Option<ServerAddress> {
        self.selected
    }
}

impl LoadBalancingPolicy for PickFirst {
    fn name(&self) -> &str {
        PICK_FIRST_POLICY_NAME
    }

    fn update_locked(&mut self, args: UpdateArgs) -> Result<(), PolicyError> {
        if self.shut_down {
            return Ok(());
        }
        let shuffle = args
            .config
            .as_deref()
            .and_then(|c| c.downcast_ref::<PickFirstConfig>())
            .map(|c| c.shuffle_address_list)
            .unwrap_or(false);

        let Some(mut addresses) =
            usable_addresses(PICK_FIRST_POLICY_NAME, self.helper.as_ref(), args, &self.addresses)?
        else {
            return Ok(());
        };
        if shuffle {
            addresses.shuffle(&mut rand::thread_rng());
        }

        let first = addresses[0];
        if self.selected != Some(first) {
            tracing::debug!(address = %first, "pick_first: selected address");
        }
        self.addresses = addresses;
        self.selected = Some(first);
        self.helper.update_state(
            ConnectivityState::Ready,
            Ok(()),
            Arc::new(PickFirstPicker { address: first }),
        );
        Ok(())
    }

    fn exit_idle_locked(&mut self) {}

    fn reset_backoff_locked(&mut self) {}

    fn shutdown_locked(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            self.selected = None;
            tracing::debug!("pick_first: shut down");
        }
    }
}

pub struct PickFirstFactory;

impl PolicyFactory for PickFirstFactory {
    fn name(&self) -> &str {
        PICK_FIRST_POLICY_NAME
    }

    fn description(&self) -> &str {
        "Sends all calls to the first resolved address"
    }

    fn create_policy(&self, args: PolicyArgs) -> Option<OrphanablePolicy> {
        Some(OrphanablePolicy::new(PickFirst::new(args)))
    }

    fn parse_config(
        &self,
        json: &Value,
        _registry: &PolicyRegistry,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError> {
        let invalid = |reason: String| PolicyError::InvalidChildConfiguration {
            policy: PICK_FIRST_POLICY_NAME.to_string(),
            reason,
        };
        if !json.is_object() {
            return Err(invalid("config must be an object".to_string()));
        }
        let config: PickFirstConfig =
            serde_json::from_value(json.clone()).map_err(|e| invalid(e.to_string()))?;
        Ok(Arc::new(config))
    }
}
