//! `imbalancer`: a delegating policy that supervises one named child
//!
//! # Data Flow
//! ```text
//! raw JSON config
//!     → ImbalancerConfig::parse (child config validated by the registry)
//!     → ImbalancerLb::update_locked
//!         - create or replace the child by name
//!         - forward the update with the child's own config
//!     → child reports state/pickers through ImbalancerHelper
//!     → transport
//! ```

mod config;
mod policy;

pub use config::{ImbalancerConfig, DEFAULT_CHILD_POLICY};
pub use policy::{ImbalancerCore, ImbalancerHelper, ImbalancerLb};

use serde_json::Value;
use std::sync::Arc;

use crate::policy::{LoadBalancingConfig, OrphanablePolicy, PolicyArgs, PolicyError};
use crate::registry::{PolicyFactory, PolicyRegistry, PolicyRegistryBuilder, RegistryError};

pub const IMBALANCER_POLICY_NAME: &str = "imbalancer";

pub struct ImbalancerFactory;

impl PolicyFactory for ImbalancerFactory {
    fn name(&self) -> &str {
        IMBALANCER_POLICY_NAME
    }

    fn description(&self) -> &str {
        "Delegates to a child policy chosen by name (default: round_robin)"
    }

    fn create_policy(&self, args: PolicyArgs) -> Option<OrphanablePolicy> {
        Some(OrphanablePolicy::new(ImbalancerLb::new(args)))
    }

    fn parse_config(
        &self,
        json: &Value,
        registry: &PolicyRegistry,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError> {
        Ok(Arc::new(ImbalancerConfig::parse(json, registry)?))
    }
}

/// Register the `imbalancer` policy
pub fn register_imbalancer_policy(builder: &mut PolicyRegistryBuilder) -> Result<(), RegistryError> {
    builder.register(Arc::new(ImbalancerFactory))
}
