//! imbalancer: a delegating client-side load balancing policy
//!
//! Features:
//! - `imbalancer` policy that runs one child policy chosen by name
//! - Runtime replacement of the child when the config names another policy
//! - Policy registry with `pick_first` and `round_robin` built in
//! - Work serializer and policy host that drive a top-level policy

pub mod config;
pub mod host;
pub mod imbalancer;
pub mod policies;
pub mod policy;
pub mod registry;
pub mod serializer;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use host::{ChannelState, HostError, PolicyHost};
pub use imbalancer::{
    register_imbalancer_policy, ImbalancerConfig, ImbalancerFactory, ImbalancerLb,
    IMBALANCER_POLICY_NAME,
};
pub use policy::{LoadBalancingPolicy, PolicyError};
pub use registry::{create_default_registry, PolicyRegistry};
pub use serializer::WorkSerializer;
