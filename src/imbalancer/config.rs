//! `imbalancer` configuration and its permissive parser

use serde_json::{Map, Value};
use std::sync::Arc;

use super::IMBALANCER_POLICY_NAME;
use crate::policy::{LoadBalancingConfig, PolicyError};
use crate::registry::PolicyRegistry;

/// Child policy used when the config does not name one
pub const DEFAULT_CHILD_POLICY: &str = "round_robin";

const CHILD_POLICY_KEY: &str = "childPolicy";
const CHILD_POLICY_CONFIG_KEY: &str = "childPolicyConfig";

/// Validated `imbalancer` config: which child to run and the child's own
/// parsed config
#[derive(Debug)]
pub struct ImbalancerConfig {
    child_policy_name: String,
    child_config: Arc<dyn LoadBalancingConfig>,
}

impl ImbalancerConfig {
    pub fn new(child_policy_name: String, child_config: Arc<dyn LoadBalancingConfig>) -> Self {
        Self {
            child_policy_name,
            child_config,
        }
    }

    pub fn child_policy_name(&self) -> &str {
        &self.child_policy_name
    }

    pub fn child_config(&self) -> Arc<dyn LoadBalancingConfig> {
        Arc::clone(&self.child_config)
    }

    /// Parse raw JSON into a config.
    ///
    /// Wrong-typed or missing fields fall back to their defaults instead of
    /// failing. The child config is then validated by the child's own
    /// factory through `registry`; that nested parse is the only way this
    /// can fail.
    pub fn parse(json: &Value, registry: &PolicyRegistry) -> Result<Self, PolicyError> {
        let mut child_policy = DEFAULT_CHILD_POLICY.to_string();
        let mut child_config = Value::Object(Map::new());

        if let Some(object) = json.as_object() {
            match object.get(CHILD_POLICY_KEY) {
                Some(Value::String(name)) => child_policy = name.clone(),
                Some(other) => tracing::debug!(
                    value = %other,
                    "imbalancer: ignoring non-string childPolicy"
                ),
                None => {}
            }
            match object.get(CHILD_POLICY_CONFIG_KEY) {
                Some(config @ Value::Object(_)) => child_config = config.clone(),
                Some(other) => tracing::debug!(
                    value = %other,
                    "imbalancer: ignoring non-object childPolicyConfig"
                ),
                None => {}
            }
        }

        let mut entry = Map::new();
        entry.insert(child_policy.clone(), child_config);
        let lb_config = Value::Array(vec![Value::Object(entry)]);
        let parsed = registry.parse_load_balancing_config(&lb_config)?;

        Ok(Self::new(child_policy, parsed))
    }
}

impl LoadBalancingConfig for ImbalancerConfig {
    fn name(&self) -> &str {
        IMBALANCER_POLICY_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{PickFirstConfig, RoundRobinConfig};
    use crate::registry::create_default_registry;
    use serde_json::json;

    #[test]
    fn test_empty_object_uses_defaults() {
        let registry = create_default_registry();
        let config = ImbalancerConfig::parse(&json!({}), &registry).unwrap();

        assert_eq!(config.child_policy_name(), "round_robin");
        assert_eq!(config.child_config().name(), "round_robin");
        assert!(config.child_config().downcast_ref::<RoundRobinConfig>().is_some());
        assert_eq!(config.name(), "imbalancer");
    }

    #[test]
    fn test_non_object_uses_defaults() {
        let registry = create_default_registry();
        for raw in [json!(null), json!("pick_first"), json!(42), json!([1, 2])] {
            let config = ImbalancerConfig::parse(&raw, &registry).unwrap();
            assert_eq!(config.child_policy_name(), DEFAULT_CHILD_POLICY);
        }
    }

    #[test]
    fn test_non_string_child_policy_is_ignored() {
        let registry = create_default_registry();
        let config = ImbalancerConfig::parse(&json!({"childPolicy": 123}), &registry).unwrap();
        assert_eq!(config.child_policy_name(), "round_robin");
    }

    #[test]
    fn test_non_object_child_config_is_ignored() {
        let registry = create_default_registry();
        let config = ImbalancerConfig::parse(
            &json!({"childPolicy": "pick_first", "childPolicyConfig": "x"}),
            &registry,
        )
        .unwrap();

        assert_eq!(config.child_policy_name(), "pick_first");
        let child = config.child_config();
        let child = child.downcast_ref::<PickFirstConfig>().unwrap();
        assert!(!child.shuffle_address_list);
    }

    #[test]
    fn test_child_config_is_canonicalized() {
        let registry = create_default_registry();
        let config = ImbalancerConfig::parse(
            &json!({
                "childPolicy": "pick_first",
                "childPolicyConfig": {"shuffleAddressList": true}
            }),
            &registry,
        )
        .unwrap();

        let child = config.child_config();
        assert!(child.downcast_ref::<PickFirstConfig>().unwrap().shuffle_address_list);
    }

    #[test]
    fn test_unknown_child_policy_is_rejected() {
        let registry = create_default_registry();
        let err = ImbalancerConfig::parse(&json!({"childPolicy": "does_not_exist"}), &registry)
            .unwrap_err();
        assert_eq!(err, PolicyError::UnknownPolicy("does_not_exist".to_string()));
    }

    #[test]
    fn test_invalid_child_config_is_rejected() {
        let registry = create_default_registry();
        let err = ImbalancerConfig::parse(
            &json!({
                "childPolicy": "pick_first",
                "childPolicyConfig": {"shuffleAddressList": "sometimes"}
            }),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidChildConfiguration { .. }));
    }

    #[test]
    fn test_nested_imbalancer_child() {
        let registry = create_default_registry();
        let config = ImbalancerConfig::parse(
            &json!({
                "childPolicy": "imbalancer",
                "childPolicyConfig": {"childPolicy": "pick_first"}
            }),
            &registry,
        )
        .unwrap();

        let child = config.child_config();
        let nested = child.downcast_ref::<ImbalancerConfig>().unwrap();
        assert_eq!(nested.child_policy_name(), "pick_first");
    }
}
