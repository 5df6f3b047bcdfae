//! Policy registry: name → factory lookup and config parsing
//!
//! Registrations happen once at startup through [`PolicyRegistryBuilder`];
//! the built registry is read-only and shared through `Arc`.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::imbalancer::register_imbalancer_policy;
use crate::policies::register_builtin_policies;
use crate::policy::{LoadBalancingConfig, OrphanablePolicy, PolicyArgs, PolicyError};

static GLOBAL_REGISTRY: OnceLock<Arc<PolicyRegistry>> = OnceLock::new();

/// Factory for one named policy
pub trait PolicyFactory: Send + Sync {
    /// Unique name the policy is registered under
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Build a new policy instance; `None` if it could not be created
    fn create_policy(&self, args: PolicyArgs) -> Option<OrphanablePolicy>;

    /// Validate and canonicalize this policy's raw JSON config.
    ///
    /// `registry` is the registry doing the parsing, for policies that
    /// embed child configs.
    fn parse_config(
        &self,
        json: &Value,
        registry: &PolicyRegistry,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Policy '{0}' is already registered")]
    DuplicatePolicy(String),

    #[error("Global policy registry is already initialized")]
    AlreadyInitialized,
}

/// Read-only set of registered policy factories
pub struct PolicyRegistry {
    factories: Vec<Arc<dyn PolicyFactory>>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Get a factory by name
    pub fn get_factory(&self, name: &str) -> Option<&Arc<dyn PolicyFactory>> {
        self.factories.iter().find(|f| f.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_factory(name).is_some()
    }

    /// Get all registered factories, in registration order
    pub fn list_factories(&self) -> &[Arc<dyn PolicyFactory>] {
        &self.factories
    }

    /// Instantiate the policy registered under `name`
    pub fn create_policy(
        &self,
        name: &str,
        args: PolicyArgs,
    ) -> Result<OrphanablePolicy, PolicyError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| PolicyError::UnknownPolicy(name.to_string()))?;

        factory
            .create_policy(args)
            .ok_or_else(|| PolicyError::ChildCreationFailed(name.to_string()))
    }

    /// Parse a load balancing config list of the form
    /// `[{"policy_a": {...}}, {"policy_b": {...}}]`.
    ///
    /// The first entry naming a registered policy is parsed by that
    /// policy's factory; entries naming unknown policies are skipped.
    pub fn parse_load_balancing_config(
        &self,
        json: &Value,
    ) -> Result<Arc<dyn LoadBalancingConfig>, PolicyError> {
        let entries = json.as_array().ok_or_else(|| {
            PolicyError::InvalidConfiguration("load balancing config must be an array".to_string())
        })?;

        let mut skipped = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let object = entry.as_object().ok_or_else(|| {
                PolicyError::InvalidConfiguration(format!("entry {index} is not an object"))
            })?;
            if object.len() != 1 {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "entry {index} must name exactly one policy, found {}",
                    object.len()
                )));
            }
            let Some((name, config)) = object.iter().next() else {
                continue;
            };

            match self.get_factory(name) {
                Some(factory) => return factory.parse_config(config, self),
                None => {
                    tracing::debug!(policy = %name, "Skipping unregistered policy in config list");
                    skipped.push(name.clone());
                }
            }
        }

        if skipped.is_empty() {
            Err(PolicyError::UnknownPolicy(
                "no policies in load balancing config".to_string(),
            ))
        } else {
            Err(PolicyError::UnknownPolicy(skipped.join(", ")))
        }
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.factories.iter().map(|f| f.name()).collect();
        f.debug_struct("PolicyRegistry").field("policies", &names).finish()
    }
}

/// Collects factories before the registry is frozen
#[derive(Default)]
pub struct PolicyRegistryBuilder {
    factories: Vec<Arc<dyn PolicyFactory>>,
}

impl PolicyRegistryBuilder {
    /// Register a policy factory
    pub fn register(&mut self, factory: Arc<dyn PolicyFactory>) -> Result<(), RegistryError> {
        if self.factories.iter().any(|f| f.name() == factory.name()) {
            return Err(RegistryError::DuplicatePolicy(factory.name().to_string()));
        }
        tracing::trace!(policy = factory.name(), "Registered load balancing policy");
        self.factories.push(factory);
        Ok(())
    }

    pub fn build(self) -> Arc<PolicyRegistry> {
        Arc::new(PolicyRegistry {
            factories: self.factories,
        })
    }
}

/// Create the default registry with the built-in policies and `imbalancer`
pub fn create_default_registry() -> Arc<PolicyRegistry> {
    let mut builder = PolicyRegistry::builder();
    let results = [
        register_builtin_policies(&mut builder),
        register_imbalancer_policy(&mut builder),
    ];
    for result in results {
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to register default policy");
        }
    }
    builder.build()
}

/// Install the process-wide registry. Must happen before first use.
pub fn init_global(registry: Arc<PolicyRegistry>) -> Result<(), RegistryError> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| RegistryError::AlreadyInitialized)
}

/// The process-wide registry, falling back to the default registry if
/// [`init_global`] was never called
pub fn global() -> Arc<PolicyRegistry> {
    Arc::clone(GLOBAL_REGISTRY.get_or_init(create_default_registry))
}
