//! Immutable channel argument carrier

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Key/value arguments passed through the policy tree unchanged.
///
/// Cloning is cheap; `set` copies the map only when it is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelArgs {
    values: Arc<BTreeMap<String, String>>,
}

impl ChannelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of these args with `key` set to `value`
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for ChannelArgs {
    fn from(map: HashMap<String, String>) -> Self {
        Self {
            values: Arc::new(map.into_iter().collect()),
        }
    }
}
