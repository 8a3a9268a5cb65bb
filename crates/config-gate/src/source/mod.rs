//! Sources of raw configuration values.
//!
//! A [`ValueSource`] maps string keys to raw string values. Lookups accept *key chains*: comma-separated lists
//! of keys probed in order. For all sources in this module, a key defined with an empty value is treated
//! the same as an undefined key, i.e., the chain moves on to the next key.

use std::{borrow::Cow, fmt, sync::Arc};

use dashmap::DashMap;

pub use self::{
    env::Environment,
    json::Hierarchical,
    remote::{RemoteKeyValueLoad, RemoteKeyValueLoadBuilder},
};

mod env;
mod json;
mod remote;
#[cfg(test)]
mod tests;

/// Splits a comma-separated key chain into trimmed non-empty keys.
pub fn split_keys(chain: &str) -> impl Iterator<Item = &str> + '_ {
    chain.split(',').map(str::trim).filter(|key| !key.is_empty())
}

/// Source of raw string values.
pub trait ValueSource: 'static + Send + Sync + fmt::Debug {
    /// Gets the raw value for a single key.
    fn get_raw(&self, key: &str) -> Option<String>;

    /// Gets the value for a comma-separated key chain: returns the first non-empty value.
    fn get(&self, keys: &str) -> Option<String> {
        split_keys(keys).find_map(|key| self.get_raw(key).filter(|value| !value.is_empty()))
    }
}

impl<S: ValueSource + ?Sized> ValueSource for Arc<S> {
    fn get_raw(&self, key: &str) -> Option<String> {
        (**self).get_raw(key)
    }

    fn get(&self, keys: &str) -> Option<String> {
        (**self).get(keys)
    }
}

/// In-memory key–value source with interior mutability.
///
/// Used for injected configuration, as the target of [`RemoteKeyValueLoad`], and in tests. Keys are case-sensitive.
#[derive(Debug)]
pub struct KeyValueMap {
    name: Cow<'static, str>,
    entries: DashMap<String, String>,
}

impl Default for KeyValueMap {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl KeyValueMap {
    /// Creates an empty map with the specified human-readable name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    /// Adds entries to this map.
    #[must_use]
    pub fn with<K: Into<String>, V: Into<String>>(self, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        for (key, value) in entries {
            self.entries.insert(key.into(), value.into());
        }
        self
    }

    /// Returns the name of this source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether this map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ValueSource for KeyValueMap {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|value| value.clone())
    }
}

/// Ordered list of sources. For each key, the first source providing a non-empty value wins.
#[derive(Debug, Default, Clone)]
pub struct Layered {
    layers: Vec<Arc<dyn ValueSource>>,
}

impl Layered {
    /// Creates an empty list of sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source with the lowest priority.
    #[must_use]
    pub fn with(mut self, source: impl ValueSource) -> Self {
        self.layers.push(Arc::new(source));
        self
    }

    /// Adds a shared source with the lowest priority.
    #[must_use]
    pub fn with_shared(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.layers.push(source);
        self
    }
}

impl ValueSource for Layered {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.layers
            .iter()
            .find_map(|layer| layer.get_raw(key).filter(|value| !value.is_empty()))
    }
}
