//! Cached key lookups.

use std::{
    any::{self, Any, TypeId},
    fmt,
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    coerce,
    error::UsageError,
    source::{ValueSource, split_keys},
    value::{FieldType, ValueKind},
};

struct Converted {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Caching wrapper around a [`ValueSource`].
///
/// Each key is read from the source at most once; results (including missing values) are cached until explicitly
/// [removed](Self::remove()). Thus, changes in the underlying source after the first read of a key are not observed.
/// Typed lookups additionally cache the converted value, so that conversion functions run once per key.
pub struct CachedLookup {
    source: Arc<dyn ValueSource>,
    raw: DashMap<String, Option<String>>,
    converted: DashMap<String, Converted>,
}

impl fmt::Debug for CachedLookup {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CachedLookup")
            .field("source", &self.source)
            .field("cached_keys", &self.raw.len())
            .field("converted_keys", &self.converted.len())
            .finish()
    }
}

impl CachedLookup {
    /// Creates a lookup over the specified source.
    pub fn new(source: Arc<dyn ValueSource>) -> Self {
        Self {
            source,
            raw: DashMap::new(),
            converted: DashMap::new(),
        }
    }

    /// Returns the underlying source.
    pub fn source(&self) -> &Arc<dyn ValueSource> {
        &self.source
    }

    /// Gets a raw value for a single key.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(cached) = self.raw.get(key) {
            return cached.value().clone();
        }
        let value = self.source.get_raw(key);
        // If another thread has read the key concurrently, its value wins.
        self.raw.entry(key.to_owned()).or_insert(value).value().clone()
    }

    /// Gets the first non-empty value for a sequence of keys.
    pub fn get_first<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Option<String> {
        keys.into_iter()
            .find_map(|key| self.get_raw(key).filter(|value| !value.is_empty()))
    }

    /// Gets the first non-empty value for a comma-separated key chain.
    pub fn get(&self, keys: &str) -> Option<String> {
        self.get_first(split_keys(keys))
    }

    /// Gets a value for a key chain converted with the provided function. The conversion runs at most once per key chain;
    /// its result, including `None`, is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the key chain was previously converted to another type.
    pub fn get_with<T, F>(&self, keys: &str, convert: F) -> Result<Option<T>, UsageError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Option<&str>) -> Option<T>,
    {
        if let Some(cached) = self.converted.get(keys) {
            return Self::downcast(keys, &cached);
        }

        let raw = self.get(keys);
        let value = convert(raw.as_deref());
        let cached = self
            .converted
            .entry(keys.to_owned())
            .or_insert_with(|| Converted {
                type_id: TypeId::of::<T>(),
                type_name: any::type_name::<T>(),
                value: Arc::new(value),
            });
        Self::downcast(keys, &cached)
    }

    fn downcast<T: Clone + 'static>(keys: &str, cached: &Converted) -> Result<Option<T>, UsageError> {
        if cached.type_id != TypeId::of::<T>() {
            return Err(UsageError::TypeMismatch {
                key: keys.to_owned(),
                cached: cached.type_name,
                requested: any::type_name::<T>(),
            });
        }
        Ok(cached
            .value
            .downcast_ref::<Option<T>>()
            .and_then(Clone::clone))
    }

    /// Gets a value for a key chain converted using the standard [coercion](crate::coerce) for `T`.
    /// An unparseable value is treated as missing.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` cannot be coerced from a string, or the key chain was previously converted to another type.
    pub fn get_as<T: FieldType + Clone>(&self, keys: &str) -> Result<Option<T>, UsageError> {
        if let ValueKind::Unsupported(ty) = T::KIND {
            return Err(UsageError::UnsupportedType {
                key: keys.to_owned(),
                ty,
            });
        }
        self.get_with(keys, |raw| {
            let value = coerce::value(raw, T::KIND, None).ok()?;
            if value.is_empty() {
                return None;
            }
            T::from_value(value)
        })
    }

    /// Removes cached values for the specified key or key chain, so that the next lookup re-reads the source.
    pub fn remove(&self, keys: &str) {
        self.converted.remove(keys);
        self.raw.remove(keys);
        for key in split_keys(keys) {
            self.raw.remove(key);
        }
    }
}
