//! Testing tools for configurations.

use std::{
    cell::RefCell,
    collections::HashMap,
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    Configuration,
    disclosure::{DisclosureLine, DisclosureSink},
    error::ResolveError,
    host::ConfigHost,
    source::ValueSource,
};

thread_local! {
    pub(crate) static MOCK_ENV_VARS: RefCell<HashMap<String, String>> = RefCell::default();
}

/// Guard defining mock env vars for the current thread.
///
/// Mock vars are visible to [`Environment`](crate::source::Environment) sources used on the same thread
/// and are removed when the guard is dropped. The guard is not `Send`, so that it cannot leak to another thread.
///
/// # Panics
///
/// Creating a guard panics if another guard is active on the current thread.
#[derive(Debug)]
pub struct MockEnvGuard {
    _not_send: PhantomData<*mut ()>,
}

impl MockEnvGuard {
    /// Defines the specified mock env vars.
    pub fn new<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        MOCK_ENV_VARS.with_borrow_mut(|mock_vars| {
            assert!(
                mock_vars.is_empty(),
                "Cannot define mock env vars while another `MockEnvGuard` is active"
            );
            mock_vars.extend(vars.into_iter().map(|(name, value)| (name.into(), value.into())));
        });
        Self {
            _not_send: PhantomData,
        }
    }

    /// Sets an additional mock env var.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        MOCK_ENV_VARS.with_borrow_mut(|vars| vars.insert(name.into(), value.into()));
    }
}

impl Drop for MockEnvGuard {
    fn drop(&mut self) {
        MOCK_ENV_VARS.take(); // Remove all mocked env vars
    }
}

/// [`DisclosureSink`] collecting formatted lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Returns a copy of lines emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DisclosureSink for MemorySink {
    fn emit(&self, line: &DisclosureLine<'_>) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Resolves a configuration from the provided `source` using a throwaway [`ConfigHost`]
/// without prerequisites or secret resolution. Disclosed lines are discarded.
///
/// # Errors
///
/// Propagates resolution errors, which allows testing negative cases.
///
/// # Examples
///
/// ```
/// # use config_gate::{
/// #     field, metadata::{ConfigDescriptor, Param}, source::KeyValueMap, testing, Configuration,
/// # };
/// #[derive(Debug, Default)]
/// struct PoolConfig {
///     size: i32,
/// }
///
/// impl Configuration for PoolConfig {
///     fn describe() -> ConfigDescriptor<Self> {
///         ConfigDescriptor::builder()
///             .param(Param::new("Size", field!(PoolConfig, size)).keys(["POOL_SIZE"]))
///             .build()
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let source = KeyValueMap::default().with([("POOL_SIZE", "16")]);
/// let config = testing::resolve::<PoolConfig>(source).await?;
/// assert_eq!(config.size, 16);
/// # anyhow::Ok(())
/// # }).unwrap();
/// ```
pub async fn resolve<T: Configuration>(source: impl ValueSource) -> Result<Arc<T>, ResolveError> {
    let host = ConfigHost::builder()
        .source(source)
        .sink(MemorySink::default())
        .build();
    host.get::<T>().await
}
