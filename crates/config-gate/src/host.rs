//! Process-wide registry of resolution gates.

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::{
    Configuration,
    disclosure::{DisclosureSink, LogMethod, TracingSink},
    error::ResolveError,
    gate::{ResolutionGate, ResolveContext},
    lookup::CachedLookup,
    prerequisite::Prerequisite,
    secrets::{SecretError, SecretResolver, TokenCredential},
    settings::WiringSettings,
    source::{Environment, Layered, RemoteKeyValueLoad, ValueSource},
};

/// Registry of [`ResolutionGate`]s sharing a value source, secret resolver, prerequisite and disclosure sink.
///
/// Each configuration type gets exactly one gate per host, created on first access. Usually, a single host
/// is created when wiring the application and shared for the process lifetime.
///
/// # Examples
///
/// ```
/// # use config_gate::{
/// #     field, metadata::{ConfigDescriptor, Param}, source::KeyValueMap, ConfigHost, Configuration,
/// # };
/// #[derive(Debug, Default)]
/// struct DatabaseConfig {
///     url: String,
///     pool_size: i32,
/// }
///
/// impl Configuration for DatabaseConfig {
///     fn describe() -> ConfigDescriptor<Self> {
///         ConfigDescriptor::builder()
///             .param(Param::new("Url", field!(DatabaseConfig, url)).keys(["DB_URL"]).required())
///             .param(Param::new("PoolSize", field!(DatabaseConfig, pool_size)).keys(["DB_POOL_SIZE"]))
///             .build()
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let source = KeyValueMap::default().with([("DB_URL", "postgres://localhost/app")]);
/// let host = ConfigHost::builder().source(source).build();
/// let config = host.get::<DatabaseConfig>().await?;
/// assert_eq!(config.url, "postgres://localhost/app");
/// assert_eq!(config.pool_size, 0);
/// // The config is resolved once; later calls return the same instance.
/// assert!(std::sync::Arc::ptr_eq(&config, &host.get::<DatabaseConfig>().await?));
/// # anyhow::Ok(())
/// # }).unwrap();
/// ```
pub struct ConfigHost {
    context: Arc<ResolveContext>,
    gates: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    secrets: DashMap<String, Option<SecretString>>,
}

impl fmt::Debug for ConfigHost {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigHost")
            .field("context", &self.context)
            .field("gates", &self.gates.len())
            .finish_non_exhaustive()
    }
}

impl Default for ConfigHost {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigHost {
    /// Starts building a host.
    pub fn builder() -> ConfigHostBuilder {
        ConfigHostBuilder::default()
    }

    /// Returns the gate for the configuration type, creating it if necessary.
    pub fn gate<T: Configuration>(&self) -> Arc<ResolutionGate<T>> {
        let type_id = TypeId::of::<T>();
        let existing = self.gates.get(&type_id).map(|gate| Arc::clone(gate.value()));
        let gate = existing.unwrap_or_else(|| {
            // Describe the config outside the map lock.
            let new_gate: Arc<dyn Any + Send + Sync> = Arc::new(ResolutionGate::<T>::new(self.context.clone()));
            Arc::clone(self.gates.entry(type_id).or_insert(new_gate).value())
        });
        gate.downcast()
            .unwrap_or_else(|_| unreachable!("gates are keyed by config `TypeId`"))
    }

    /// Gets the resolved config.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ResolutionGate::get()`].
    pub async fn get<T: Configuration>(&self) -> Result<Arc<T>, ResolveError> {
        self.get_with_cancel(&CancellationToken::new()).await
    }

    /// Gets the resolved config; the wait can be cancelled using the provided token.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ResolutionGate::get()`].
    pub async fn get_with_cancel<T: Configuration>(&self, cancel: &CancellationToken) -> Result<Arc<T>, ResolveError> {
        self.gate::<T>().get(cancel).await
    }

    /// Returns the cached lookup shared by all configs of this host.
    ///
    /// The lookup caches the first value read for each key. If the host has a prerequisite (e.g., a remote
    /// key–value prefetch), values read before it completes stay cached even when the load supplies them later;
    /// use [`Self::get_secret()`] or resolve a config first.
    pub fn lookup(&self) -> &CachedLookup {
        &self.context.lookup
    }

    /// Returns the secret resolver of this host.
    pub fn secret_resolver(&self) -> &SecretResolver {
        &self.context.secrets
    }

    /// Gets a secret by a key chain. If the value is a vault reference, it is resolved; otherwise, the value
    /// itself is returned. Successful results are cached per key chain.
    ///
    /// Like configs, the secret is read only after the prerequisite has completed.
    ///
    /// # Errors
    ///
    /// Propagates errors fetching the secret from the vault, and prerequisite failures or timeouts.
    pub async fn get_secret(&self, keys: &str) -> Result<Option<SecretString>, SecretError> {
        if let Some(cached) = self.secrets.get(keys) {
            return Ok(cached.value().clone());
        }

        match self.context.wait_for_prerequisite().await {
            Some(result) => result?,
            None => {
                return Err(SecretError::PrerequisiteTimeout {
                    keys: keys.to_owned(),
                });
            }
        }
        let resolver = &self.context.secrets;
        let secret = match self.context.lookup.get(keys) {
            None => None,
            Some(raw) if resolver.is_vault_reference(&raw) => Some(resolver.fetch(&raw).await?),
            Some(raw) => Some(raw.into()),
        };
        let entry = self.secrets.entry(keys.to_owned()).or_insert(secret);
        Ok(entry.value().clone())
    }
}

/// Builder for [`ConfigHost`].
#[must_use = "must be finalized with `build()`"]
pub struct ConfigHostBuilder {
    source: Option<Arc<dyn ValueSource>>,
    client: Option<reqwest::Client>,
    credential: Option<Arc<dyn TokenCredential>>,
    secrets: SecretResolver,
    prerequisite: Option<Arc<dyn Prerequisite>>,
    prerequisite_timeout: Option<Duration>,
    sink: Option<Arc<dyn DisclosureSink>>,
}

impl fmt::Debug for ConfigHostBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigHostBuilder")
            .field("source", &self.source)
            .field("secrets", &self.secrets)
            .field("prerequisite", &self.prerequisite)
            .field("prerequisite_timeout", &self.prerequisite_timeout)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigHostBuilder {
    fn default() -> Self {
        Self {
            source: None,
            client: None,
            credential: None,
            secrets: SecretResolver::new(),
            prerequisite: None,
            prerequisite_timeout: None,
            sink: None,
        }
    }
}

impl ConfigHostBuilder {
    /// Sets the value source. By default, the process environment is used.
    pub fn source(self, source: impl ValueSource) -> Self {
        self.shared_source(Arc::new(source))
    }

    /// Sets a shared value source.
    pub fn shared_source(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the HTTP client used for vault and remote store requests.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.secrets = self.secrets.with_client(client.clone());
        self.client = Some(client);
        self
    }

    /// Sets the credential used for vault and remote store requests.
    pub fn credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.secrets = self.secrets.with_credential(credential.clone());
        self.credential = Some(credential);
        self
    }

    /// Replaces the secret resolver. Overrides the client and credential set previously for vault requests.
    pub fn secret_resolver(mut self, resolver: SecretResolver) -> Self {
        self.secrets = resolver;
        self
    }

    /// Sets the prerequisite awaited before resolving any config.
    pub fn prerequisite(self, prerequisite: impl Prerequisite) -> Self {
        self.shared_prerequisite(Arc::new(prerequisite))
    }

    /// Sets a shared prerequisite.
    pub fn shared_prerequisite(mut self, prerequisite: Arc<dyn Prerequisite>) -> Self {
        self.prerequisite = Some(prerequisite);
        self
    }

    /// Limits the wait for the prerequisite. By default, the wait is unlimited.
    pub fn prerequisite_timeout(mut self, timeout: Duration) -> Self {
        self.prerequisite_timeout = Some(timeout);
        self
    }

    /// Sets the disclosure sink. By default, [`TracingSink`] is used.
    pub fn sink(self, sink: impl DisclosureSink) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Sets a shared disclosure sink.
    pub fn shared_sink(mut self, sink: Arc<dyn DisclosureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the disclosure sink according to the log method.
    pub fn log_method(mut self, method: LogMethod, color: bool, max_level: tracing::Level) -> Self {
        self.sink = Some(method.sink(color, max_level));
        self
    }

    /// Applies wiring settings.
    ///
    /// If a remote endpoint is configured, the remote store is prefetched before any config is resolved;
    /// its values have lower priority than values of the source set so far (the process environment by default).
    /// Call this method after setting the source, HTTP client and credential.
    pub fn settings(mut self, settings: &WiringSettings) -> Self {
        self.sink = Some(settings.sink());
        if let Some(scope) = &settings.vault_scope {
            self.secrets = self.secrets.with_scope(scope.clone());
        }

        if let Some(endpoint) = settings.remote_endpoint_url() {
            let client = self.client.get_or_insert_with(reqwest::Client::new).clone();
            if !self.secrets.has_client() {
                self.secrets = self.secrets.with_client(client.clone());
            }
            let mut load = RemoteKeyValueLoad::builder(client, endpoint)
                .key_filters(settings.remote_key_filters.iter().cloned())
                .full_keys(settings.remote_full_keys);
            if let Some(credential) = &self.credential {
                load = load.credential(credential.clone());
            }
            let load = load.build();
            tracing::info!(?load, "configured remote key-value prefetch");

            let primary = self
                .source
                .take()
                .unwrap_or_else(|| Arc::new(Environment::new()));
            let layered = Layered::new()
                .with_shared(primary)
                .with_shared(load.target().clone());
            self.source = Some(Arc::new(layered));
            self.prerequisite = Some(Arc::new(load));
        }
        self
    }

    /// Finalizes the host.
    pub fn build(self) -> ConfigHost {
        let source = self.source.unwrap_or_else(|| Arc::new(Environment::new()));
        let context = ResolveContext {
            lookup: Arc::new(CachedLookup::new(source)),
            secrets: self.secrets,
            prerequisite: self.prerequisite,
            prerequisite_timeout: self.prerequisite_timeout,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
        };
        ConfigHost {
            context: Arc::new(context),
            gates: DashMap::new(),
            secrets: DashMap::new(),
        }
    }
}
