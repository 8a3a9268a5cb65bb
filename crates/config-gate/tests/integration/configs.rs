//! Configuration types used in tests.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use config_gate::{
    Configuration, Violation, ViolationKind, config_enum, field,
    metadata::{ConfigDescriptor, DisclosureMode, DisclosurePolicy, Param},
    validation::WithDescription,
};
use futures::{FutureExt, future::BoxFuture};
use secrecy::SecretString;

pub(crate) static COUNTED_SETTER_CALLS: AtomicUsize = AtomicUsize::new(0);
pub(crate) static SLOW_SETTER_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

config_enum!(Environment {
    Development,
    Staging,
    Production
});

fn remap_environment(raw: &str) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "dev" => Some("Development"),
        "prod" => Some("Production"),
        _ => None,
    }
}

#[derive(Debug)]
pub(crate) struct ServerConfig {
    pub host: String,
    pub port: i32,
    pub environment: Environment,
    pub allowed_origins: Vec<String>,
    pub request_timeout: Option<f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
            environment: Environment::Development,
            allowed_origins: vec![],
            request_timeout: None,
        }
    }
}

impl Configuration for ServerConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(Param::new("Host", field!(ServerConfig, host)).keys(["SERVER_HOST, HOST"]))
            .param(
                Param::new("Port", field!(ServerConfig, port))
                    .keys(["SERVER_PORT", "PORT"])
                    .validate(1_i64..=65_535),
            )
            .param(
                Param::new("Environment", field!(ServerConfig, environment))
                    .keys(["ENVIRONMENT"])
                    .remap(remap_environment),
            )
            .param(Param::new("AllowedOrigins", field!(ServerConfig, allowed_origins)).keys(["ALLOWED_ORIGINS"]))
            .param(
                Param::new("RequestTimeout", field!(ServerConfig, request_timeout))
                    .keys(["REQUEST_TIMEOUT"])
                    .disclose(DisclosureMode::IfNotEmpty),
            )
            .disclose(DisclosurePolicy::new(DisclosureMode::Always).with_header("Server"))
            .build()
    }
}

#[derive(Debug, Default)]
pub(crate) struct DatabaseConfig {
    pub url: String,
    pub password: String,
    pub api_key: Option<SecretString>,
    pub pool_size: i32,
}

impl Configuration for DatabaseConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(Param::new("Url", field!(DatabaseConfig, url)).keys(["DB_URL"]).required())
            .param(
                Param::new("Password", field!(DatabaseConfig, password))
                    .keys(["DB_PASSWORD"])
                    .secret_ref(),
            )
            .param(Param::new("ApiKey", field!(DatabaseConfig, api_key)).keys(["DB_API_KEY"]))
            .param(
                Param::new("PoolSize", field!(DatabaseConfig, pool_size))
                    .keys(["DB_POOL_SIZE"])
                    .disclose(DisclosureMode::Never),
            )
            .build()
    }

    fn validate(&self) -> Vec<Violation> {
        if self.url.starts_with("postgres://") || self.url.is_empty() {
            vec![]
        } else {
            vec![Violation::property(
                "Url",
                ViolationKind::Rule,
                "only Postgres databases are supported",
            )]
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct BatchConfig {
    pub shard_ids: Vec<i32>,
    pub batch_size: i64,
    pub max_batch_size: i64,
}

impl Configuration for BatchConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(Param::new("ShardIds", field!(BatchConfig, shard_ids)).keys(["SHARD_IDS"]))
            .param(Param::new("BatchSize", field!(BatchConfig, batch_size)).keys(["BATCH_SIZE"]))
            .param(Param::new("MaxBatchSize", field!(BatchConfig, max_batch_size)).keys(["MAX_BATCH_SIZE"]))
            .validate(WithDescription::predicate(
                |config: &BatchConfig| config.batch_size <= config.max_batch_size,
                "batch size must not exceed the max batch size",
            ))
            .build()
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountedConfig {
    pub name: String,
    pub setter_calls: usize,
}

impl Configuration for CountedConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(Param::new("Name", field!(CountedConfig, name)).keys(["COUNTED_NAME"]))
            .setter("count", 0, |config| {
                config.setter_calls = COUNTED_SETTER_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
            })
            .build()
    }
}

fn slow_setter(config: &mut SlowConfig) -> BoxFuture<'_, anyhow::Result<()>> {
    async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        SLOW_SETTER_CALLS.fetch_add(1, Ordering::SeqCst);
        config.ready = true;
        Ok(())
    }
    .boxed()
}

#[derive(Debug, Default)]
pub(crate) struct SlowConfig {
    pub ready: bool,
}

impl Configuration for SlowConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .async_setter("warm_up", 0, slow_setter)
            .build()
    }
}

#[derive(Debug, Default)]
pub(crate) struct FeatureConfig {
    pub flags: Vec<String>,
}

impl Configuration for FeatureConfig {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(Param::new("Flags", field!(FeatureConfig, flags)).keys(["FEATURE_FLAGS"]))
            .build()
    }
}
