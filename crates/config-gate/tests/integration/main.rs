//! Integration tests for `config-gate`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use config_gate::{
    ConfigHost, GateState, ResolveError, ViolationKind, WiringSettings,
    prerequisite::{self, Prerequisite, PrerequisiteError},
    secrets::{SecretError, SecretResolver, StaticCredential},
    source::KeyValueMap,
    testing::{MemorySink, MockEnvGuard},
};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

use crate::configs::{
    BatchConfig, COUNTED_SETTER_CALLS, CountedConfig, DatabaseConfig, Environment, FeatureConfig,
    SLOW_SETTER_CALLS, ServerConfig, SlowConfig,
};

mod configs;

fn host_with(entries: &[(&str, &str)]) -> (ConfigHost, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let host = ConfigHost::builder()
        .source(KeyValueMap::default().with(entries.iter().copied()))
        .shared_sink(sink.clone())
        .build();
    (host, sink)
}

#[tokio::test]
async fn resolving_config() {
    let (host, sink) = host_with(&[
        ("SERVER_HOST", ""),
        ("HOST", "api.example.com"),
        ("PORT", "9000"),
        ("ENVIRONMENT", "prod"),
        ("ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com"),
    ]);
    let config = host.get::<ServerConfig>().await.unwrap();

    assert_eq!(config.host, "api.example.com");
    assert_eq!(config.port, 9000);
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.allowed_origins.len(), 2);
    assert_eq!(config.request_timeout, None);
    assert_eq!(
        sink.lines(),
        [
            "Server",
            "  Host = \"api.example.com\"",
            "  Port = \"9000\"",
            "  Environment = \"Production\"",
            "  AllowedOrigins = \"https://a.example.com, https://b.example.com\"",
        ]
    );
}

#[tokio::test]
async fn earlier_keys_in_chain_take_precedence() {
    let (host, _) = host_with(&[
        ("SERVER_HOST", "server.example.com"),
        ("HOST", "fallback.example.com"),
        ("SERVER_PORT", "7000"),
        ("PORT", "9000"),
    ]);
    let config = host.get::<ServerConfig>().await.unwrap();
    assert_eq!(config.host, "server.example.com");
    assert_eq!(config.port, 7000);
}

#[tokio::test]
async fn missing_values_keep_defaults() {
    let (host, _) = host_with(&[("PORT", "not a number"), ("ENVIRONMENT", "qa")]);
    let config = host.get::<ServerConfig>().await.unwrap();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 8080);
    assert_eq!(config.environment, Environment::Development);
}

#[tokio::test]
async fn config_is_resolved_once() {
    let (host, _) = host_with(&[("COUNTED_NAME", "counter")]);
    let gate = host.gate::<CountedConfig>();
    assert_eq!(gate.state(), GateState::Empty);
    assert!(gate.get_cached().is_none());

    let first = host.get::<CountedConfig>().await.unwrap();
    let second = host.get::<CountedConfig>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.name, "counter");
    assert_eq!(first.setter_calls, 1);
    assert_eq!(COUNTED_SETTER_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(gate.state(), GateState::Resolved);
    assert!(Arc::ptr_eq(&gate, &host.gate::<CountedConfig>()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_single_resolution() {
    let host = Arc::new(ConfigHost::builder().source(KeyValueMap::default()).build());
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let host = host.clone();
            tokio::spawn(async move { host.get::<SlowConfig>().await })
        })
        .collect();

    let mut configs = vec![];
    for task in tasks {
        configs.push(task.await.unwrap().unwrap());
    }
    assert!(configs[0].ready);
    assert!(configs.iter().all(|config| Arc::ptr_eq(config, &configs[0])));
    assert_eq!(SLOW_SETTER_CALLS.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lookups_are_cached() {
    let source = Arc::new(KeyValueMap::default().with([("FEATURE_FLAGS", "a,b")]));
    let host = ConfigHost::builder().shared_source(source.clone()).build();

    assert_eq!(host.lookup().get("FEATURE_FLAGS").as_deref(), Some("a,b"));
    source.set("FEATURE_FLAGS", "c");
    // The changed value is not observed.
    let config = host.get::<FeatureConfig>().await.unwrap();
    assert_eq!(config.flags, ["a", "b"]);

    host.lookup().remove("FEATURE_FLAGS");
    assert_eq!(host.lookup().get("FEATURE_FLAGS").as_deref(), Some("c"));
}

#[tokio::test]
async fn unsupported_type_is_reported() {
    let (host, _) = host_with(&[("SHARD_IDS", "1,2,3"), ("BATCH_SIZE", "10"), ("MAX_BATCH_SIZE", "100")]);
    let err = host.get::<BatchConfig>().await.unwrap_err();
    let report = err.report().unwrap();
    assert_eq!(report.config(), "BatchConfig");
    assert_eq!(report.len(), 1);

    let violation = report.for_property("ShardIds").next().unwrap();
    assert_eq!(violation.kind(), ViolationKind::Binding);
    let message = err.to_string();
    assert!(message.contains("ShardIds"), "{message}");
    assert!(message.contains("`Vec<i32>`"), "{message}");
}

#[tokio::test]
async fn invalid_config_is_cached() {
    let (host, _) = host_with(&[("BATCH_SIZE", "1000"), ("MAX_BATCH_SIZE", "100")]);
    let err = host.get::<BatchConfig>().await.unwrap_err();
    let ResolveError::Invalid(report) = &err else {
        panic!("unexpected error: {err:?}");
    };
    let violation = report.iter().next().unwrap();
    assert_eq!(violation.property_name(), None);
    assert_eq!(violation.kind(), ViolationKind::Config);
    assert_eq!(violation.message(), "batch size must not exceed the max batch size");

    assert_eq!(host.gate::<BatchConfig>().state(), GateState::Failed);
    let second_err = host.get::<BatchConfig>().await.unwrap_err();
    assert_matches!(
        &second_err,
        ResolveError::Invalid(second_report) if Arc::ptr_eq(report, second_report)
    );
}

#[tokio::test]
async fn required_property() {
    let (host, _) = host_with(&[]);
    let err = host.get::<DatabaseConfig>().await.unwrap_err();
    let report = err.report().unwrap();
    let violation = report.for_property("Url").next().unwrap();
    assert_eq!(violation.kind(), ViolationKind::Rule);
    assert!(err.to_string().contains("Url"), "{err}");

    let (host, sink) = host_with(&[("DB_URL", "postgres://localhost/app"), ("DB_POOL_SIZE", "4")]);
    let config = host.get::<DatabaseConfig>().await.unwrap();
    assert_eq!(config.url, "postgres://localhost/app");
    assert_eq!(config.pool_size, 4);
    let lines = sink.lines();
    assert!(lines.contains(&"Url = \"postgres://localhost/app\"".to_owned()), "{lines:?}");
    assert!(!lines.iter().any(|line| line.starts_with("PoolSize")), "{lines:?}");
}

#[tokio::test]
async fn resolving_from_env_vars() {
    let sink = Arc::new(MemorySink::default());
    let host = ConfigHost::builder().shared_sink(sink.clone()).build();
    let err = host.get::<DatabaseConfig>().await.unwrap_err();
    assert!(err.report().unwrap().for_property("Url").next().is_some(), "{err}");

    let _guard = MockEnvGuard::new([("DB_URL", "postgres://env-host/app")]);
    let sink = Arc::new(MemorySink::default());
    let host = ConfigHost::builder().shared_sink(sink.clone()).build();
    let config = host.get::<DatabaseConfig>().await.unwrap();
    assert_eq!(config.url, "postgres://env-host/app");
    let lines = sink.lines();
    assert!(lines.contains(&"Url = \"postgres://env-host/app\"".to_owned()), "{lines:?}");
}

#[tokio::test]
async fn whole_object_validation() {
    let (host, _) = host_with(&[("DB_URL", "mysql://localhost/app")]);
    let err = host.get::<DatabaseConfig>().await.unwrap_err();
    let violation = err.report().unwrap().for_property("Url").next().unwrap();
    assert_eq!(violation.message(), "only Postgres databases are supported");
}

#[tokio::test]
async fn secrets_are_masked() {
    let (host, sink) = host_with(&[
        ("DB_URL", "postgres://localhost/app"),
        ("DB_PASSWORD", "hunter2"),
        ("DB_API_KEY", "key"),
    ]);
    let config = host.get::<DatabaseConfig>().await.unwrap();
    // Plain values of secret reference properties are used as is.
    assert_eq!(config.password, "hunter2");
    assert_eq!(config.api_key.as_ref().unwrap().expose_secret(), "key");

    let lines = sink.lines();
    assert!(lines.contains(&"Password = \"**MASKED**\"".to_owned()), "{lines:?}");
    assert!(lines.contains(&"ApiKey = \"**MASKED**\"".to_owned()), "{lines:?}");
    assert!(!lines.iter().any(|line| line.contains("hunter2")), "{lines:?}");
}

#[tokio::test]
async fn resolving_vault_references() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets/db-password"))
        .and(header("authorization", "Bearer vault-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": "s3cr3t" })))
        .expect(2)
        .mount(&server)
        .await;

    let reference = format!("{}/secrets/db-password", server.uri());
    let sink = Arc::new(MemorySink::default());
    let resolver = SecretResolver::new()
        .with_client(reqwest::Client::new())
        .with_credential(Arc::new(StaticCredential::new("vault-token".to_owned())))
        .with_host_marker("127.0.0.1")
        .allow_http(true);
    let host = ConfigHost::builder()
        .source(KeyValueMap::default().with([
            ("DB_URL", "postgres://localhost/app"),
            ("DB_PASSWORD", reference.as_str()),
        ]))
        .secret_resolver(resolver)
        .shared_sink(sink.clone())
        .build();

    let config = host.get::<DatabaseConfig>().await.unwrap();
    assert_eq!(config.password, "s3cr3t");
    assert!(sink.lines().contains(&"Password = \"**MASKED**\"".to_owned()));

    let secret = host.get_secret("DB_PASSWORD").await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), "s3cr3t");
    // Cached per key chain.
    host.get_secret("DB_PASSWORD").await.unwrap();
    let plain = host.get_secret("MISSING, DB_URL").await.unwrap().unwrap();
    assert_eq!(plain.expose_secret(), "postgres://localhost/app");
    assert!(host.get_secret("MISSING").await.unwrap().is_none());
}

#[tokio::test]
async fn unresolvable_vault_reference() {
    let (host, _) = host_with(&[
        ("DB_URL", "postgres://localhost/app"),
        ("DB_PASSWORD", "https://my.vault.azure.net/secrets/db"),
    ]);
    let err = host.get::<DatabaseConfig>().await.unwrap_err();
    let violation = err.report().unwrap().for_property("Password").next().unwrap();
    assert_eq!(violation.kind(), ViolationKind::Secret);
    assert!(violation.message().contains("no HTTP client"), "{violation}");
}

#[tokio::test]
async fn cancelled_caller_does_not_poison_gate() {
    let (completer, signal) = prerequisite::signal("bootstrap");
    let host = Arc::new(
        ConfigHost::builder()
            .source(KeyValueMap::default().with([("COUNTED_NAME", "x")]))
            .prerequisite(signal)
            .build(),
    );
    let gate = host.gate::<FeatureConfig>();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = host.get_with_cancel::<FeatureConfig>(&cancel).await.unwrap_err();
    assert_matches!(err, ResolveError::Cancelled { config: "FeatureConfig" });
    assert_eq!(gate.state(), GateState::Empty);

    let resolving_task = tokio::spawn({
        let host = host.clone();
        async move { host.get::<FeatureConfig>().await }
    });
    while gate.state() != GateState::Resolving {
        tokio::task::yield_now().await;
    }
    // A waiting caller can give up without affecting the resolving one.
    let cancel = CancellationToken::new();
    let waiting = host.get_with_cancel::<FeatureConfig>(&cancel);
    cancel.cancel();
    assert_matches!(waiting.await, Err(ResolveError::Cancelled { .. }));

    completer.complete();
    let config = resolving_task.await.unwrap().unwrap();
    assert!(config.flags.is_empty());
    assert_eq!(gate.state(), GateState::Resolved);
}

#[derive(Debug, Default)]
struct FlakyLoad {
    attempts: AtomicUsize,
}

#[async_trait]
impl Prerequisite for FlakyLoad {
    async fn wait(&self) -> Result<(), PrerequisiteError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(PrerequisiteError::new("flaky", "connection reset"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn prerequisite_failure_is_retried() {
    let load = Arc::new(FlakyLoad::default());
    let host = ConfigHost::builder()
        .source(KeyValueMap::default().with([("FEATURE_FLAGS", "beta")]))
        .shared_prerequisite(load.clone())
        .build();

    let err = host.get::<FeatureConfig>().await.unwrap_err();
    assert_matches!(&err, ResolveError::Prerequisite(err) if err.name() == "flaky");
    assert_eq!(
        err.to_string(),
        "prerequisite `flaky` failed: connection reset"
    );
    assert_eq!(host.gate::<FeatureConfig>().state(), GateState::Empty);

    let config = host.get::<FeatureConfig>().await.unwrap();
    assert_eq!(config.flags, ["beta"]);
    assert_eq!(load.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn prerequisite_timeout() {
    let (completer, signal) = prerequisite::signal("bootstrap");
    let host = ConfigHost::builder()
        .source(KeyValueMap::default())
        .prerequisite(signal)
        .prerequisite_timeout(Duration::from_secs(5))
        .build();

    let err = host.get::<FeatureConfig>().await.unwrap_err();
    assert_matches!(err, ResolveError::PrerequisiteTimeout { config: "FeatureConfig" });
    let err = host.get_secret("API_KEY").await.unwrap_err();
    assert_matches!(err, SecretError::PrerequisiteTimeout { keys } if keys == "API_KEY");

    completer.complete();
    host.get::<FeatureConfig>().await.unwrap();
    assert!(host.get_secret("API_KEY").await.unwrap().is_none());
}

#[tokio::test]
async fn remote_store_prefetch_from_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("key", "billing:*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                { "key": "billing:HOST", "value": "remote.example.com" },
                { "key": "billing:PORT", "value": "7000" },
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = WiringSettings::load(KeyValueMap::default().with([
        ("CONFIG_GATE_REMOTE_ENDPOINT", server.uri().as_str()),
        ("CONFIG_GATE_REMOTE_KEY_FILTERS", "billing:*"),
    ]))
    .unwrap();
    let sink = Arc::new(MemorySink::default());
    let host = ConfigHost::builder()
        .source(KeyValueMap::default().with([("PORT", "9000")]))
        .settings(&settings)
        .shared_sink(sink.clone())
        .build();

    let config = host.get::<ServerConfig>().await.unwrap();
    assert_eq!(config.host, "remote.example.com");
    // Values from the local source take precedence over remote ones.
    assert_eq!(config.port, 9000);
    // The prefetch is not repeated for other configs.
    host.get::<FeatureConfig>().await.unwrap();
}

#[tokio::test]
async fn secret_read_waits_for_remote_prefetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "key": "HOST", "value": "remote.example.com" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = WiringSettings::load(KeyValueMap::default().with([(
        "CONFIG_GATE_REMOTE_ENDPOINT",
        server.uri().as_str(),
    )]))
    .unwrap();
    let host = ConfigHost::builder()
        .source(KeyValueMap::default())
        .settings(&settings)
        .sink(MemorySink::default())
        .build();

    let host_secret = host.get_secret("HOST").await.unwrap().unwrap();
    assert_eq!(host_secret.expose_secret(), "remote.example.com");
    let config = host.get::<ServerConfig>().await.unwrap();
    assert_eq!(config.host, "remote.example.com");
}
