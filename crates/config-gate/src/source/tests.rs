use serde_json::json;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param, query_param_is_missing},
};

use super::*;
use crate::{
    prerequisite::Prerequisite,
    secrets::StaticCredential,
    testing::MockEnvGuard,
};

#[test]
fn splitting_key_chains() {
    let keys: Vec<_> = split_keys(" A ,B,, ,C").collect();
    assert_eq!(keys, ["A", "B", "C"]);
    assert_eq!(split_keys("").count(), 0);
}

#[test]
fn env_source_with_mock_vars() {
    let guard = MockEnvGuard::new([("CG_TEST_HOST", "example.com"), ("CG_TEST_PORT", "")]);
    guard.set("CG_TEST_USER", "admin");

    let env = Environment::new();
    assert_eq!(env.get_raw("CG_TEST_PORT").as_deref(), Some(""));
    assert_eq!(env.get("CG_TEST_PORT"), None);
    assert_eq!(env.get("CG_TEST_PORT, CG_TEST_HOST").as_deref(), Some("example.com"));
    assert_eq!(env.get("CG_TEST_MISSING, CG_TEST_USER").as_deref(), Some("admin"));

    let prefixed = Environment::prefixed("CG_TEST_");
    assert_eq!(prefixed.get("HOST").as_deref(), Some("example.com"));
    assert_eq!(prefixed.get("CG_TEST_HOST"), None);

    drop(guard);
    assert_eq!(env.get("CG_TEST_HOST"), None);
}

#[test]
#[should_panic(expected = "another `MockEnvGuard` is active")]
fn nested_mock_env_guards_panic() {
    let _guard = MockEnvGuard::new([("A", "1")]);
    let _other = MockEnvGuard::new([("B", "2")]);
}

#[test]
fn key_value_map_operations() {
    let map = KeyValueMap::new("injected").with([("a", "1"), ("b", "")]);
    assert_eq!(map.name(), "injected");
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("b, a").as_deref(), Some("1"));

    assert_eq!(map.set("a", "2").as_deref(), Some("1"));
    assert_eq!(map.get("a").as_deref(), Some("2"));
    assert_eq!(map.remove("a").as_deref(), Some("2"));
    assert_eq!(map.get("a"), None);
    assert!(!map.is_empty());
    assert!(KeyValueMap::default().is_empty());
}

#[test]
fn hierarchical_source() {
    let source = Hierarchical::new(json!({
        "App": {
            "Name": "billing",
            "Debug": true,
            "Ratio": 0.5,
            "Tags": ["a", "b"],
            "Mixed": ["a", { "b": 1 }],
            "Empty": "",
            "Missing": null,
        },
    }));
    assert_eq!(source.get("App:Name").as_deref(), Some("billing"));
    assert_eq!(source.get("app.debug").as_deref(), Some("true"));
    assert_eq!(source.get("APP:RATIO").as_deref(), Some("0.5"));
    assert_eq!(source.get("App:Tags").as_deref(), Some("a,b"));
    assert_eq!(source.get("App:Mixed"), None);
    assert_eq!(source.get("App:Missing"), None);
    assert_eq!(source.get("App:Name:Nested"), None);
    assert_eq!(source.get("App:Empty, App:Name").as_deref(), Some("billing"));

    assert_eq!(Hierarchical::new(json!("scalar")).get("App"), None);
}

#[test]
fn layered_sources() {
    let overrides = Arc::new(KeyValueMap::new("overrides").with([("HOST", ""), ("PORT", "9000")]));
    let layered = Layered::new()
        .with_shared(overrides.clone())
        .with(KeyValueMap::default().with([("HOST", "example.com"), ("PORT", "80")]))
        .with(Hierarchical::new(json!({ "USER": "admin" })));

    assert_eq!(layered.get("HOST").as_deref(), Some("example.com"));
    assert_eq!(layered.get("PORT").as_deref(), Some("9000"));
    assert_eq!(layered.get("USER").as_deref(), Some("admin"));
    assert_eq!(layered.get("MISSING"), None);

    overrides.set("HOST", "override.com");
    assert_eq!(layered.get("HOST").as_deref(), Some("override.com"));
}

fn page(items: serde_json::Value, next_link: Option<&str>) -> ResponseTemplate {
    let mut body = json!({ "items": items });
    if let Some(link) = next_link {
        body["@nextLink"] = link.into();
    }
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn remote_load_with_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("key", "app:*"))
        .and(query_param_is_missing("after"))
        .and(header("authorization", "Bearer store-token"))
        .respond_with(page(
            json!([
                { "key": "app:Host", "value": "example.com" },
                { "key": "app:Empty", "value": null },
            ]),
            Some("/kv?key=app%3A*&after=1"),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("after", "1"))
        .respond_with(page(
            json!([{
                "key": "app:Password",
                "value": r#"{"uri":"https://my.vault.azure.net/secrets/db"}"#,
                "content_type": "application/vnd.microsoft.appconfig.keyvaultref+json;charset=utf-8",
            }]),
            None,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = Url::parse(&server.uri()).unwrap();
    let load = RemoteKeyValueLoad::builder(reqwest::Client::new(), endpoint)
        .key_filters(["app:*"])
        .credential(Arc::new(StaticCredential::new("store-token".to_owned())))
        .build();
    load.wait().await.unwrap();
    // The load is performed once.
    load.wait().await.unwrap();

    let target = load.target();
    assert_eq!(target.len(), 2);
    assert_eq!(target.get("Host").as_deref(), Some("example.com"));
    assert_eq!(
        target.get("Password").as_deref(),
        Some("https://my.vault.azure.net/secrets/db")
    );
}

#[tokio::test]
async fn remote_load_with_full_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("key", "app:*"))
        .respond_with(page(json!([{ "key": "app:Host", "value": "example.com" }]), None))
        .mount(&server)
        .await;

    let target = Arc::new(KeyValueMap::new("store"));
    let load = RemoteKeyValueLoad::builder(reqwest::Client::new(), server.uri().parse().unwrap())
        .key_filters(["app:*"])
        .full_keys(true)
        .target(target.clone())
        .build();
    load.wait().await.unwrap();
    assert_eq!(target.get("app:Host").as_deref(), Some("example.com"));
    assert_eq!(target.get("Host"), None);
}

#[tokio::test]
async fn failed_remote_load_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .respond_with(page(json!([{ "key": "Port", "value": "8080" }]), None))
        .mount(&server)
        .await;

    let load = RemoteKeyValueLoad::builder(reqwest::Client::new(), server.uri().parse().unwrap()).build();
    let err = load.wait().await.unwrap_err();
    assert_eq!(err.name(), "remote key-value load");
    assert!(err.message().contains("HTTP 503: try later"), "{err}");
    assert!(load.target().is_empty());

    load.wait().await.unwrap();
    assert_eq!(load.target().get("Port").as_deref(), Some("8080"));
}

#[tokio::test]
async fn invalid_secret_reference_fails_load() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .respond_with(page(
            json!([{ "key": "Password", "value": "not json", "content_type": "keyvaultref" }]),
            None,
        ))
        .mount(&server)
        .await;

    let load = RemoteKeyValueLoad::builder(reqwest::Client::new(), server.uri().parse().unwrap()).build();
    let err = load.wait().await.unwrap_err();
    assert!(
        err.message().contains("invalid secret reference for key `Password`"),
        "{err}"
    );
}
