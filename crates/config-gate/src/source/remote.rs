use std::{fmt, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use super::KeyValueMap;
use crate::{
    prerequisite::{Prerequisite, PrerequisiteError},
    secrets::TokenCredential,
};

const SECRET_REF_CONTENT_TYPE: &str = "keyvaultref";

#[derive(Debug, Deserialize)]
struct KeyValuePage {
    #[serde(default)]
    items: Vec<KeyValueItem>,
    #[serde(rename = "@nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyValueItem {
    key: String,
    value: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretReference {
    uri: String,
}

impl KeyValueItem {
    fn into_entry(self) -> anyhow::Result<Option<(String, String)>> {
        let Some(value) = self.value else {
            return Ok(None);
        };
        let is_secret_ref = self
            .content_type
            .as_deref()
            .is_some_and(|ty| ty.to_ascii_lowercase().contains(SECRET_REF_CONTENT_TYPE));
        let value = if is_secret_ref {
            let reference: SecretReference = serde_json::from_str(&value)
                .with_context(|| format!("invalid secret reference for key `{}`", self.key))?;
            reference.uri
        } else {
            value
        };
        Ok(Some((self.key, value)))
    }
}

/// Prefetch of key–values from a remote configuration store into a [`KeyValueMap`].
///
/// The store is queried with `GET {endpoint}/kv?key={filter}` for each key filter; responses have the shape
/// `{ "items": [{ "key": .., "value": .., "content_type": .. }], "@nextLink": .. }`. Values with a secret reference
/// content type carry `{ "uri": .. }`; the URI is stored so that secret reference properties can resolve it.
///
/// The load runs once even if awaited concurrently. A failed load is retried on the next [`wait()`](Prerequisite::wait()).
pub struct RemoteKeyValueLoad {
    client: reqwest::Client,
    endpoint: Url,
    key_filters: Vec<String>,
    full_keys: bool,
    credential: Option<Arc<dyn TokenCredential>>,
    scope: String,
    target: Arc<KeyValueMap>,
    loaded: OnceCell<usize>,
}

impl fmt::Debug for RemoteKeyValueLoad {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteKeyValueLoad")
            .field("endpoint", &self.endpoint.as_str())
            .field("key_filters", &self.key_filters)
            .field("full_keys", &self.full_keys)
            .field("target", &self.target.name())
            .field("loaded", &self.loaded.get())
            .finish_non_exhaustive()
    }
}

impl RemoteKeyValueLoad {
    const NAME: &'static str = "remote key-value load";
    /// Default audience scope for tokens authorizing store requests.
    pub const DEFAULT_SCOPE: &'static str = "https://azconfig.io/.default";

    /// Starts building a load from the specified store endpoint.
    pub fn builder(client: reqwest::Client, endpoint: Url) -> RemoteKeyValueLoadBuilder {
        RemoteKeyValueLoadBuilder {
            inner: Self {
                client,
                endpoint,
                key_filters: vec!["*".to_owned()],
                full_keys: false,
                credential: None,
                scope: Self::DEFAULT_SCOPE.to_owned(),
                target: Arc::new(KeyValueMap::new("remote")),
                loaded: OnceCell::new(),
            },
        }
    }

    /// Returns the map populated by this load.
    pub fn target(&self) -> &Arc<KeyValueMap> {
        &self.target
    }

    fn strip_filter_prefix<'k>(&self, filter: &str, key: &'k str) -> &'k str {
        if self.full_keys {
            return key;
        }
        let prefix = filter.trim_end_matches('*');
        key.strip_prefix(prefix).filter(|rest| !rest.is_empty()).unwrap_or(key)
    }

    async fn fetch_page(&self, url: Url) -> anyhow::Result<KeyValuePage> {
        let mut request = self.client.get(url.clone());
        if let Some(credential) = &self.credential {
            let token = credential.get_token(&self.scope).await?;
            request = request.bearer_auth(token.token.expose_secret());
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed requesting {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("store responded with HTTP {}: {body}", status.as_u16());
        }
        response.json().await.context("cannot decode store response")
    }

    #[tracing::instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    async fn load(&self) -> anyhow::Result<usize> {
        let mut count = 0;
        for filter in &self.key_filters {
            let mut url = self.endpoint.join("kv")?;
            url.query_pairs_mut().append_pair("key", filter);
            let mut next_url = Some(url);

            while let Some(url) = next_url.take() {
                let page = self.fetch_page(url).await?;
                for item in page.items {
                    let Some((key, value)) = item.into_entry()? else {
                        continue;
                    };
                    let key = self.strip_filter_prefix(filter, &key).to_owned();
                    self.target.set(key, value);
                    count += 1;
                }
                if let Some(link) = page.next_link {
                    next_url = Some(self.endpoint.join(&link)?);
                }
            }
        }
        tracing::info!(count, "loaded remote key-values");
        Ok(count)
    }
}

#[async_trait]
impl Prerequisite for RemoteKeyValueLoad {
    async fn wait(&self) -> Result<(), PrerequisiteError> {
        match self.loaded.get_or_try_init(|| self.load()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(%err, "remote key-value load failed");
                Err(PrerequisiteError::new(Self::NAME, format!("{err:#}")))
            }
        }
    }
}

/// Builder for [`RemoteKeyValueLoad`].
#[derive(Debug)]
#[must_use = "must be finalized with `build()`"]
pub struct RemoteKeyValueLoadBuilder {
    inner: RemoteKeyValueLoad,
}

impl RemoteKeyValueLoadBuilder {
    /// Sets key filters. Each filter is queried separately; a trailing `*` matches any suffix.
    pub fn key_filters<S: Into<String>>(mut self, filters: impl IntoIterator<Item = S>) -> Self {
        self.inner.key_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps fully qualified keys instead of stripping the filter prefix.
    pub fn full_keys(mut self, full_keys: bool) -> Self {
        self.inner.full_keys = full_keys;
        self
    }

    /// Sets the credential authorizing store requests.
    pub fn credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.inner.credential = Some(credential);
        self
    }

    /// Sets the audience scope for store tokens.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.inner.scope = scope.into();
        self
    }

    /// Sets the map to populate.
    pub fn target(mut self, target: Arc<KeyValueMap>) -> Self {
        self.inner.target = target;
        self
    }

    /// Finalizes the load.
    pub fn build(self) -> RemoteKeyValueLoad {
        self.inner
    }
}
