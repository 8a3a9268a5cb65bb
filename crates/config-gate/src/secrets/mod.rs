//! Resolution of secret references pointing to a key vault.
//!
//! A property marked as a [secret reference](crate::metadata::Param::secret_ref()) may hold a URL
//! of a vault secret (e.g., `https://my-vault.vault.azure.net/secrets/db-password`) instead of the secret itself.
//! After binding, [`SecretResolver`] fetches such secrets and replaces the reference with the secret value.
//! Failures do not abort resolution; they are reported as violations by the validation stage.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

pub use self::credential::{AccessToken, CachedCredential, StaticCredential, TokenCredential};
use crate::{
    error::{Violation, ViolationKind},
    metadata::ConfigDescriptor,
    prerequisite::PrerequisiteError,
    value::Value,
};

mod credential;

/// Error fetching a secret.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SecretError {
    /// No HTTP client is configured.
    #[error("cannot resolve secret reference: no HTTP client is configured")]
    MissingClient,
    /// No credential is configured.
    #[error("cannot resolve secret reference: no credential is configured")]
    MissingCredential,
    /// The reference is not a valid vault URL.
    #[error("invalid secret reference `{reference}`")]
    InvalidReference {
        /// Reference string.
        reference: String,
    },
    /// Credential has failed to provide a token.
    #[error("failed to obtain access token: {0:#}")]
    Token(#[source] anyhow::Error),
    /// Transport-level error.
    #[error("failed to fetch secret: {0}")]
    Transport(#[from] reqwest::Error),
    /// The vault has responded with an error status.
    #[error("vault responded with HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The vault response cannot be decoded.
    #[error("cannot decode vault response: {0}")]
    Decode(#[source] reqwest::Error),
    /// The prerequisite load supplying secret references has failed.
    #[error(transparent)]
    Prerequisite(#[from] PrerequisiteError),
    /// The prerequisite load did not complete in time.
    #[error("timed out waiting for prerequisites of secret `{keys}`")]
    PrerequisiteTimeout {
        /// Requested key chain.
        keys: String,
    },
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Fetches secrets referenced by configuration properties.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    client: Option<reqwest::Client>,
    credential: Option<Arc<dyn TokenCredential>>,
    scope: String,
    host_marker: String,
    api_version: String,
    allow_http: bool,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretResolver {
    /// Default audience scope for vault tokens.
    pub const DEFAULT_SCOPE: &'static str = "https://vault.azure.net/.default";
    /// Default substring of the host identifying vault URLs.
    pub const DEFAULT_HOST_MARKER: &'static str = ".vault.";
    /// Default API version appended to vault requests.
    pub const DEFAULT_API_VERSION: &'static str = "7.4";

    /// Creates a resolver without an HTTP client or credential. Such a resolver reports every vault reference
    /// it encounters as a violation.
    pub fn new() -> Self {
        Self {
            client: None,
            credential: None,
            scope: Self::DEFAULT_SCOPE.to_owned(),
            host_marker: Self::DEFAULT_HOST_MARKER.to_owned(),
            api_version: Self::DEFAULT_API_VERSION.to_owned(),
            allow_http: false,
        }
    }

    /// Sets the HTTP client. The client is shared across all requests.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the credential used to authorize vault requests.
    #[must_use]
    pub fn with_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the audience scope for vault tokens.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the substring of the URL host identifying vault references.
    #[must_use]
    pub fn with_host_marker(mut self, marker: impl Into<String>) -> Self {
        self.host_marker = marker.into();
        self
    }

    /// Sets the API version appended to vault requests that do not specify one.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Allows `http://` vault references. Only useful for local vault emulators and tests.
    #[must_use]
    pub fn allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Returns the audience scope for vault tokens.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Checks whether an HTTP client is configured.
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    fn parse_reference(&self, value: &str) -> Option<Url> {
        let url = Url::parse(value.trim()).ok()?;
        let scheme_allowed = match url.scheme() {
            "https" => true,
            "http" => self.allow_http,
            _ => false,
        };
        let host_matches = url.host_str().is_some_and(|host| host.contains(&*self.host_marker));
        (scheme_allowed && host_matches).then_some(url)
    }

    /// Checks whether the value is a vault reference.
    pub fn is_vault_reference(&self, value: &str) -> bool {
        self.parse_reference(value).is_some()
    }

    /// Fetches the secret by its reference URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the client or credential is missing, the reference is invalid, or the vault request fails.
    pub async fn fetch(&self, reference: &str) -> Result<SecretString, SecretError> {
        let client = self.client.as_ref().ok_or(SecretError::MissingClient)?;
        let credential = self
            .credential
            .as_deref()
            .ok_or(SecretError::MissingCredential)?;
        let mut url = self
            .parse_reference(reference)
            .ok_or_else(|| SecretError::InvalidReference {
                reference: reference.to_owned(),
            })?;
        if !url.query_pairs().any(|(name, _)| name == "api-version") {
            url.query_pairs_mut()
                .append_pair("api-version", &self.api_version);
        }

        let token = credential
            .get_token(&self.scope)
            .await
            .map_err(SecretError::Token)?;
        tracing::debug!(%url, "fetching secret");
        let response = client
            .get(url)
            .bearer_auth(token.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SecretError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bundle: SecretBundle = response.json().await.map_err(SecretError::Decode)?;
        Ok(bundle.value.into())
    }

    /// Replaces vault references in secret reference properties with the secrets they point to.
    /// Failures are recorded in `violations`; the remaining properties are still processed.
    #[tracing::instrument(level = "debug", skip_all, fields(config = descriptor.name()))]
    pub(crate) async fn resolve<T: Send + 'static>(
        &self,
        config: &mut T,
        descriptor: &ConfigDescriptor<T>,
        violations: &mut Vec<Violation>,
    ) {
        let secret_refs = descriptor
            .properties()
            .iter()
            .filter(|property| property.is_secret_ref());
        for property in secret_refs {
            let value = property.get(config);
            let Some(reference) = value.as_str().filter(|s| self.is_vault_reference(s)) else {
                continue;
            };

            match self.fetch(reference).await {
                Ok(secret) => {
                    let value = Value::String(secret.expose_secret().to_owned());
                    if property.set(config, value) {
                        tracing::debug!(property = property.name(), "resolved secret reference");
                    } else {
                        violations.push(Violation::property(
                            property.name(),
                            ViolationKind::Secret,
                            format!("secret cannot be assigned to a property of type {}", property.kind()),
                        ));
                    }
                }
                Err(err) => {
                    tracing::warn!(property = property.name(), %err, "failed resolving secret reference");
                    violations.push(Violation::property(
                        property.name(),
                        ViolationKind::Secret,
                        err.to_string(),
                    ));
                }
            }
        }
    }
}
