use std::{
    fmt,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;

/// Bearer token issued by a [`TokenCredential`].
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Token value.
    pub token: SecretString,
    /// Expiration time of the token. `None` means the token never expires.
    pub expires_at: Option<SystemTime>,
}

impl AccessToken {
    /// Creates a token without an expiration time.
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Sets the expiration time.
    #[must_use]
    pub fn expires_at(mut self, time: SystemTime) -> Self {
        self.expires_at = Some(time);
        self
    }

    fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at.is_none_or(|expires_at| {
            expires_at
                .duration_since(SystemTime::now())
                .is_ok_and(|remaining| remaining > margin)
        })
    }
}

/// Provider of bearer tokens for an audience scope.
#[async_trait]
pub trait TokenCredential: 'static + Send + Sync + fmt::Debug {
    /// Obtains a token for the specified scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be obtained.
    async fn get_token(&self, scope: &str) -> anyhow::Result<AccessToken>;
}

/// Credential returning the same token for all scopes.
#[derive(Debug, Clone)]
pub struct StaticCredential(AccessToken);

impl StaticCredential {
    /// Creates a credential with a non-expiring token.
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, _scope: &str) -> anyhow::Result<AccessToken> {
        Ok(self.0.clone())
    }
}

/// Caches tokens produced by the wrapped credential per scope, refreshing them once they are
/// within a margin of their expiration.
#[derive(Debug)]
pub struct CachedCredential<C> {
    inner: C,
    refresh_margin: Duration,
    tokens: DashMap<String, AccessToken>,
}

impl<C: TokenCredential> CachedCredential<C> {
    const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

    /// Wraps a credential with the default refresh margin (5 minutes).
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            refresh_margin: Self::DEFAULT_REFRESH_MARGIN,
            tokens: DashMap::new(),
        }
    }

    /// Sets the refresh margin.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachedCredential<C> {
    async fn get_token(&self, scope: &str) -> anyhow::Result<AccessToken> {
        let cached = self
            .tokens
            .get(scope)
            .filter(|token| token.is_fresh(self.refresh_margin))
            .map(|token| token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        tracing::debug!(scope, "requesting new access token");
        let token = self.inner.get_token(scope).await?;
        self.tokens.insert(scope.to_owned(), token.clone());
        Ok(token)
    }
}
