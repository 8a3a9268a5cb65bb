use std::env;

use super::ValueSource;
use crate::testing::MOCK_ENV_VARS;

/// Process environment as a [`ValueSource`].
///
/// Takes [mock env vars](crate::testing::MockEnvGuard) defined for the current thread into account; a mock var
/// shadows the real var with the same name.
///
/// # Examples
///
/// ```
/// use config_gate::{source::{Environment, ValueSource}, testing::MockEnvGuard};
///
/// let _guard = MockEnvGuard::new([("APP_PORT", "8080"), ("APP_HOST", "")]);
/// let env = Environment::prefixed("APP_");
/// assert_eq!(env.get("PORT").as_deref(), Some("8080"));
/// // Empty values are skipped in key chains.
/// assert_eq!(env.get("HOST, PORT").as_deref(), Some("8080"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    prefix: String,
}

impl Environment {
    /// Creates a source reading env vars as is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source prepending the specified prefix to all keys.
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ValueSource for Environment {
    fn get_raw(&self, key: &str) -> Option<String> {
        let name = format!("{}{key}", self.prefix);
        MOCK_ENV_VARS
            .with_borrow(|vars| vars.get(&name).cloned())
            .or_else(|| env::var(&name).ok())
    }
}
