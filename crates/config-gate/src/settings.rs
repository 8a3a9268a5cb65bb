//! Wiring-time settings of the resolution infrastructure itself.

use std::sync::Arc;

use url::Url;

use crate::{
    Configuration,
    bind::bind,
    config_enum,
    disclosure::{DisclosureSink, LogMethod},
    error::ValidationReport,
    field,
    lookup::CachedLookup,
    metadata::{ConfigDescriptor, Param},
    source::{Environment, ValueSource},
    validation::{ValidationError, WithDescription},
    value::Value,
};

/// Maximum level of disclosure output for [`LogMethod::Console`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warn level. Disables console disclosure.
    Warn,
    /// Error level. Disables console disclosure.
    Error,
}

config_enum!(LogLevel { Trace, Debug, Info, Warn, Error });

impl LogLevel {
    fn remap(raw: &str) -> Option<&'static str> {
        Some(match raw.to_ascii_lowercase().as_str() {
            "verbose" => "Trace",
            "information" => "Info",
            "warning" => "Warn",
            "err" | "critical" | "fatal" => "Error",
            _ => return None,
        })
    }

    /// Converts this level to the `tracing` counterpart.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Settings read from env vars when wiring a [`ConfigHost`](crate::ConfigHost).
///
/// | Env var | Property | Default |
/// |:--------|:---------|:--------|
/// | `CONFIG_GATE_REMOTE_ENDPOINT` | [`Self::remote_endpoint`] | none |
/// | `CONFIG_GATE_REMOTE_KEY_FILTERS` | [`Self::remote_key_filters`] | `*` |
/// | `CONFIG_GATE_REMOTE_FULL_KEYS` | [`Self::remote_full_keys`] | `false` |
/// | `CONFIG_GATE_LOG_METHOD` | [`Self::log_method`] | `tracing` |
/// | `CONFIG_GATE_LOG_LEVEL` | [`Self::log_level`] | `info` |
/// | `CONFIG_GATE_LOG_COLOR` | [`Self::log_color`] | `true` |
/// | `CONFIG_GATE_VAULT_SCOPE` | [`Self::vault_scope`] | none |
#[derive(Debug, Clone, PartialEq)]
pub struct WiringSettings {
    /// Endpoint of the remote key–value store. If set, the store is prefetched before any config is resolved.
    pub remote_endpoint: Option<String>,
    /// Key filters for the remote store.
    pub remote_key_filters: Vec<String>,
    /// Keeps fully qualified remote keys instead of stripping filter prefixes.
    pub remote_full_keys: bool,
    /// Disclosure output method.
    pub log_method: LogMethod,
    /// Maximum level of console disclosure.
    pub log_level: LogLevel,
    /// Enables colored console disclosure.
    pub log_color: bool,
    /// Audience scope for vault tokens.
    pub vault_scope: Option<String>,
}

impl Default for WiringSettings {
    fn default() -> Self {
        Self {
            remote_endpoint: None,
            remote_key_filters: vec!["*".to_owned()],
            remote_full_keys: false,
            log_method: LogMethod::default(),
            log_level: LogLevel::default(),
            log_color: true,
            vault_scope: None,
        }
    }
}

fn check_endpoint(value: &Value) -> Result<(), ValidationError> {
    let Some(endpoint) = value.as_str() else {
        return Ok(());
    };
    let url = Url::parse(endpoint).map_err(ValidationError::custom)?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(ValidationError::custom(format_args!(
            "unsupported URL scheme `{}`",
            url.scheme()
        )))
    }
}

impl Configuration for WiringSettings {
    fn describe() -> ConfigDescriptor<Self> {
        ConfigDescriptor::builder()
            .param(
                Param::new("RemoteEndpoint", field!(WiringSettings, remote_endpoint))
                    .keys(["CONFIG_GATE_REMOTE_ENDPOINT"])
                    .validate(WithDescription::check(check_endpoint, "must be an HTTP(S) URL")),
            )
            .param(
                Param::new("RemoteKeyFilters", field!(WiringSettings, remote_key_filters))
                    .keys(["CONFIG_GATE_REMOTE_KEY_FILTERS"]),
            )
            .param(
                Param::new("RemoteFullKeys", field!(WiringSettings, remote_full_keys))
                    .keys(["CONFIG_GATE_REMOTE_FULL_KEYS"]),
            )
            .param(Param::new("LogMethod", field!(WiringSettings, log_method)).keys(["CONFIG_GATE_LOG_METHOD"]))
            .param(
                Param::new("LogLevel", field!(WiringSettings, log_level))
                    .keys(["CONFIG_GATE_LOG_LEVEL"])
                    .remap(LogLevel::remap),
            )
            .param(Param::new("LogColor", field!(WiringSettings, log_color)).keys(["CONFIG_GATE_LOG_COLOR"]))
            .param(Param::new("VaultScope", field!(WiringSettings, vault_scope)).keys(["CONFIG_GATE_VAULT_SCOPE"]))
            .build()
    }
}

impl WiringSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a report if any setting is invalid.
    pub fn from_env() -> Result<Self, ValidationReport> {
        Self::load(Environment::new())
    }

    /// Reads settings from the specified source. Only binding and validation are performed; settings are
    /// never disclosed and cannot reference secrets.
    ///
    /// # Errors
    ///
    /// Returns a report if any setting is invalid.
    pub fn load(source: impl ValueSource) -> Result<Self, ValidationReport> {
        let descriptor = Self::describe();
        let lookup = CachedLookup::new(Arc::new(source));
        let mut settings = Self::default();
        let mut violations = vec![];
        bind(&mut settings, &descriptor, &lookup, &mut violations);
        crate::validation::validate_config(&settings, &descriptor, violations)?;
        Ok(settings)
    }

    /// Returns the parsed remote store endpoint.
    pub fn remote_endpoint_url(&self) -> Option<Url> {
        self.remote_endpoint
            .as_deref()
            .and_then(|endpoint| Url::parse(endpoint).ok())
    }

    /// Creates a disclosure sink according to these settings.
    pub fn sink(&self) -> Arc<dyn DisclosureSink> {
        self.log_method
            .sink(self.log_color, self.log_level.to_tracing())
    }
}
