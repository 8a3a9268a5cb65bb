//! Property and configuration validation.
//!
//! # Overview
//!
//! The core validation functionality is encapsulated in the [`Validate`] trait. Per-property validations
//! implement `Validate<Value>`, i.e. they work with the [dynamic representation](Value) of the property;
//! whole-config validations implement `Validate<C>` for the config type `C`. Validation never stops at the first
//! failure: all violations, together with binding and secret resolution errors deferred from earlier pipeline stages,
//! are collected into a single [`ValidationReport`](crate::ValidationReport).
//!
//! # Examples
//!
//! ```
//! use config_gate::{
//!     field, metadata::{ConfigDescriptor, Param}, validation::{OneOf, Required, WithDescription},
//!     Configuration,
//! };
//!
//! #[derive(Debug, Default)]
//! struct ServerConfig {
//!     host: String,
//!     port: i32,
//!     environment: Option<String>,
//!     tls_cert: Option<String>,
//!     tls_key: Option<String>,
//! }
//!
//! impl Configuration for ServerConfig {
//!     fn describe() -> ConfigDescriptor<Self> {
//!         ConfigDescriptor::builder()
//!             .param(Param::new("Host", field!(ServerConfig, host)).keys(["SERVER_HOST"]).validate(Required))
//!             // Note that validations handle missing values intelligently; if the value isn't set,
//!             // it will pass range validation.
//!             .param(Param::new("Port", field!(ServerConfig, port)).keys(["SERVER_PORT"]).validate(1_i64..=65_535))
//!             .param(
//!                 Param::new("Environment", field!(ServerConfig, environment))
//!                     .keys(["SERVER_ENV"])
//!                     .validate(OneOf(&["development", "staging", "production"])),
//!             )
//!             .param(Param::new("TlsCert", field!(ServerConfig, tls_cert)).keys(["SERVER_TLS_CERT"]))
//!             .param(Param::new("TlsKey", field!(ServerConfig, tls_key)).keys(["SERVER_TLS_KEY"]))
//!             .validate(WithDescription::predicate(
//!                 |config: &ServerConfig| config.tls_cert.is_some() == config.tls_key.is_some(),
//!                 "TLS certificate and key must be specified together",
//!             ))
//!             .build()
//!     }
//! }
//! ```

use std::{fmt, ops};

pub use self::predicates::{Check, Predicate, Relabeled, WithDescription};
use crate::{
    Configuration,
    error::{ValidationReport, Violation, ViolationKind},
    metadata::ConfigDescriptor,
    value::Value,
};

mod predicates;

/// Error produced by a single failed [`Validate`] check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Creates an error with a custom message.
    pub fn custom(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Generic post-binding validation for a configuration property or a config.
///
/// # Implementations
///
/// Validations are implemented for the following types:
///
/// - [`Range`](ops::Range), [`RangeInclusive`](ops::RangeInclusive) etc. over `i64` and `f64`. Validate whether
///   a numeric property is within the provided bounds. Missing values pass the check.
/// - [`Required`] and [`OneOf`].
/// - [`WithDescription`] wrapping predicates or other validations.
pub trait Validate<T: ?Sized>: 'static + Send + Sync {
    /// Describes this validation.
    ///
    /// # Errors
    ///
    /// Should propagate formatting errors.
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// Validates a property / config.
    ///
    /// # Errors
    ///
    /// Should return an error if validation fails.
    fn validate(&self, target: &T) -> Result<(), ValidationError>;
}

impl<T: 'static + ?Sized> fmt::Debug for dyn Validate<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("Validate")
            .field(&self.to_string())
            .finish()
    }
}

impl<T: 'static + ?Sized> fmt::Display for dyn Validate<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.describe(formatter)
    }
}

/// Requires a property to have a non-empty value.
#[derive(Debug, Clone, Copy)]
pub struct Required;

impl Validate<Value> for Required {
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("is required")
    }

    fn validate(&self, target: &Value) -> Result<(), ValidationError> {
        if target.is_empty() {
            return Err(ValidationError::custom("value is required, but is not set"));
        }
        Ok(())
    }
}

/// Restricts a property to one of the allowed values, compared ignoring ASCII case.
/// Applies to strings, enums and (element-wise) string arrays. Missing values pass the check.
#[derive(Debug, Clone, Copy)]
pub struct OneOf(pub &'static [&'static str]);

impl OneOf {
    fn allows(&self, value: &str) -> bool {
        self.0.iter().any(|allowed| allowed.eq_ignore_ascii_case(value))
    }
}

impl Validate<Value> for OneOf {
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "must be one of {:?}", self.0)
    }

    fn validate(&self, target: &Value) -> Result<(), ValidationError> {
        let disallowed = match target {
            Value::Null => None,
            Value::StringArray(items) => items.iter().find(|item| !self.allows(item)).cloned(),
            other => {
                let value = other.to_string();
                (!self.allows(&value)).then_some(value)
            }
        };
        if let Some(value) = disallowed {
            return Err(ValidationError::custom(format!(
                "value {value:?} is not one of allowed values {:?}",
                self.0
            )));
        }
        Ok(())
    }
}

macro_rules! impl_validate_for_range {
    ($range:ident, $ty:ty, $getter:ident) => {
        impl Validate<Value> for ops::$range<$ty> {
            fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "must be in range {self:?}")
            }

            fn validate(&self, target: &Value) -> Result<(), ValidationError> {
                if matches!(target, Value::Null) {
                    return Ok(());
                }
                let Some(number) = target.$getter() else {
                    return Err(ValidationError::custom(format!(
                        "expected a number, got {target:?}"
                    )));
                };
                if !self.contains(&number) {
                    return Err(ValidationError::custom(format!(
                        "value {number} is not in range {self:?}"
                    )));
                }
                Ok(())
            }
        }
    };
}

macro_rules! impl_validate_for_ranges {
    ($($ty:ty => $getter:ident,)*) => {
        $(
        impl_validate_for_range!(Range, $ty, $getter);
        impl_validate_for_range!(RangeInclusive, $ty, $getter);
        impl_validate_for_range!(RangeTo, $ty, $getter);
        impl_validate_for_range!(RangeToInclusive, $ty, $getter);
        impl_validate_for_range!(RangeFrom, $ty, $getter);
        )*
    };
}

impl_validate_for_ranges!(
    i64 => as_i64,
    f64 => as_f64,
);

/// Validates a bound configuration. Violations deferred from the earlier pipeline stages come first in the report,
/// followed by per-property rules, whole-configuration rules and [`Configuration::validate()`].
#[tracing::instrument(level = "debug", skip_all, fields(config = descriptor.name()))]
pub(crate) fn validate_config<T: Configuration>(
    config: &T,
    descriptor: &ConfigDescriptor<T>,
    deferred: Vec<Violation>,
) -> Result<(), ValidationReport> {
    let mut violations = deferred;
    for property in descriptor.properties() {
        let value = property.get(config);
        for validation in property.validations() {
            if let Err(err) = validation.validate(&value) {
                violations.push(Violation::property(property.name(), ViolationKind::Rule, err.message()));
            }
        }
    }
    for validation in descriptor.validations() {
        if let Err(err) = validation.validate(config) {
            violations.push(Violation::config(err.message()));
        }
    }
    violations.extend(config.validate());

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationReport::new(descriptor.name(), violations))
    }
}
