//! Resolution errors.

use std::{borrow::Cow, fmt, sync::Arc};

use crate::prerequisite::PrerequisiteError;

/// Pipeline stage that produced a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ViolationKind {
    /// Property type cannot be bound automatically.
    Binding,
    /// Custom setter has failed.
    Setter,
    /// Secret reference could not be resolved.
    Secret,
    /// Per-property validation rule is violated.
    Rule,
    /// Whole-config validation is violated.
    Config,
}

/// Single problem with a configuration detected during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    property: Option<Cow<'static, str>>,
    kind: ViolationKind,
    message: String,
}

impl Violation {
    /// Creates a violation for a specific property.
    pub fn property(
        property: impl Into<Cow<'static, str>>,
        kind: ViolationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            property: Some(property.into()),
            kind,
            message: message.into(),
        }
    }

    /// Creates a violation concerning the config as a whole (e.g., a cross-field check).
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            property: None,
            kind: ViolationKind::Config,
            message: message.into(),
        }
    }

    /// Returns the name of the property this violation concerns, if any.
    pub fn property_name(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Returns the stage that has produced this violation.
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Returns the violation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property {
            Some(property) => write!(formatter, "{property}: {}", self.message),
            None => formatter.write_str(&self.message),
        }
    }
}

/// Aggregated result of a failed validation. Contains all violations detected for a config,
/// including deferred binding, setter and secret resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    config: &'static str,
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub(crate) fn new(config: &'static str, violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { config, violations }
    }

    /// Returns the name of the invalid config.
    pub fn config(&self) -> &'static str {
        self.config
    }

    /// Iterates over all violations.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> + '_ {
        self.violations.iter()
    }

    /// Returns the number of violations. A report is never empty.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns violations for the specified property.
    pub fn for_property<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Violation> + 's {
        self.violations
            .iter()
            .filter(move |violation| violation.property_name() == Some(name))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "configuration `{}` is invalid ({} error(s)): ",
            self.config,
            self.violations.len()
        )?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                formatter.write_str("; ")?;
            }
            write!(formatter, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Error resolving a configuration via a [`ResolutionGate`](crate::ResolutionGate).
///
/// [`Self::Invalid`] is terminal: once a config fails validation, all subsequent callers receive the same error.
/// Other variants concern only the current caller and are never cached.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The caller has cancelled waiting.
    #[error("resolution of configuration `{config}` was cancelled")]
    Cancelled {
        /// Name of the config being resolved.
        config: &'static str,
    },
    /// The prerequisite load has failed.
    #[error(transparent)]
    Prerequisite(#[from] PrerequisiteError),
    /// The prerequisite load did not complete in time.
    #[error("timed out waiting for prerequisites of configuration `{config}`")]
    PrerequisiteTimeout {
        /// Name of the config being resolved.
        config: &'static str,
    },
    /// The config is invalid.
    #[error(transparent)]
    Invalid(Arc<ValidationReport>),
}

impl ResolveError {
    /// Returns the validation report if the config is invalid.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Invalid(report) => Some(report),
            _ => None,
        }
    }
}

/// Misuse of a [`CachedLookup`](crate::lookup::CachedLookup) by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum UsageError {
    /// Typed lookup requested for a type without a string conversion.
    #[error("no string conversion is available for type {ty} requested for key `{key}`; supply a conversion function")]
    UnsupportedType {
        /// Requested key.
        key: String,
        /// Name of the requested type.
        ty: &'static str,
    },
    /// The key was previously converted to a different type.
    #[error("key `{key}` was previously read as `{cached}`, but now requested as `{requested}`")]
    TypeMismatch {
        /// Requested key.
        key: String,
        /// Name of the type stored in the cache.
        cached: &'static str,
        /// Name of the requested type.
        requested: &'static str,
    },
}
