use std::{fmt, marker::PhantomData};

use super::{Validate, ValidationError};

/// Marks a [`WithDescription`] that relabels another [`Validate`] implementation.
#[derive(Debug)]
pub struct Relabeled(());

/// Marks a [`WithDescription`] around a closure returning `bool`.
#[derive(Debug)]
pub struct Predicate(());

/// Marks a [`WithDescription`] around a closure returning `Result<(), ValidationError>`.
#[derive(Debug)]
pub struct Check(());

/// Validation with a human-readable description shown in disclosure and violation messages.
///
/// Constructed with [`Self::relabel()`], [`Self::predicate()`] or [`Self::check()`]; the marker type `M`
/// records which of them was used.
pub struct WithDescription<V, M> {
    inner: V,
    description: &'static str,
    _marker: PhantomData<M>,
}

impl<V, M> fmt::Debug for WithDescription<V, M> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WithDescription")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<V, M> WithDescription<V, M> {
    const fn wrap(inner: V, description: &'static str) -> Self {
        Self {
            inner,
            description,
            _marker: PhantomData,
        }
    }
}

impl<V> WithDescription<V, Relabeled> {
    /// Replaces the description of `inner`; violations are still produced by `inner`.
    pub const fn relabel(inner: V, description: &'static str) -> Self {
        Self::wrap(inner, description)
    }
}

impl<F> WithDescription<F, Predicate> {
    /// Fails with `description` as the violation message when `inner` returns `false`.
    pub const fn predicate(inner: F, description: &'static str) -> Self {
        Self::wrap(inner, description)
    }
}

impl<F> WithDescription<F, Check> {
    /// Reports the error returned by `inner` as is.
    pub const fn check(inner: F, description: &'static str) -> Self {
        Self::wrap(inner, description)
    }
}

impl<T: ?Sized, V: Validate<T>> Validate<T> for WithDescription<V, Relabeled> {
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.description)
    }

    fn validate(&self, target: &T) -> Result<(), ValidationError> {
        self.inner.validate(target)
    }
}

impl<T: ?Sized, F> Validate<T> for WithDescription<F, Predicate>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.description)
    }

    fn validate(&self, target: &T) -> Result<(), ValidationError> {
        if (self.inner)(target) {
            Ok(())
        } else {
            Err(ValidationError::custom(self.description))
        }
    }
}

impl<T: ?Sized, F> Validate<T> for WithDescription<F, Check>
where
    F: Fn(&T) -> Result<(), ValidationError> + Send + Sync + 'static,
{
    fn describe(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.description)
    }

    fn validate(&self, target: &T) -> Result<(), ValidationError> {
        (self.inner)(target)
    }
}
