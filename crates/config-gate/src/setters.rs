//! Execution of custom setters.

use tokio_util::sync::CancellationToken;

use crate::{
    error::{ResolveError, Violation, ViolationKind},
    metadata::{ConfigDescriptor, SetterAction},
};

/// Runs custom setters sequentially in their declared order. Errors from async setters are recorded in `violations`.
///
/// # Errors
///
/// Returns [`ResolveError::Cancelled`] if `cancel` fires while an async setter is running.
#[tracing::instrument(level = "debug", skip_all, fields(config = descriptor.name()))]
pub(crate) async fn run_setters<T: Send + 'static>(
    config: &mut T,
    descriptor: &ConfigDescriptor<T>,
    violations: &mut Vec<Violation>,
    cancel: &CancellationToken,
) -> Result<(), ResolveError> {
    for setter in descriptor.setters() {
        tracing::debug!(setter = setter.name(), order = setter.order(), "running setter");
        match &setter.action {
            SetterAction::Sync(action) => action(config),
            SetterAction::Async(action) => {
                let outcome = tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(ResolveError::Cancelled {
                            config: descriptor.name(),
                        });
                    }
                    outcome = action(config) => outcome,
                };
                if let Err(err) = outcome {
                    tracing::warn!(setter = setter.name(), %err, "setter failed");
                    violations.push(Violation::property(
                        setter.name(),
                        ViolationKind::Setter,
                        format!("{err:#}"),
                    ));
                }
            }
        }
    }
    Ok(())
}
