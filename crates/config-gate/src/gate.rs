//! Once-per-process resolution of a single configuration type.

use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    Configuration,
    bind::bind,
    disclosure::{DisclosureSink, disclose},
    error::ResolveError,
    lookup::CachedLookup,
    metadata::ConfigDescriptor,
    prerequisite::{Prerequisite, PrerequisiteError},
    secrets::SecretResolver,
    setters::run_setters,
    validation::validate_config,
};

/// Collaborators shared by all gates of a [`ConfigHost`](crate::ConfigHost).
#[derive(Debug)]
pub(crate) struct ResolveContext {
    pub(crate) lookup: Arc<CachedLookup>,
    pub(crate) secrets: SecretResolver,
    pub(crate) prerequisite: Option<Arc<dyn Prerequisite>>,
    pub(crate) prerequisite_timeout: Option<Duration>,
    pub(crate) sink: Arc<dyn DisclosureSink>,
}

impl ResolveContext {
    /// Waits for the prerequisite if there is one. Returns `None` if the wait has timed out.
    ///
    /// Nothing may be read from `lookup` before this succeeds; its cache is first-read-wins.
    pub(crate) async fn wait_for_prerequisite(&self) -> Option<Result<(), PrerequisiteError>> {
        let Some(prerequisite) = &self.prerequisite else {
            return Some(Ok(()));
        };
        let wait = prerequisite.wait();
        match self.prerequisite_timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.ok(),
            None => Some(wait.await),
        }
    }
}

/// Observable state of a [`ResolutionGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateState {
    /// Resolution has not started, or the last attempt was cancelled or failed on a prerequisite.
    Empty,
    /// Resolution is in progress.
    Resolving,
    /// The config is resolved and cached.
    Resolved,
    /// The config is invalid; the error is cached.
    Failed,
}

/// Resets the resolving flag even if the resolving future is dropped midway.
struct ResolvingFlag<'a>(&'a AtomicBool);

impl<'a> ResolvingFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ResolvingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Gate ensuring that a configuration of type `T` is resolved at most once.
///
/// The first caller of [`Self::get()`] runs the resolution pipeline: waiting for the prerequisite, binding,
/// custom setters, secret resolution, disclosure and validation. Concurrent callers wait for the outcome;
/// subsequent callers get the cached outcome immediately. Both valid configs and validation failures are cached.
/// Cancellation and prerequisite failures are not cached, so the next caller retries.
pub struct ResolutionGate<T: Configuration> {
    descriptor: ConfigDescriptor<T>,
    context: Arc<ResolveContext>,
    lock: Mutex<()>,
    resolving: AtomicBool,
    outcome: OnceLock<Result<Arc<T>, ResolveError>>,
}

impl<T: Configuration> fmt::Debug for ResolutionGate<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResolutionGate")
            .field("config", &self.descriptor.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Configuration> ResolutionGate<T> {
    pub(crate) fn new(context: Arc<ResolveContext>) -> Self {
        Self {
            descriptor: T::describe(),
            context,
            lock: Mutex::new(()),
            resolving: AtomicBool::new(false),
            outcome: OnceLock::new(),
        }
    }

    /// Returns the descriptor of the gated config.
    pub fn descriptor(&self) -> &ConfigDescriptor<T> {
        &self.descriptor
    }

    /// Returns the current state of this gate.
    pub fn state(&self) -> GateState {
        match self.outcome.get() {
            Some(Ok(_)) => GateState::Resolved,
            Some(Err(_)) => GateState::Failed,
            None if self.resolving.load(Ordering::Acquire) => GateState::Resolving,
            None => GateState::Empty,
        }
    }

    /// Returns the cached outcome without triggering resolution.
    pub fn get_cached(&self) -> Option<Result<Arc<T>, ResolveError>> {
        self.outcome.get().cloned()
    }

    /// Gets the resolved config, running resolution if necessary.
    ///
    /// `cancel` only aborts the wait of this caller. If this caller runs the pipeline, cancellation aborts it
    /// without caching anything.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Invalid`] if the config is invalid. This error is cached.
    /// - [`ResolveError::Cancelled`] if `cancel` fires before the outcome is available.
    /// - [`ResolveError::Prerequisite`] / [`ResolveError::PrerequisiteTimeout`] if the prerequisite fails.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Arc<T>, ResolveError> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        let _guard = tokio::select! {
            () = cancel.cancelled() => return Err(self.cancelled()),
            guard = self.lock.lock() => guard,
        };
        // Another caller may have resolved the config while we were waiting for the lock.
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        let _resolving = ResolvingFlag::set(&self.resolving);
        self.wait_for_prerequisite(cancel).await?;
        match self.run_pipeline(cancel).await {
            Ok(config) => self.outcome.get_or_init(|| Ok(config)).clone(),
            Err(err @ ResolveError::Invalid(_)) => self.outcome.get_or_init(|| Err(err)).clone(),
            Err(err) => Err(err),
        }
    }

    fn cancelled(&self) -> ResolveError {
        ResolveError::Cancelled {
            config: self.descriptor.name(),
        }
    }

    async fn wait_for_prerequisite(&self, cancel: &CancellationToken) -> Result<(), ResolveError> {
        if self.context.prerequisite.is_none() {
            return Ok(());
        }

        let wait = async {
            match self.context.wait_for_prerequisite().await {
                Some(result) => result.map_err(ResolveError::from),
                None => Err(ResolveError::PrerequisiteTimeout {
                    config: self.descriptor.name(),
                }),
            }
        };
        let result = tokio::select! {
            () = cancel.cancelled() => Err(self.cancelled()),
            result = wait => result,
        };
        if let Err(err) = &result {
            tracing::warn!(config = self.descriptor.name(), %err, "prerequisite is not satisfied");
        }
        result
    }

    #[tracing::instrument(level = "debug", skip_all, fields(config = self.descriptor.name()))]
    async fn run_pipeline(&self, cancel: &CancellationToken) -> Result<Arc<T>, ResolveError> {
        let started_at = Instant::now();
        let mut config = T::default();
        let mut violations = vec![];

        bind(&mut config, &self.descriptor, &self.context.lookup, &mut violations);
        run_setters(&mut config, &self.descriptor, &mut violations, cancel).await?;
        tokio::select! {
            () = cancel.cancelled() => return Err(self.cancelled()),
            () = self.context.secrets.resolve(&mut config, &self.descriptor, &mut violations) => {}
        }
        disclose(&config, &self.descriptor, self.context.sink.as_ref());

        match validate_config(&config, &self.descriptor, violations) {
            Ok(()) => {
                tracing::info!(elapsed = ?started_at.elapsed(), "resolved configuration");
                Ok(Arc::new(config))
            }
            Err(report) => {
                tracing::error!(%report, "configuration is invalid");
                Err(ResolveError::Invalid(Arc::new(report)))
            }
        }
    }
}
