//! External loads that must complete before configurations are resolved.

use std::{borrow::Cow, fmt};

use async_trait::async_trait;
use tokio::sync::watch;

/// Error waiting for a [`Prerequisite`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("prerequisite `{name}` failed: {message}")]
pub struct PrerequisiteError {
    name: Cow<'static, str>,
    message: String,
}

impl PrerequisiteError {
    /// Creates an error for the prerequisite with the specified name.
    pub fn new(name: impl Into<Cow<'static, str>>, message: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Name of the failed prerequisite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Load that must complete before configurations are bound, such as a prefetch of remote key–values.
///
/// `wait()` may be called many times, possibly concurrently. Implementations decide whether a failed load
/// is retried on the next call.
#[async_trait]
pub trait Prerequisite: 'static + Send + Sync + fmt::Debug {
    /// Waits until the load completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the load fails.
    async fn wait(&self) -> Result<(), PrerequisiteError>;
}

type LoadState = Option<Result<(), String>>;

/// Creates a pair of handles for a load driven by external code.
///
/// # Examples
///
/// ```
/// use config_gate::prerequisite::{self, Prerequisite};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (completer, signal) = prerequisite::signal("bootstrap");
/// tokio::spawn(async move {
///     // Perform the load...
///     completer.complete();
/// });
/// signal.wait().await.unwrap();
/// # }
/// ```
pub fn signal(name: impl Into<Cow<'static, str>>) -> (LoadCompleter, LoadSignal) {
    let (sender, receiver) = watch::channel(None);
    let completer = LoadCompleter { sender };
    let signal = LoadSignal {
        name: name.into(),
        receiver,
    };
    (completer, signal)
}

/// Completing side of a [`LoadSignal`]. Dropping the completer without calling any of its methods fails the load.
#[derive(Debug)]
pub struct LoadCompleter {
    sender: watch::Sender<LoadState>,
}

impl LoadCompleter {
    /// Marks the load as successfully completed.
    pub fn complete(self) {
        self.sender.send_replace(Some(Ok(())));
    }

    /// Marks the load as failed.
    pub fn fail(self, message: impl fmt::Display) {
        self.sender.send_replace(Some(Err(message.to_string())));
    }
}

/// [`Prerequisite`] completed by a [`LoadCompleter`]. The outcome is final: a failed signal stays failed.
#[derive(Debug, Clone)]
pub struct LoadSignal {
    name: Cow<'static, str>,
    receiver: watch::Receiver<LoadState>,
}

#[async_trait]
impl Prerequisite for LoadSignal {
    async fn wait(&self) -> Result<(), PrerequisiteError> {
        let mut receiver = self.receiver.clone();
        let state = receiver
            .wait_for(Option::is_some)
            .await
            .map(|state| (*state).clone());
        match state {
            Ok(Some(Ok(()))) => Ok(()),
            Ok(Some(Err(message))) => Err(PrerequisiteError::new(self.name.clone(), message)),
            Ok(None) | Err(_) => Err(PrerequisiteError::new(
                self.name.clone(),
                "load was abandoned before completion",
            )),
        }
    }
}
