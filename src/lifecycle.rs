//! Start/shutdown state machine for an assembled configuration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::configuration::Configuration;
use crate::error::{LifecycleError, LifecycleResult};

/// Where a configuration is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    NotStarted,
    Started,
    /// Terminal.
    Shutdown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Shutdown => "shut down",
        };
        f.write_str(label)
    }
}

struct Inner {
    state: LifecycleState,
    configuration: Option<Arc<dyn Configuration>>,
}

/// Guards the `NotStarted -> Started -> Shutdown` transitions.
///
/// All transitions go through one mutex, so `shutdown` may be called from
/// any thread and tears down at most once.
pub struct LifecycleController {
    inner: Mutex<Inner>,
}

impl LifecycleController {
    /// Create a controller in `NotStarted`.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::NotStarted,
                configuration: None,
            }),
        }
    }

    /// Start `configuration`. Fails unless both the controller and the
    /// configuration have never started.
    pub fn start(&self, configuration: Box<dyn Configuration>) -> LifecycleResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != LifecycleState::NotStarted {
            return Err(LifecycleError::IllegalState {
                operation: "start",
                state: inner.state,
            });
        }
        let configuration: Arc<dyn Configuration> = Arc::from(configuration);
        configuration.start()?;
        inner.configuration = Some(configuration);
        inner.state = LifecycleState::Started;
        info!("lifecycle started");
        Ok(())
    }

    /// Shut the configuration down.
    ///
    /// Returns `true` only for the call that performed the teardown. From
    /// `NotStarted` or `Shutdown` this is a no-op.
    pub fn shutdown(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != LifecycleState::Started {
            debug!(state = %inner.state, "shutdown ignored");
            return false;
        }
        if let Some(configuration) = inner.configuration.take() {
            if let Err(err) = configuration.shutdown() {
                warn!(error = %err, "configuration was shut down through another handle");
            }
        }
        inner.state = LifecycleState::Shutdown;
        info!("lifecycle shut down");
        true
    }

    /// The current state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Check if the configuration is running.
    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// The running configuration; only available while started.
    pub fn configuration(&self) -> LifecycleResult<Arc<dyn Configuration>> {
        let inner = self.inner.lock();
        match (&inner.configuration, inner.state) {
            (Some(configuration), LifecycleState::Started) => Ok(Arc::clone(configuration)),
            (_, state) => Err(LifecycleError::IllegalState {
                operation: "access configuration",
                state,
            }),
        }
    }

    /// Wait for `signal`, then shut down.
    pub async fn shutdown_on<S: TerminationSignal>(&self, mut signal: S) -> bool {
        signal.terminated().await;
        debug!("termination signal received");
        self.shutdown()
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .finish()
    }
}

/// The host's "application scope is ending" event.
#[async_trait]
pub trait TerminationSignal: Send {
    /// Resolve once the host is terminating.
    async fn terminated(&mut self);
}

/// Fires when a value is sent or the sender is dropped.
#[async_trait]
impl TerminationSignal for oneshot::Receiver<()> {
    async fn terminated(&mut self) {
        let _ = self.await;
    }
}

/// Fires once the value becomes `true` or the sender is dropped.
#[async_trait]
impl TerminationSignal for watch::Receiver<bool> {
    async fn terminated(&mut self) {
        loop {
            let terminated = *self.borrow_and_update();
            if terminated || self.changed().await.is_err() {
                return;
            }
        }
    }
}
