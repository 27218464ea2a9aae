//! The assembled runtime configuration.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::catalog::AggregateDescriptor;
use crate::component::Component;
use crate::error::{LifecycleError, LifecycleResult};
use crate::handling::HandlerConfiguration;
use crate::infrastructure::{
    EntityManagerProvider, EventStorageEngine, Serializer, TokenStore, TransactionManager,
};
use crate::lifecycle::LifecycleState;
use crate::messaging::{CommandBus, CommandGateway, EventBus};
use crate::scope::ScopeProvider;

/// Immutable result of an assembly.
///
/// Exposes the final component for every slot plus lifecycle hooks.
/// `Shutdown` is terminal: a configuration that has been shut down rejects
/// `start` and `shutdown` with [`LifecycleError::IllegalState`], no matter
/// which handle the call arrives through.
pub trait Configuration: Send + Sync + Debug {
    /// Subscribe handlers and bring the components up. Only valid once.
    fn start(&self) -> LifecycleResult<()>;

    /// Tear down. A no-op before `start`; rejected after a previous shutdown.
    fn shutdown(&self) -> LifecycleResult<()>;

    /// Where this configuration is in its lifecycle.
    fn state(&self) -> LifecycleState;

    /// The command bus in use.
    fn command_bus(&self) -> Arc<dyn CommandBus>;

    /// Gateway over [`command_bus`](Self::command_bus).
    fn command_gateway(&self) -> Arc<dyn CommandGateway>;

    /// The event bus in use.
    fn event_bus(&self) -> Arc<dyn EventBus>;

    /// The serializer in use.
    fn serializer(&self) -> Arc<dyn Serializer>;

    fn transaction_manager(&self) -> Option<Arc<dyn TransactionManager>> {
        None
    }

    fn entity_manager_provider(&self) -> Option<Arc<dyn EntityManagerProvider>> {
        None
    }

    fn token_store(&self) -> Option<Arc<dyn TokenStore>> {
        None
    }

    fn event_storage_engine(&self) -> Option<Arc<dyn EventStorageEngine>> {
        None
    }

    /// Aggregates in registration order.
    fn aggregates(&self) -> &[AggregateDescriptor];

    /// Handler configurations in registration order.
    fn handler_configurations(&self) -> &[Arc<HandlerConfiguration>];
}

/// Configuration produced by [`DefaultConfigurer`](crate::DefaultConfigurer).
#[derive(Debug)]
pub struct DefaultConfiguration {
    pub(crate) scopes: Arc<dyn ScopeProvider>,
    pub(crate) command_bus: Arc<dyn CommandBus>,
    pub(crate) command_gateway: Arc<dyn CommandGateway>,
    pub(crate) event_bus: Arc<dyn EventBus>,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) transaction_manager: Option<Arc<dyn TransactionManager>>,
    pub(crate) entity_manager_provider: Option<Arc<dyn EntityManagerProvider>>,
    pub(crate) token_store: Arc<dyn TokenStore>,
    pub(crate) event_storage_engine: Option<Arc<dyn EventStorageEngine>>,
    pub(crate) aggregates: Vec<AggregateDescriptor>,
    pub(crate) handler_configurations: Vec<Arc<HandlerConfiguration>>,
    pub(crate) state: Mutex<LifecycleState>,
}

impl Configuration for DefaultConfiguration {
    fn start(&self) -> LifecycleResult<()> {
        let mut state = self.state.lock();
        if *state != LifecycleState::NotStarted {
            return Err(LifecycleError::IllegalState {
                operation: "start",
                state: *state,
            });
        }
        for handlers in &self.handler_configurations {
            handlers.start(
                Arc::clone(&self.event_bus),
                Arc::clone(&self.scopes),
                Some(Arc::clone(&self.token_store)),
            );
        }
        info!(
            aggregates = self.aggregates.len(),
            processors = self.handler_configurations.len(),
            command_bus = self.command_bus.name(),
            event_bus = self.event_bus.name(),
            "configuration started"
        );
        *state = LifecycleState::Started;
        Ok(())
    }

    fn shutdown(&self) -> LifecycleResult<()> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::NotStarted => Ok(()),
            LifecycleState::Shutdown => Err(LifecycleError::IllegalState {
                operation: "shutdown",
                state: *state,
            }),
            LifecycleState::Started => {
                for handlers in self.handler_configurations.iter().rev() {
                    handlers.shutdown();
                }
                *state = LifecycleState::Shutdown;
                info!("configuration shut down");
                Ok(())
            }
        }
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn command_bus(&self) -> Arc<dyn CommandBus> {
        Arc::clone(&self.command_bus)
    }

    fn command_gateway(&self) -> Arc<dyn CommandGateway> {
        Arc::clone(&self.command_gateway)
    }

    fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.event_bus)
    }

    fn serializer(&self) -> Arc<dyn Serializer> {
        Arc::clone(&self.serializer)
    }

    fn transaction_manager(&self) -> Option<Arc<dyn TransactionManager>> {
        self.transaction_manager.clone()
    }

    fn entity_manager_provider(&self) -> Option<Arc<dyn EntityManagerProvider>> {
        self.entity_manager_provider.clone()
    }

    fn token_store(&self) -> Option<Arc<dyn TokenStore>> {
        Some(Arc::clone(&self.token_store))
    }

    fn event_storage_engine(&self) -> Option<Arc<dyn EventStorageEngine>> {
        self.event_storage_engine.clone()
    }

    fn aggregates(&self) -> &[AggregateDescriptor] {
        &self.aggregates
    }

    fn handler_configurations(&self) -> &[Arc<HandlerConfiguration>] {
        &self.handler_configurations
    }
}
