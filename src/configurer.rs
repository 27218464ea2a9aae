//! The builder API that slot values are applied to.
//!
//! The assembler drives a [`Configurer`] in a fixed order and finally asks
//! it to build a [`Configuration`]. The builder itself comes from the
//! `configurer` slot, so a producer can swap in a custom one.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::AggregateDescriptor;
use crate::component::Component;
use crate::configuration::{Configuration, DefaultConfiguration};
use crate::error::AssemblyError;
use crate::handling::HandlerConfiguration;
use crate::infrastructure::{
    EmbeddedEventStore, EntityManagerProvider, EventStorageEngine, InMemoryTokenStore,
    Serializer, TokenStore, TransactionManager, Utf8Serializer,
};
use crate::lifecycle::LifecycleState;
use crate::messaging::{
    CommandBus, DefaultCommandGateway, EventBus, SimpleCommandBus, SimpleEventBus,
};
use crate::scope::ScopeProvider;

/// Accepts resolved slot values and builds the configuration.
pub trait Configurer: Send {
    /// Register the entity manager provider.
    fn register_entity_manager_provider(&mut self, provider: Arc<dyn EntityManagerProvider>);

    /// Replace the built-in serializer.
    fn configure_serializer(&mut self, serializer: Arc<dyn Serializer>);

    /// Set the transaction manager.
    fn configure_transaction_manager(&mut self, manager: Arc<dyn TransactionManager>);

    /// Replace the built-in command bus.
    fn configure_command_bus(&mut self, bus: Arc<dyn CommandBus>);

    /// Add a handler configuration to be started with the configuration.
    fn register_handler_configuration(&mut self, handlers: Arc<HandlerConfiguration>);

    /// Replace the built-in event bus.
    fn configure_event_bus(&mut self, bus: Arc<dyn EventBus>);

    /// Replace the built-in token store.
    fn register_token_store(&mut self, store: Arc<dyn TokenStore>);

    /// Back the event bus with an embedded store over `engine`.
    fn configure_embedded_event_store(&mut self, engine: Arc<dyn EventStorageEngine>);

    /// Register an aggregate. Duplicates fail at build time.
    fn configure_aggregate(&mut self, aggregate: AggregateDescriptor);

    /// Validate everything registered and produce the configuration.
    fn build(self: Box<Self>) -> Result<Box<dyn Configuration>, AssemblyError>;
}

/// Creates a fresh builder for an assembly.
pub trait ConfigurerFactory: Send + Sync {
    /// Create a fresh builder.
    fn create(&self, scopes: Arc<dyn ScopeProvider>) -> Box<dyn Configurer>;
}

impl<F> ConfigurerFactory for F
where
    F: Fn(Arc<dyn ScopeProvider>) -> Box<dyn Configurer> + Send + Sync,
{
    fn create(&self, scopes: Arc<dyn ScopeProvider>) -> Box<dyn Configurer> {
        self(scopes)
    }
}

/// Factory for [`DefaultConfigurer`]; the `configurer` slot's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConfigurerFactory;

impl ConfigurerFactory for DefaultConfigurerFactory {
    fn create(&self, scopes: Arc<dyn ScopeProvider>) -> Box<dyn Configurer> {
        Box::new(DefaultConfigurer::new(scopes))
    }
}

/// Builder backed by the in-memory defaults.
///
/// Anything left unset falls back to `SimpleCommandBus`,
/// `DefaultCommandGateway`, `SimpleEventBus` (or an `EmbeddedEventStore`
/// when a storage engine is set), `Utf8Serializer` and `InMemoryTokenStore`.
pub struct DefaultConfigurer {
    scopes: Arc<dyn ScopeProvider>,
    entity_manager_provider: Option<Arc<dyn EntityManagerProvider>>,
    serializer: Option<Arc<dyn Serializer>>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    command_bus: Option<Arc<dyn CommandBus>>,
    handler_configurations: Vec<Arc<HandlerConfiguration>>,
    event_bus: Option<Arc<dyn EventBus>>,
    token_store: Option<Arc<dyn TokenStore>>,
    event_storage_engine: Option<Arc<dyn EventStorageEngine>>,
    aggregates: Vec<AggregateDescriptor>,
}

impl DefaultConfigurer {
    /// Create a builder with no components configured.
    pub fn new(scopes: Arc<dyn ScopeProvider>) -> Self {
        Self {
            scopes,
            entity_manager_provider: None,
            serializer: None,
            transaction_manager: None,
            command_bus: None,
            handler_configurations: Vec::new(),
            event_bus: None,
            token_store: None,
            event_storage_engine: None,
            aggregates: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), AssemblyError> {
        let mut seen = HashSet::new();
        for aggregate in &self.aggregates {
            if !seen.insert(aggregate.name()) {
                return Err(AssemblyError::DuplicateAggregate(aggregate.name().to_string()));
            }
        }

        if let Some(engine) = &self.event_storage_engine {
            if let Some(bus) = &self.event_bus {
                return Err(AssemblyError::ConflictingStorage(format!(
                    "event bus {} cannot be combined with event storage engine {}",
                    bus.name(),
                    engine.name()
                )));
            }
            if engine.requires_transaction_manager() && self.transaction_manager.is_none() {
                return Err(AssemblyError::MissingDependency {
                    component: format!("event storage engine {}", engine.name()),
                    dependency: "transaction manager",
                });
            }
        }
        Ok(())
    }
}

impl Configurer for DefaultConfigurer {
    fn register_entity_manager_provider(&mut self, provider: Arc<dyn EntityManagerProvider>) {
        self.entity_manager_provider = Some(provider);
    }

    fn configure_serializer(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializer = Some(serializer);
    }

    fn configure_transaction_manager(&mut self, manager: Arc<dyn TransactionManager>) {
        self.transaction_manager = Some(manager);
    }

    fn configure_command_bus(&mut self, bus: Arc<dyn CommandBus>) {
        self.command_bus = Some(bus);
    }

    fn register_handler_configuration(&mut self, handlers: Arc<HandlerConfiguration>) {
        self.handler_configurations.push(handlers);
    }

    fn configure_event_bus(&mut self, bus: Arc<dyn EventBus>) {
        self.event_bus = Some(bus);
    }

    fn register_token_store(&mut self, store: Arc<dyn TokenStore>) {
        self.token_store = Some(store);
    }

    fn configure_embedded_event_store(&mut self, engine: Arc<dyn EventStorageEngine>) {
        self.event_storage_engine = Some(engine);
    }

    fn configure_aggregate(&mut self, aggregate: AggregateDescriptor) {
        self.aggregates.push(aggregate);
    }

    fn build(self: Box<Self>) -> Result<Box<dyn Configuration>, AssemblyError> {
        self.validate()?;
        let this = *self;

        let command_bus = this
            .command_bus
            .unwrap_or_else(|| Arc::new(SimpleCommandBus::new()));
        let event_bus: Arc<dyn EventBus> = match (&this.event_storage_engine, this.event_bus) {
            (Some(engine), _) => Arc::new(EmbeddedEventStore::new(
                Arc::clone(engine),
                this.transaction_manager.clone(),
            )),
            (None, Some(bus)) => bus,
            (None, None) => Arc::new(SimpleEventBus::new()),
        };

        Ok(Box::new(DefaultConfiguration {
            scopes: this.scopes,
            command_gateway: Arc::new(DefaultCommandGateway::new(Arc::clone(&command_bus))),
            command_bus,
            event_bus,
            serializer: this.serializer.unwrap_or_else(|| Arc::new(Utf8Serializer)),
            transaction_manager: this.transaction_manager,
            entity_manager_provider: this.entity_manager_provider,
            token_store: this
                .token_store
                .unwrap_or_else(|| Arc::new(InMemoryTokenStore::new())),
            event_storage_engine: this.event_storage_engine,
            aggregates: this.aggregates,
            handler_configurations: this.handler_configurations,
            state: Mutex::new(LifecycleState::NotStarted),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentExt;
    use crate::infrastructure::InMemoryEventStorageEngine;
    use crate::messaging::{DispatchError, EventMessage};
    use crate::scope::Unscoped;
    use std::any::Any;

    #[derive(Debug)]
    struct JdbcEngine;

    impl Component for JdbcEngine {
        fn name(&self) -> &str {
            "JdbcEngine"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl EventStorageEngine for JdbcEngine {
        fn append_events(&self, _events: &[EventMessage]) -> Result<(), DispatchError> {
            Ok(())
        }

        fn read_events(&self) -> Vec<EventMessage> {
            Vec::new()
        }

        fn requires_transaction_manager(&self) -> bool {
            true
        }
    }

    fn configurer() -> Box<dyn Configurer> {
        DefaultConfigurerFactory.create(Arc::new(Unscoped))
    }

    #[test]
    fn test_defaults_fill_unset_components() {
        let configuration = configurer().build().unwrap();
        assert!(configuration.command_bus().is::<SimpleCommandBus>());
        assert!(configuration.event_bus().is::<SimpleEventBus>());
        assert!(configuration.serializer().is::<Utf8Serializer>());
        assert!(configuration.token_store().is_some());
        assert!(configuration.aggregates().is_empty());
    }

    #[test]
    fn test_storage_engine_wraps_event_bus() {
        let mut configurer = configurer();
        configurer.configure_embedded_event_store(Arc::new(InMemoryEventStorageEngine::new()));
        let configuration = configurer.build().unwrap();
        assert!(configuration.event_bus().is::<EmbeddedEventStore>());
        assert!(configuration.event_storage_engine().is_some());
    }

    #[test]
    fn test_storage_engine_conflicts_with_event_bus() {
        let mut configurer = configurer();
        configurer.configure_event_bus(Arc::new(SimpleEventBus::new()));
        configurer.configure_embedded_event_store(Arc::new(InMemoryEventStorageEngine::new()));
        assert!(matches!(
            configurer.build(),
            Err(AssemblyError::ConflictingStorage(_))
        ));
    }

    #[test]
    fn test_storage_engine_missing_transaction_manager() {
        let mut configurer = configurer();
        configurer.configure_embedded_event_store(Arc::new(JdbcEngine));
        let err = configurer.build().unwrap_err();
        assert_eq!(
            err,
            AssemblyError::MissingDependency {
                component: "event storage engine JdbcEngine".to_string(),
                dependency: "transaction manager",
            }
        );
    }

    #[test]
    fn test_duplicate_aggregate_rejected() {
        let mut configurer = configurer();
        configurer.configure_aggregate(AggregateDescriptor::named("OrderAggregate"));
        configurer.configure_aggregate(AggregateDescriptor::named("OrderAggregate"));
        assert_eq!(
            configurer.build().unwrap_err(),
            AssemblyError::DuplicateAggregate("OrderAggregate".to_string())
        );
    }
}
