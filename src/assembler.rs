//! Folds slots and catalogs into one configuration.
//!
//! The assembler runs once per session. It resolves every standard slot in
//! a fixed order, because later steps depend on what earlier ones
//! registered: the storage engine is resolved after the transaction
//! manager it may need.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{AggregateCatalog, HandlerCatalog};
use crate::component::Component;
use crate::config::{AssemblyConfig, Config};
use crate::configuration::Configuration;
use crate::configurer::{ConfigurerFactory, DefaultConfigurerFactory};
use crate::error::{AssemblyError, SlotwireResult};
use crate::handling::{HandlerConfiguration, DEFAULT_PROCESSOR};
use crate::registry::SlotRegistry;
use crate::scope::ScopeProvider;
use crate::slot::{slots, SlotKey};

/// What an assembly took from producers, defaults and catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Slots whose value came from a bound producer, in resolution order
    pub producer_supplied: Vec<&'static str>,
    /// Slots whose value came from the slot's default factory
    pub defaulted: Vec<&'static str>,
    /// Aggregates registered with the builder
    pub aggregates: usize,
    /// Handlers in the registered handler configuration
    pub handlers: usize,
    /// Discovered handlers dropped in favour of a produced handler configuration
    pub discarded_handlers: usize,
}

impl AssemblyReport {
    /// Check whether a producer supplied the named slot.
    pub fn is_externally_supplied(&self, slot: &str) -> bool {
        self.producer_supplied.iter().any(|s| *s == slot)
    }

    /// Check whether the named slot fell back to its default factory.
    pub fn is_defaulted(&self, slot: &str) -> bool {
        self.defaulted.iter().any(|s| *s == slot)
    }
}

/// Drives a [`Configurer`](crate::Configurer) through the slot catalogue.
#[derive(Debug)]
pub struct ConfigurationAssembler<'a> {
    config: &'a AssemblyConfig,
    scopes: Arc<dyn ScopeProvider>,
    report: AssemblyReport,
}

impl<'a> ConfigurationAssembler<'a> {
    /// Create an assembler for one run.
    pub fn new(config: &'a AssemblyConfig, scopes: Arc<dyn ScopeProvider>) -> Self {
        Self {
            config,
            scopes,
            report: AssemblyReport::default(),
        }
    }

    /// Resolve every slot, drain both catalogs and build the configuration.
    ///
    /// Producer errors are returned untouched; nothing is built when any
    /// step fails.
    pub fn assemble(
        mut self,
        registry: &mut SlotRegistry,
        aggregates: &mut AggregateCatalog,
        handlers: &mut HandlerCatalog,
    ) -> SlotwireResult<(Box<dyn Configuration>, AssemblyReport)> {
        let app = self.config.name().to_string();
        info!(app = %app, "assembling configuration");

        let factory = self
            .resolve(registry, slots::CONFIGURER)?
            .unwrap_or_else(|| Arc::new(DefaultConfigurerFactory) as Arc<dyn ConfigurerFactory>);
        let mut configurer = factory.create(Arc::clone(&self.scopes));

        if let Some(provider) = self.resolve(registry, slots::ENTITY_MANAGER_PROVIDER)? {
            info!(component = provider.name(), "registering entity manager provider");
            configurer.register_entity_manager_provider(provider);
        }
        if let Some(serializer) = self.resolve(registry, slots::SERIALIZER)? {
            info!(component = serializer.name(), "registering serializer");
            configurer.configure_serializer(serializer);
        }
        if let Some(manager) = self.resolve(registry, slots::TRANSACTION_MANAGER)? {
            info!(component = manager.name(), "registering transaction manager");
            configurer.configure_transaction_manager(manager);
        }

        match self.resolve(registry, slots::COMMAND_BUS)? {
            Some(bus) => {
                info!(component = bus.name(), "registering command bus");
                configurer.configure_command_bus(bus);
            }
            None => info!("no command bus producer, using built-in"),
        }

        let discovered = handlers.drain();
        let discovered_count = discovered.len();
        match self.resolve(registry, slots::HANDLER_CONFIGURATION)? {
            Some(produced) => {
                if discovered_count > 0 {
                    if self.config.strict_handler_override {
                        return Err(AssemblyError::DiscardedHandlers(discovered_count).into());
                    }
                    warn!(
                        discarded = discovered_count,
                        processor = produced.processor(),
                        "handler configuration producer overrides discovered handlers"
                    );
                    self.report.discarded_handlers = discovered_count;
                }
                info!(processor = produced.processor(), "registering handler configuration");
                self.report.handlers = produced.len();
                configurer.register_handler_configuration(produced);
            }
            None if discovered_count > 0 => {
                for handler in &discovered {
                    self.log_registration("event handler", handler.name());
                }
                let built = HandlerConfiguration::builder(DEFAULT_PROCESSOR)
                    .register_all(discovered)
                    .build();
                self.report.handlers = built.len();
                configurer.register_handler_configuration(Arc::new(built));
            }
            None => debug!("no event handlers discovered"),
        }

        if let Some(bus) = self.resolve(registry, slots::EVENT_BUS)? {
            info!(component = bus.name(), "registering event bus");
            configurer.configure_event_bus(bus);
        }

        if let Some(store) = self.resolve(registry, slots::TOKEN_STORE)? {
            info!(component = store.name(), "registering token store");
            configurer.register_token_store(store);
        }
        if let Some(engine) = self.resolve(registry, slots::EVENT_STORAGE_ENGINE)? {
            info!(component = engine.name(), "registering embedded event store");
            configurer.configure_embedded_event_store(engine);
        }

        for aggregate in aggregates.drain() {
            self.log_registration("aggregate", aggregate.name());
            self.report.aggregates += 1;
            configurer.configure_aggregate(aggregate);
        }

        let configuration = configurer.build()?;
        info!(
            app = %app,
            aggregates = self.report.aggregates,
            handlers = self.report.handlers,
            producers = self.report.producer_supplied.len(),
            "configuration assembled"
        );
        Ok((configuration, self.report))
    }

    fn resolve<T>(
        &mut self,
        registry: &mut SlotRegistry,
        key: SlotKey<T>,
    ) -> SlotwireResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value = registry.resolve(key, self.scopes.as_ref())?;
        if registry.is_bound(key.name()) {
            self.report.producer_supplied.push(key.name());
        } else if value.is_some() {
            self.report.defaulted.push(key.name());
        }
        Ok(value)
    }

    fn log_registration(&self, kind: &str, name: &str) {
        if self.config.is_verbose() {
            info!(kind, name, "registering");
        } else {
            debug!(kind, name, "registering");
        }
    }
}
