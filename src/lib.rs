//! # Slotwire
//!
//! **Slotwire** wires a runtime configuration together from components the
//! host discovers, using a two-phase protocol: register, then assemble.
//!
//! ## Overview
//!
//! During discovery the host reports what it finds:
//! - **Producers**: one per named slot (command bus, serializer, ...)
//! - **Aggregates**: types the configuration must register
//! - **Handlers**: beans that react to events
//!
//! A single assembly step then resolves every slot in a fixed order, builds
//! an immutable configuration, starts it and publishes its components into
//! the host registry.
//!
//! ## Phases
//!
//! ```text
//! Discovering  - bind producers, add aggregates and handlers
//! Assembling   - resolve slots, drain catalogs, build
//! Assembled    - started and published; shutdown on termination
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use slotwire::prelude::*;
//! use std::sync::Arc;
//!
//! let mut session = AssemblySession::new(AssemblyConfig::new().with_name("orders")).unwrap();
//! session
//!     .bind(ProducerBinding::value(
//!         slots::COMMAND_BUS,
//!         "orders::command_bus",
//!         Arc::new(SimpleCommandBus::new()) as Arc<dyn CommandBus>,
//!     ))
//!     .unwrap();
//! session
//!     .add_aggregate(AggregateDescriptor::named("OrderAggregate"))
//!     .unwrap();
//!
//! let mut host = InMemoryHostRegistry::new();
//! let lifecycle = session.assemble(&mut host).unwrap();
//! assert!(host.lookup::<dyn CommandGateway>().unwrap().is_some());
//!
//! lifecycle.shutdown();
//! ```
//!
//! ## Features
//!
//! - Typed slots with at most one producer each, resolved once and cached
//! - Single-use catalogs for aggregates and handlers
//! - Start/shutdown state machine safe to drive from any thread
//! - Async discovery feed and termination signals on tokio channels

mod assembler;
mod catalog;
mod component;
mod config;
mod configuration;
mod configurer;
mod error;
mod handling;
mod infrastructure;
mod lifecycle;
mod messaging;
mod publication;
mod registry;
mod scope;
mod session;
mod slot;
pub mod stream;

pub mod prelude;

// Re-export core types
pub use assembler::{AssemblyReport, ConfigurationAssembler};
pub use catalog::{
    AggregateCatalog, AggregateDescriptor, Bean, Catalog, Descriptor, HandlerCatalog,
    HandlerDescriptor, HandlerFactory,
};
pub use component::{Component, ComponentExt};
pub use config::{AssemblyConfig, Config, DEFAULT_FEED_BUFFER};
pub use configuration::{Configuration, DefaultConfiguration};
pub use configurer::{Configurer, ConfigurerFactory, DefaultConfigurer, DefaultConfigurerFactory};
pub use error::{
    AssemblyError, BindingError, BindingResult, LifecycleError, LifecycleResult, ProducerError,
    ProducerResult, PublicationError, PublicationResult, SlotwireError, SlotwireResult,
};
pub use handling::{HandlerConfiguration, HandlerConfigurationBuilder, DEFAULT_PROCESSOR};
pub use infrastructure::{
    EmbeddedEventStore, EntityManagerProvider, EventStorageEngine, InMemoryEventStorageEngine,
    InMemoryTokenStore, Serializer, TokenStore, TransactionManager, Utf8Serializer,
};
pub use lifecycle::{LifecycleController, LifecycleState, TerminationSignal};
pub use messaging::{
    CommandBus, CommandGateway, CommandHandler, CommandMessage, CommandResult,
    DefaultCommandGateway, DispatchError, EventBus, EventHandler, EventMessage, EventSubscriber,
    SimpleCommandBus, SimpleEventBus, SubscriptionId,
};
pub use publication::{HostRegistry, InMemoryHostRegistry, Publication, PublicationBridge};
pub use registry::SlotRegistry;
pub use scope::{EmptyScope, Scope, ScopeExt, ScopeProvider, Unscoped};
pub use session::{AssemblySession, SessionPhase};
pub use slot::{slots, DefaultFactory, ProducerBinding, SlotDescriptor, SlotKey};
pub use stream::{discovery_feed, DiscoveryEvent, DiscoverySender, DiscoveryStream};

// Re-export async-trait for convenience
pub use async_trait::async_trait;
