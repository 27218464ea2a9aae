//! Prelude module for convenient imports.
//!
//! This module re-exports the types and traits most hosts need to run an
//! assembly session.
//!
//! # Example
//!
//! ```rust
//! use slotwire::prelude::*;
//! ```

// Configuration
pub use crate::config::{AssemblyConfig, Config};

// Slots and discovery
pub use crate::catalog::{AggregateDescriptor, Bean, HandlerDescriptor, HandlerFactory};
pub use crate::registry::SlotRegistry;
pub use crate::slot::{slots, ProducerBinding, SlotDescriptor, SlotKey};
pub use crate::stream::{DiscoveryEvent, DiscoverySender, DiscoveryStream};

// Components
pub use crate::component::{Component, ComponentExt};
pub use crate::infrastructure::{
    EntityManagerProvider, EventStorageEngine, Serializer, TokenStore, TransactionManager,
};
pub use crate::messaging::{
    CommandBus, CommandGateway, CommandMessage, DispatchError, EventBus, EventHandler,
    EventMessage, SimpleCommandBus, SimpleEventBus,
};
pub use crate::scope::{Scope, ScopeExt, ScopeProvider};

// Assembly and lifecycle
pub use crate::configuration::Configuration;
pub use crate::configurer::{Configurer, ConfigurerFactory};
pub use crate::handling::HandlerConfiguration;
pub use crate::lifecycle::{LifecycleController, LifecycleState, TerminationSignal};
pub use crate::publication::{HostRegistry, InMemoryHostRegistry, Publication};
pub use crate::session::{AssemblySession, SessionPhase};

// Errors
pub use crate::error::{
    AssemblyError, BindingError, LifecycleError, ProducerError, ProducerResult, PublicationError,
    SlotwireError, SlotwireResult,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
