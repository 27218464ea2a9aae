//! Publishing the running configuration into the host registry.
//!
//! The host makes values lookupable by type. Each publication carries a
//! supplier rather than a value; suppliers read through the lifecycle
//! controller, so lookups fail once the configuration has shut down.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::assembler::AssemblyReport;
use crate::configuration::Configuration;
use crate::error::{PublicationError, PublicationResult, SlotwireResult};
use crate::infrastructure::Serializer;
use crate::lifecycle::LifecycleController;
use crate::messaging::{CommandBus, CommandGateway, EventBus};
use crate::slot::slots;

type Published = Box<dyn Any + Send + Sync>;

type Supplier = Box<dyn Fn() -> PublicationResult<Published> + Send + Sync>;

/// A value made lookupable by type, produced on demand.
pub struct Publication {
    type_id: TypeId,
    type_name: &'static str,
    supplier: Supplier,
}

impl Publication {
    /// Publish whatever `supplier` returns as a `T`.
    pub fn of<T, F>(supplier: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> PublicationResult<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<Arc<T>>(),
            type_name: type_name::<T>(),
            supplier: Box::new(move || Ok(Box::new(supplier()?) as Published)),
        }
    }

    /// Publish an already-built value.
    pub fn value<T>(value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::of(move || Ok(Arc::clone(&value)))
    }

    /// Name of the published type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn supply<T>(&self) -> PublicationResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value = (self.supplier)()?;
        Ok(value.downcast_ref::<Arc<T>>().cloned())
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// The host application's type-indexed singleton registry.
pub trait HostRegistry: Send {
    /// Make a value lookupable by its type.
    ///
    /// Must fail with [`PublicationError::Ambiguous`] if the type is
    /// already published.
    fn publish(&mut self, publication: Publication) -> PublicationResult<()>;
}

/// A `HostRegistry` kept in memory.
///
/// # Example
///
/// ```rust
/// use slotwire::{InMemoryHostRegistry, HostRegistry, Publication};
/// use std::sync::Arc;
///
/// let mut host = InMemoryHostRegistry::new();
/// host.publish(Publication::value(Arc::new(7u32))).unwrap();
/// assert!(host.publish(Publication::value(Arc::new(8u32))).is_err());
///
/// let value = host.lookup::<u32>().unwrap();
/// assert_eq!(value.as_deref(), Some(&7));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryHostRegistry {
    publications: HashMap<TypeId, Publication>,
    order: Vec<&'static str>,
}

impl InMemoryHostRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the value published for `T`, invoking its supplier.
    pub fn lookup<T>(&self) -> PublicationResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.publications.get(&TypeId::of::<Arc<T>>()) {
            Some(publication) => publication.supply::<T>(),
            None => Ok(None),
        }
    }

    /// Check if a value is published for `T`.
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.publications.contains_key(&TypeId::of::<Arc<T>>())
    }

    /// Published type names, in publication order.
    pub fn type_names(&self) -> &[&'static str] {
        &self.order
    }

    /// Get the number of publications.
    pub fn len(&self) -> usize {
        self.publications.len()
    }

    /// Check if nothing is published.
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}

impl HostRegistry for InMemoryHostRegistry {
    fn publish(&mut self, publication: Publication) -> PublicationResult<()> {
        if self.publications.contains_key(&publication.type_id) {
            return Err(PublicationError::Ambiguous(publication.type_name));
        }
        debug!(type_name = publication.type_name, "published");
        self.order.push(publication.type_name);
        self.publications.insert(publication.type_id, publication);
        Ok(())
    }
}

/// Exposes a started configuration's components to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicationBridge;

impl PublicationBridge {
    /// Publish the configuration, command bus, command gateway and event
    /// bus, plus the serializer when no producer supplied one.
    ///
    /// The controller must be started.
    pub fn publish(
        host: &mut dyn HostRegistry,
        lifecycle: &Arc<LifecycleController>,
        report: &AssemblyReport,
    ) -> SlotwireResult<()> {
        lifecycle.configuration()?;

        let controller = Arc::clone(lifecycle);
        host.publish(Publication::of(move || {
            controller.configuration().map_err(PublicationError::from)
        }))?;
        host.publish(Self::component::<dyn CommandBus>(lifecycle, |c| c.command_bus()))?;
        host.publish(Self::component::<dyn CommandGateway>(lifecycle, |c| {
            c.command_gateway()
        }))?;
        host.publish(Self::component::<dyn EventBus>(lifecycle, |c| c.event_bus()))?;

        if report.is_externally_supplied(slots::SERIALIZER.name()) {
            debug!("serializer supplied by a producer, not publishing");
        } else {
            host.publish(Self::component::<dyn Serializer>(lifecycle, |c| c.serializer()))?;
        }

        info!("configuration published");
        Ok(())
    }

    fn component<T>(
        lifecycle: &Arc<LifecycleController>,
        get: fn(&dyn Configuration) -> Arc<T>,
    ) -> Publication
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let controller = Arc::clone(lifecycle);
        Publication::of(move || Ok(get(controller.configuration()?.as_ref())))
    }
}
