//! Append-only catalogs of discovered aggregates and event handlers.
//!
//! Catalogs fill up during discovery and are drained exactly once by the
//! assembler. After the drain a catalog is sealed: it reports empty and
//! refuses further additions.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BindingError, BindingResult, ProducerResult};
use crate::messaging::EventHandler;
use crate::scope::Scope;

/// Something a catalog can hold.
pub trait Descriptor {
    /// Short label used in logs and errors.
    fn label(&self) -> &str;
}

/// A discovered aggregate type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateDescriptor {
    name: String,
    type_name: Option<&'static str>,
}

impl AggregateDescriptor {
    /// Describe a Rust type, named by its last path segment.
    pub fn of<T: Any>() -> Self {
        let full = type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self {
            name: short.to_string(),
            type_name: Some(full),
        }
    }

    /// Describe an aggregate known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }

    /// The aggregate's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The Rust type backing the aggregate, if known.
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }
}

impl Descriptor for AggregateDescriptor {
    fn label(&self) -> &str {
        &self.name
    }
}

/// Builds a handler instance within a scope; called once per dispatch.
pub type HandlerFactory =
    Arc<dyn Fn(&dyn Scope) -> ProducerResult<Arc<dyn EventHandler>> + Send + Sync>;

/// A discovered handler bean and the factory that instantiates it.
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: String,
    factory: HandlerFactory,
}

impl HandlerDescriptor {
    /// Describe a handler built by `factory` on each invocation.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&dyn Scope) -> ProducerResult<Arc<dyn EventHandler>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Describe a handler from a shared factory.
    pub fn from_factory(name: impl Into<String>, factory: HandlerFactory) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }

    /// The handler's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a handler instance for one dispatch.
    pub fn instantiate(&self, scope: &dyn Scope) -> ProducerResult<Arc<dyn EventHandler>> {
        (self.factory)(scope)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Descriptor for HandlerDescriptor {
    fn label(&self) -> &str {
        &self.name
    }
}

/// A bean seen by the host's scanning pass.
///
/// A bean that can react to events returns a factory from
/// [`Bean::event_handler_factory`]; that check happens once, at discovery.
pub trait Bean: Send + Sync {
    /// Name used in diagnostics.
    fn bean_name(&self) -> &str;

    fn event_handler_factory(&self) -> Option<HandlerFactory> {
        None
    }
}

/// Append-only collection drained once by the assembler.
#[derive(Debug)]
pub struct Catalog<D> {
    entries: Vec<D>,
    sealed: bool,
}

pub type AggregateCatalog = Catalog<AggregateDescriptor>;

pub type HandlerCatalog = Catalog<HandlerDescriptor>;

impl<D: Descriptor> Catalog<D> {
    /// Create an open, empty catalog.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sealed: false,
        }
    }

    /// Append a descriptor. Fails once the catalog has been drained.
    pub fn add(&mut self, descriptor: D) -> BindingResult<()> {
        if self.sealed {
            return Err(BindingError::DiscoveryClosed(descriptor.label().to_string()));
        }
        self.entries.push(descriptor);
        Ok(())
    }

    /// Take every entry. Later drains return nothing.
    pub fn drain(&mut self) -> Vec<D> {
        self.sealed = true;
        std::mem::take(&mut self.entries)
    }

    /// Check if the catalog has been drained.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Get the number of pending descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no descriptors are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate pending descriptors in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.iter()
    }
}

impl<D: Descriptor> Default for Catalog<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog<HandlerDescriptor> {
    /// Record `bean` if it exposes an event handler. Returns whether it did.
    pub fn inspect(&mut self, bean: &dyn Bean) -> BindingResult<bool> {
        match bean.event_handler_factory() {
            Some(factory) => {
                debug!(bean = bean.bean_name(), "found event handler");
                self.add(HandlerDescriptor::from_factory(bean.bean_name(), factory))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
