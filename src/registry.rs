//! Registry of slots and their producer bindings.
//!
//! The `SlotRegistry` holds a fixed catalogue of typed slots. During
//! discovery each slot accepts at most one producer; during assembly each
//! slot is resolved at most once and the result is cached. The first
//! resolution seals the registry against further definitions and bindings.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::configurer::{ConfigurerFactory, DefaultConfigurerFactory};
use crate::error::{AssemblyError, BindingError, BindingResult, ProducerResult, SlotwireResult};
use crate::scope::ScopeProvider;
use crate::slot::{slots, ProducerBinding, SlotDescriptor, SlotKey, SlotValue};

/// A registry of slots, their producers and their resolved values.
///
/// # Example
///
/// ```rust
/// use slotwire::{ProducerBinding, SlotDescriptor, SlotKey, SlotRegistry, Unscoped};
/// use std::sync::Arc;
///
/// const RETRIES: SlotKey<u32> = SlotKey::new("retries");
///
/// let mut registry = SlotRegistry::new();
/// registry
///     .define(SlotDescriptor::with_default(RETRIES, |_| Ok(Arc::new(3))))
///     .unwrap();
/// registry
///     .bind(ProducerBinding::value(RETRIES, "app", Arc::new(5)))
///     .unwrap();
///
/// let retries = registry.resolve(RETRIES, &Unscoped).unwrap();
/// assert_eq!(retries.as_deref(), Some(&5));
/// ```
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<&'static str, SlotEntry>,
    ordered: Vec<&'static str>,
    sealed: bool,
}

#[derive(Debug)]
struct SlotEntry {
    descriptor: SlotDescriptor,
    bound_by: Option<String>,
    binding: Option<ProducerBinding>,
    resolution: Resolution,
}

enum Resolution {
    Pending,
    /// `None` means the slot resolved to absent.
    Resolved(Option<SlotValue>),
    Failed,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Resolved(Some(_)) => f.write_str("Resolved(present)"),
            Self::Resolved(None) => f.write_str("Resolved(absent)"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

impl SlotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the standard slot catalogue.
    ///
    /// Only the `configurer` slot has a default; every other standard slot
    /// falls back to whatever the builder does when the value is absent.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let catalogue = [
            SlotDescriptor::with_default(slots::CONFIGURER, |_| {
                Ok(Arc::new(DefaultConfigurerFactory) as Arc<dyn ConfigurerFactory>)
            }),
            SlotDescriptor::optional(slots::ENTITY_MANAGER_PROVIDER),
            SlotDescriptor::optional(slots::SERIALIZER),
            SlotDescriptor::optional(slots::TRANSACTION_MANAGER),
            SlotDescriptor::optional(slots::COMMAND_BUS),
            SlotDescriptor::optional(slots::HANDLER_CONFIGURATION),
            SlotDescriptor::optional(slots::EVENT_BUS),
            SlotDescriptor::optional(slots::TOKEN_STORE),
            SlotDescriptor::optional(slots::EVENT_STORAGE_ENGINE),
        ];
        for descriptor in catalogue {
            registry.insert(descriptor);
        }
        registry
    }

    /// Add a slot definition, returning an error if the name is taken.
    pub fn define(&mut self, descriptor: SlotDescriptor) -> BindingResult<()> {
        self.ensure_open(descriptor.name())?;
        if self.slots.contains_key(descriptor.name()) {
            return Err(BindingError::AlreadyDefined(descriptor.name().to_string()));
        }
        self.insert(descriptor);
        Ok(())
    }

    fn insert(&mut self, descriptor: SlotDescriptor) {
        let name = descriptor.name();
        self.ordered.push(name);
        self.slots.insert(
            name,
            SlotEntry {
                descriptor,
                bound_by: None,
                binding: None,
                resolution: Resolution::Pending,
            },
        );
    }

    /// Bind a producer to its slot.
    ///
    /// Fails with [`BindingError::Duplicate`] if the slot already has a
    /// producer; the existing binding is left untouched. Fails with
    /// [`BindingError::DiscoveryClosed`] once any slot has been resolved.
    pub fn bind(&mut self, binding: ProducerBinding) -> BindingResult<()> {
        self.ensure_open(binding.slot())?;
        let entry = self
            .slots
            .get_mut(binding.slot())
            .ok_or_else(|| BindingError::UnknownSlot(binding.slot().to_string()))?;

        if entry.descriptor.type_id() != binding.type_id() {
            return Err(BindingError::TypeMismatch {
                slot: binding.slot().to_string(),
                expected: entry.descriptor.value_type(),
                actual: binding.value_type(),
            });
        }
        if let Some(existing) = &entry.bound_by {
            return Err(BindingError::Duplicate {
                slot: binding.slot().to_string(),
                existing: existing.clone(),
                rejected: binding.origin().to_string(),
            });
        }

        debug!(slot = binding.slot(), origin = binding.origin(), "producer bound");
        entry.bound_by = Some(binding.origin().to_string());
        entry.binding = Some(binding);
        Ok(())
    }

    fn ensure_open(&self, subject: &str) -> BindingResult<()> {
        if self.sealed {
            return Err(BindingError::DiscoveryClosed(subject.to_string()));
        }
        Ok(())
    }

    /// Resolve a slot to its producer value, its default, or absent.
    ///
    /// The first call invokes the producer (or default factory) with a fresh
    /// scope; later calls return the cached result. A producer error is
    /// returned as-is and poisons the slot.
    ///
    /// Resolving seals the registry.
    pub fn resolve<T>(
        &mut self,
        key: SlotKey<T>,
        scopes: &dyn ScopeProvider,
    ) -> SlotwireResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.sealed = true;
        let entry = self
            .slots
            .get_mut(key.name())
            .ok_or_else(|| BindingError::UnknownSlot(key.name().to_string()))?;

        let expected = entry.descriptor.value_type();
        let mismatch = move || BindingError::TypeMismatch {
            slot: key.name().to_string(),
            expected,
            actual: std::any::type_name::<T>(),
        };
        if entry.descriptor.type_id() != TypeId::of::<Arc<T>>() {
            return Err(mismatch().into());
        }

        if matches!(entry.resolution, Resolution::Pending) {
            match Self::produce(entry, scopes) {
                Ok(value) => entry.resolution = Resolution::Resolved(value),
                Err(err) => {
                    entry.resolution = Resolution::Failed;
                    return Err(err.into());
                }
            }
        }

        match &entry.resolution {
            Resolution::Resolved(Some(value)) => value
                .downcast_ref::<Arc<T>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| mismatch().into()),
            Resolution::Resolved(None) => Ok(None),
            Resolution::Pending | Resolution::Failed => {
                Err(AssemblyError::ProducerFailed(key.name().to_string()).into())
            }
        }
    }

    fn produce(
        entry: &mut SlotEntry,
        scopes: &dyn ScopeProvider,
    ) -> ProducerResult<Option<SlotValue>> {
        let slot = entry.descriptor.name();
        if let Some(binding) = entry.binding.take() {
            debug!(slot, origin = binding.origin(), "invoking producer");
            let scope = scopes.open_scope();
            return binding.produce(scope.as_ref()).map(Some);
        }
        match entry.descriptor.default_factory() {
            Some(factory) => {
                debug!(slot, "no producer bound, invoking default factory");
                let scope = scopes.open_scope();
                factory(scope.as_ref()).map(Some)
            }
            None => {
                debug!(slot, "no producer bound and no default");
                Ok(None)
            }
        }
    }

    /// Check if a producer was bound to the named slot.
    pub fn is_bound(&self, name: &str) -> bool {
        self.origin(name).is_some()
    }

    /// Where the producer bound to the named slot was discovered.
    pub fn origin(&self, name: &str) -> Option<&str> {
        self.slots.get(name).and_then(|e| e.bound_by.as_deref())
    }

    /// Check if the named slot has already been resolved.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|e| !matches!(e.resolution, Resolution::Pending))
    }

    /// Check if resolution has started and registration is closed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Get a slot definition by name.
    pub fn descriptor(&self, name: &str) -> Option<&SlotDescriptor> {
        self.slots.get(name).map(|e| &e.descriptor)
    }

    /// Check if a slot with the given name is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Get the names of all defined slots, in definition order.
    pub fn names(&self) -> Vec<&'static str> {
        self.ordered.clone()
    }

    /// Get the number of defined slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
