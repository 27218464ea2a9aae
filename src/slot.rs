//! Typed extension-point slots and the producers bound to them.
//!
//! A slot is identified by name and carries the type of value it accepts.
//! Values are stored type-erased as `Arc<T>` and recovered through the
//! typed [`SlotKey`] used to define them.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::configurer::ConfigurerFactory;
use crate::error::ProducerResult;
use crate::handling::HandlerConfiguration;
use crate::infrastructure::{
    EntityManagerProvider, EventStorageEngine, Serializer, TokenStore, TransactionManager,
};
use crate::messaging::{CommandBus, EventBus};
use crate::scope::Scope;

/// Type-erased slot value; always an `Arc<T>` for the slot's `T`.
pub(crate) type SlotValue = Box<dyn Any + Send + Sync>;

/// Fallback used when no producer is bound to a slot.
pub type DefaultFactory = Arc<dyn Fn(&dyn Scope) -> ProducerResult<SlotValue> + Send + Sync>;

type Produce = Box<dyn FnOnce(&dyn Scope) -> ProducerResult<SlotValue> + Send>;

/// Typed handle naming a slot.
pub struct SlotKey<T: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> SlotKey<T> {
    /// Create a key for the slot called `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The slot's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> Clone for SlotKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for SlotKey<T> {}

impl<T: ?Sized> fmt::Debug for SlotKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SlotKey").field(&self.name).finish()
    }
}

/// The standard slot catalogue.
pub mod slots {
    use super::*;

    pub const CONFIGURER: SlotKey<dyn ConfigurerFactory> = SlotKey::new("configurer");
    pub const ENTITY_MANAGER_PROVIDER: SlotKey<dyn EntityManagerProvider> =
        SlotKey::new("entity-manager-provider");
    pub const SERIALIZER: SlotKey<dyn Serializer> = SlotKey::new("serializer");
    pub const TRANSACTION_MANAGER: SlotKey<dyn TransactionManager> =
        SlotKey::new("transaction-manager");
    pub const COMMAND_BUS: SlotKey<dyn CommandBus> = SlotKey::new("command-bus");
    pub const HANDLER_CONFIGURATION: SlotKey<HandlerConfiguration> =
        SlotKey::new("handler-configuration");
    pub const EVENT_BUS: SlotKey<dyn EventBus> = SlotKey::new("event-bus");
    pub const TOKEN_STORE: SlotKey<dyn TokenStore> = SlotKey::new("token-store");
    pub const EVENT_STORAGE_ENGINE: SlotKey<dyn EventStorageEngine> =
        SlotKey::new("event-storage-engine");
}

/// Definition of one slot: its name, value type and optional fallback.
#[derive(Clone)]
pub struct SlotDescriptor {
    name: &'static str,
    value_type: &'static str,
    type_id: TypeId,
    default_factory: Option<DefaultFactory>,
}

impl SlotDescriptor {
    /// A slot without a fallback; absent unless a producer is bound.
    pub fn optional<T>(key: SlotKey<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            name: key.name(),
            value_type: type_name::<T>(),
            type_id: TypeId::of::<Arc<T>>(),
            default_factory: None,
        }
    }

    /// A slot that falls back to `factory` when no producer is bound.
    pub fn with_default<T, F>(key: SlotKey<T>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Scope) -> ProducerResult<Arc<T>> + Send + Sync + 'static,
    {
        let factory: DefaultFactory =
            Arc::new(move |scope: &dyn Scope| Ok(Box::new(factory(scope)?) as SlotValue));
        Self {
            default_factory: Some(factory),
            ..Self::optional(key)
        }
    }

    /// The slot's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the slot's value type.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    /// Check if the slot has a default factory.
    pub fn has_default(&self) -> bool {
        self.default_factory.is_some()
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn default_factory(&self) -> Option<&DefaultFactory> {
        self.default_factory.as_ref()
    }
}

impl fmt::Debug for SlotDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("has_default", &self.has_default())
            .finish()
    }
}

/// A captured, not-yet-invoked producer for one slot.
///
/// The producer is `FnOnce`: resolving the slot consumes the binding.
pub struct ProducerBinding {
    slot: &'static str,
    origin: String,
    value_type: &'static str,
    type_id: TypeId,
    produce: Produce,
}

impl ProducerBinding {
    /// Capture `producer` for `key`. `origin` names where it was discovered.
    pub fn new<T, F>(key: SlotKey<T>, origin: impl Into<String>, producer: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce(&dyn Scope) -> ProducerResult<Arc<T>> + Send + 'static,
    {
        Self {
            slot: key.name(),
            origin: origin.into(),
            value_type: type_name::<T>(),
            type_id: TypeId::of::<Arc<T>>(),
            produce: Box::new(move |scope: &dyn Scope| {
                Ok(Box::new(producer(scope)?) as SlotValue)
            }),
        }
    }

    /// Bind an already-built value.
    pub fn value<T>(key: SlotKey<T>, origin: impl Into<String>, value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::new(key, origin, move |_| Ok(value))
    }

    /// The slot this binding produces for.
    pub fn slot(&self) -> &'static str {
        self.slot
    }

    /// Where the producer was discovered.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Name of the produced value type.
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn produce(self, scope: &dyn Scope) -> ProducerResult<SlotValue> {
        (self.produce)(scope)
    }
}

impl fmt::Debug for ProducerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerBinding")
            .field("slot", &self.slot)
            .field("origin", &self.origin)
            .field("value_type", &self.value_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::infrastructure::Utf8Serializer;
    use crate::scope::EmptyScope;

    #[test]
    fn test_key_is_copy_and_named() {
        let key = slots::SERIALIZER;
        let copy = key;
        assert_eq!(key.name(), "serializer");
        assert_eq!(copy.name(), "serializer");
    }

    #[test]
    fn test_descriptor_records_value_type() {
        let optional = SlotDescriptor::optional(slots::SERIALIZER);
        assert!(!optional.has_default());
        assert!(optional.value_type().contains("Serializer"));

        let defaulted = SlotDescriptor::with_default(slots::SERIALIZER, |_| {
            Ok(Arc::new(Utf8Serializer) as Arc<dyn Serializer>)
        });
        assert!(defaulted.has_default());
        assert_eq!(defaulted.type_id(), optional.type_id());
    }

    #[test]
    fn test_binding_produces_typed_value() {
        let binding = ProducerBinding::value(
            slots::SERIALIZER,
            "tests::serializer",
            Arc::new(Utf8Serializer) as Arc<dyn Serializer>,
        );
        assert_eq!(binding.slot(), "serializer");
        assert_eq!(binding.origin(), "tests::serializer");

        let value = binding.produce(&EmptyScope).unwrap();
        let serializer = value.downcast_ref::<Arc<dyn Serializer>>().unwrap();
        assert_eq!(serializer.name(), "Utf8Serializer");
    }
}
