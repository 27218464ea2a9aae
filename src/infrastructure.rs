//! Infrastructure contracts: serialization, transactions, persistence.
//!
//! Only the surface the assembly pipeline touches is modeled here. The
//! in-memory implementations back the builder's defaults and tests.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::component::Component;
use crate::error::{ProducerError, ProducerResult};
use crate::messaging::{
    DispatchError, EventBus, EventMessage, EventSubscriber, SimpleEventBus, SubscriptionId,
};

/// Converts payloads to and from bytes.
pub trait Serializer: Component {
    /// Encode a payload.
    fn serialize(&self, value: &str) -> Vec<u8>;

    /// Decode a payload.
    fn deserialize(&self, bytes: &[u8]) -> ProducerResult<String>;
}

/// Runs units of work inside a transaction.
pub trait TransactionManager: Component {
    fn execute(
        &self,
        work: &mut dyn FnMut() -> Result<(), DispatchError>,
    ) -> Result<(), DispatchError>;
}

/// Hands out persistence contexts to storage components.
pub trait EntityManagerProvider: Component {}

/// Remembers how far each event processor has read.
pub trait TokenStore: Component {
    /// Record the last processed position.
    fn store_token(&self, processor: &str, token: u64);

    /// The last processed position, if any.
    fn fetch_token(&self, processor: &str) -> Option<u64>;
}

/// Durable append-only storage for events.
pub trait EventStorageEngine: Component {
    /// Persist events in order.
    fn append_events(&self, events: &[EventMessage]) -> Result<(), DispatchError>;

    /// All persisted events in order.
    fn read_events(&self) -> Vec<EventMessage>;

    /// Whether appends must run inside a transaction manager.
    fn requires_transaction_manager(&self) -> bool {
        false
    }
}

/// Serializer writing payloads as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Serializer;

impl Component for Utf8Serializer {
    fn name(&self) -> &str {
        "Utf8Serializer"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Serializer for Utf8Serializer {
    fn serialize(&self, value: &str) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn deserialize(&self, bytes: &[u8]) -> ProducerResult<String> {
        String::from_utf8(bytes.to_vec()).map_err(ProducerError::new)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, u64>>,
}

impl InMemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for InMemoryTokenStore {
    fn name(&self) -> &str {
        "InMemoryTokenStore"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TokenStore for InMemoryTokenStore {
    fn store_token(&self, processor: &str, token: u64) {
        self.tokens.write().insert(processor.to_string(), token);
    }

    fn fetch_token(&self, processor: &str) -> Option<u64> {
        self.tokens.read().get(processor).copied()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStorageEngine {
    events: RwLock<Vec<EventMessage>>,
}

impl InMemoryEventStorageEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for InMemoryEventStorageEngine {
    fn name(&self) -> &str {
        "InMemoryEventStorageEngine"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EventStorageEngine for InMemoryEventStorageEngine {
    fn append_events(&self, events: &[EventMessage]) -> Result<(), DispatchError> {
        self.events.write().extend_from_slice(events);
        Ok(())
    }

    fn read_events(&self) -> Vec<EventMessage> {
        self.events.read().clone()
    }
}

/// Event bus that stores every event before delivering it.
///
/// Appends run inside the transaction manager when one is configured.
/// Nothing is delivered if the append fails.
pub struct EmbeddedEventStore {
    engine: Arc<dyn EventStorageEngine>,
    transactions: Option<Arc<dyn TransactionManager>>,
    bus: SimpleEventBus,
}

impl EmbeddedEventStore {
    /// Create a store over `engine`.
    pub fn new(
        engine: Arc<dyn EventStorageEngine>,
        transactions: Option<Arc<dyn TransactionManager>>,
    ) -> Self {
        Self {
            engine,
            transactions,
            bus: SimpleEventBus::new(),
        }
    }

    /// The engine events are appended to.
    pub fn storage_engine(&self) -> &Arc<dyn EventStorageEngine> {
        &self.engine
    }
}

impl fmt::Debug for EmbeddedEventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedEventStore")
            .field("engine", &self.engine.name())
            .field(
                "transactions",
                &self.transactions.as_ref().map(|tx| tx.name().to_string()),
            )
            .field("subscribers", &self.bus.subscriber_count())
            .finish()
    }
}

impl Component for EmbeddedEventStore {
    fn name(&self) -> &str {
        "EmbeddedEventStore"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EventBus for EmbeddedEventStore {
    fn publish(&self, event: EventMessage) -> Result<(), DispatchError> {
        let batch = std::slice::from_ref(&event);
        match &self.transactions {
            Some(tx) => tx.execute(&mut || self.engine.append_events(batch))?,
            None => self.engine.append_events(batch)?,
        }
        self.bus.deliver(&event);
        Ok(())
    }

    fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingTransactions {
        runs: AtomicU32,
    }

    impl Component for CountingTransactions {
        fn name(&self) -> &str {
            "CountingTransactions"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl TransactionManager for CountingTransactions {
        fn execute(
            &self,
            work: &mut dyn FnMut() -> Result<(), DispatchError>,
        ) -> Result<(), DispatchError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            work()
        }
    }

    #[derive(Debug)]
    struct FailingEngine;

    impl Component for FailingEngine {
        fn name(&self) -> &str {
            "FailingEngine"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl EventStorageEngine for FailingEngine {
        fn append_events(&self, _events: &[EventMessage]) -> Result<(), DispatchError> {
            Err(DispatchError::Storage("disk full".to_string()))
        }

        fn read_events(&self) -> Vec<EventMessage> {
            Vec::new()
        }
    }

    #[test]
    fn test_utf8_serializer() {
        let serializer = Utf8Serializer;
        let bytes = serializer.serialize("order-1");
        assert_eq!(serializer.deserialize(&bytes).unwrap(), "order-1");
        assert!(serializer.deserialize(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_token_store() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.fetch_token("orders"), None);
        store.store_token("orders", 4);
        assert_eq!(store.fetch_token("orders"), Some(4));
    }

    #[test]
    fn test_embedded_store_appends_inside_transaction() {
        let engine = Arc::new(InMemoryEventStorageEngine::new());
        let tx = Arc::new(CountingTransactions::default());
        let store = EmbeddedEventStore::new(engine.clone(), Some(tx.clone()));

        store.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap();
        store.publish(EventMessage::new("OrderShipped", "o-1")).unwrap();

        assert_eq!(engine.read_events().len(), 2);
        assert_eq!(tx.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_embedded_store_does_not_deliver_unstored_events() {
        struct Flag(AtomicU32);
        impl EventSubscriber for Flag {
            fn on_event(&self, _event: &EventMessage) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let store = EmbeddedEventStore::new(Arc::new(FailingEngine), None);
        let flag = Arc::new(Flag(AtomicU32::new(0)));
        store.subscribe(flag.clone());

        let err = store.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap_err();
        assert_eq!(err, DispatchError::Storage("disk full".to_string()));
        assert_eq!(flag.0.load(Ordering::SeqCst), 0);
    }
}
