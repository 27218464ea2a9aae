//! Integration tests for Slotwire
//!
//! These tests drive whole sessions the way a host application would:
//! discover, assemble, publish, dispatch and shut down.

use parking_lot::Mutex;
use slotwire::prelude::*;
use slotwire::stream::from_events;
use slotwire::{
    AggregateCatalog, DefaultConfigurerFactory, EmbeddedEventStore, InMemoryEventStorageEngine,
    PublicationBridge, Unscoped, Utf8Serializer,
};
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

// =============================================================================
// Test Components
// =============================================================================

/// A serializer supplied by the application instead of the built-in one
#[derive(Debug)]
struct JsonSerializer;

impl Component for JsonSerializer {
    fn name(&self) -> &str {
        "JsonSerializer"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &str) -> Vec<u8> {
        format!("\"{value}\"").into_bytes()
    }

    fn deserialize(&self, bytes: &[u8]) -> ProducerResult<String> {
        let text = std::str::from_utf8(bytes).map_err(ProducerError::new)?;
        Ok(text.trim_matches('"').to_string())
    }
}

/// A bean exposing an event handler that records what it sees
struct OrderProjection {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Bean for OrderProjection {
    fn bean_name(&self) -> &str {
        "OrderProjection"
    }

    fn event_handler_factory(&self) -> Option<HandlerFactory> {
        let seen = self.seen.clone();
        Some(Arc::new(
            move |_: &dyn Scope| -> ProducerResult<Arc<dyn EventHandler>> {
                let seen = seen.clone();
                let handler = move |event: &EventMessage| -> Result<(), DispatchError> {
                    seen.lock().push(event.name().to_string());
                    Ok(())
                };
                Ok(Arc::new(handler))
            },
        ))
    }
}

/// A bean with no handler capability
struct Clock;

impl Bean for Clock {
    fn bean_name(&self) -> &str {
        "Clock"
    }
}

#[derive(Debug)]
struct RequestScope {
    id: u32,
}

impl Scope for RequestScope {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opens a numbered scope per invocation
#[derive(Debug, Default)]
struct NumberedScopes {
    opened: AtomicU32,
}

impl ScopeProvider for NumberedScopes {
    fn open_scope(&self) -> Box<dyn Scope> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(RequestScope { id })
    }
}

fn noop_handler(name: &str) -> HandlerDescriptor {
    HandlerDescriptor::new(
        name,
        |_: &dyn Scope| -> ProducerResult<Arc<dyn EventHandler>> {
            let handler = |_: &EventMessage| -> Result<(), DispatchError> { Ok(()) };
            Ok(Arc::new(handler))
        },
    )
}

fn session() -> AssemblySession {
    AssemblySession::new(AssemblyConfig::new().with_name("orders-service")).unwrap()
}

// =============================================================================
// Assembly Scenarios
// =============================================================================

#[test]
fn test_defaults_with_one_aggregate() {
    let mut session = session();
    session
        .add_aggregate(AggregateDescriptor::named("OrderAggregate"))
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    let lifecycle = session.assemble(&mut host).unwrap();

    let bus = host.lookup::<dyn CommandBus>().unwrap().unwrap();
    assert!(bus.is::<SimpleCommandBus>());
    assert!(host.lookup::<dyn Serializer>().unwrap().is_some());
    assert!(host.lookup::<dyn CommandGateway>().unwrap().is_some());
    assert!(host.lookup::<dyn EventBus>().unwrap().is_some());

    let configuration = host.lookup::<dyn Configuration>().unwrap().unwrap();
    assert_eq!(configuration.aggregates().len(), 1);
    assert_eq!(configuration.aggregates()[0].name(), "OrderAggregate");

    assert_eq!(lifecycle.state(), LifecycleState::Started);
    assert_eq!(session.phase(), SessionPhase::Assembled);
}

#[test]
fn test_serializer_producer_not_published_twice() {
    let mut session = session();
    session
        .bind(ProducerBinding::value(
            slots::SERIALIZER,
            "orders::serializer",
            Arc::new(JsonSerializer) as Arc<dyn Serializer>,
        ))
        .unwrap();

    // The host already exposes the application's serializer.
    let mut host = InMemoryHostRegistry::new();
    host.publish(Publication::value(
        Arc::new(JsonSerializer) as Arc<dyn Serializer>
    ))
    .unwrap();

    let lifecycle = session.assemble(&mut host).unwrap();
    assert!(session
        .report()
        .unwrap()
        .is_externally_supplied("serializer"));
    assert_eq!(host.len(), 5);

    let configuration = lifecycle.configuration().unwrap();
    assert!(configuration.serializer().is::<JsonSerializer>());
}

#[test]
fn test_handler_producer_replaces_discovered_handlers() {
    let mut session = session();
    session.add_handler(noop_handler("H1")).unwrap();
    let produced = HandlerConfiguration::builder("custom")
        .register(noop_handler("H2"))
        .register(noop_handler("H3"))
        .build();
    session
        .bind(ProducerBinding::value(
            slots::HANDLER_CONFIGURATION,
            "orders::handlers",
            Arc::new(produced),
        ))
        .unwrap();

    let lifecycle = session.assemble(&mut InMemoryHostRegistry::new()).unwrap();
    let configuration = lifecycle.configuration().unwrap();
    let registered = configuration.handler_configurations();

    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].handler_names(), vec!["H2", "H3"]);
    assert_eq!(session.report().unwrap().discarded_handlers, 1);
}

#[test]
fn test_strict_override_fails_deployment() {
    let mut session =
        AssemblySession::new(AssemblyConfig::new().strict_handler_override()).unwrap();
    session.add_handler(noop_handler("H1")).unwrap();
    session
        .bind(ProducerBinding::value(
            slots::HANDLER_CONFIGURATION,
            "orders::handlers",
            Arc::new(HandlerConfiguration::builder("custom").build()),
        ))
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    let err = session.assemble(&mut host).unwrap_err();
    assert!(matches!(
        err,
        SlotwireError::Assembly(AssemblyError::DiscardedHandlers(1))
    ));
    assert!(host.is_empty());
}

#[test]
fn test_storage_engine_backs_event_bus() {
    let engine = Arc::new(InMemoryEventStorageEngine::new());
    let mut session = session();
    session
        .bind(ProducerBinding::value(
            slots::EVENT_STORAGE_ENGINE,
            "orders::storage",
            engine.clone() as Arc<dyn EventStorageEngine>,
        ))
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    session.assemble(&mut host).unwrap();

    let bus = host.lookup::<dyn EventBus>().unwrap().unwrap();
    assert!(bus.is::<EmbeddedEventStore>());
    bus.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap();
    assert_eq!(engine.read_events().len(), 1);
}

#[test]
fn test_conflicting_storage_aborts_startup() {
    let mut session = session();
    session
        .bind(ProducerBinding::value(
            slots::EVENT_BUS,
            "orders::bus",
            Arc::new(SimpleEventBus::new()) as Arc<dyn EventBus>,
        ))
        .unwrap();
    session
        .bind(ProducerBinding::value(
            slots::EVENT_STORAGE_ENGINE,
            "orders::storage",
            Arc::new(InMemoryEventStorageEngine::new()) as Arc<dyn EventStorageEngine>,
        ))
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    let err = session.assemble(&mut host).unwrap_err();
    assert!(matches!(
        err,
        SlotwireError::Assembly(AssemblyError::ConflictingStorage(_))
    ));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert_eq!(session.lifecycle().state(), LifecycleState::NotStarted);
    assert!(host.is_empty());
}

// =============================================================================
// Binding and Catalog Tests
// =============================================================================

#[test]
fn test_duplicate_binding_keeps_first() {
    let mut session = session();
    session
        .bind(ProducerBinding::value(
            slots::SERIALIZER,
            "orders::json",
            Arc::new(JsonSerializer) as Arc<dyn Serializer>,
        ))
        .unwrap();

    let err = session
        .bind(ProducerBinding::value(
            slots::SERIALIZER,
            "orders::utf8",
            Arc::new(Utf8Serializer) as Arc<dyn Serializer>,
        ))
        .unwrap_err();
    assert!(matches!(err, BindingError::Duplicate { .. }));
    assert_eq!(session.slots().origin("serializer"), Some("orders::json"));

    let lifecycle = session.assemble(&mut InMemoryHostRegistry::new()).unwrap();
    let serializer = lifecycle.configuration().unwrap().serializer();
    assert!(serializer.is::<JsonSerializer>());
}

#[test]
fn test_producer_invoked_once_with_fresh_scope() {
    let calls = Arc::new(AtomicU32::new(0));
    let scope_ids = Arc::new(Mutex::new(Vec::new()));
    let mut session = session().with_scopes(Arc::new(NumberedScopes::default()));

    let (counter, ids) = (calls.clone(), scope_ids.clone());
    session
        .bind(ProducerBinding::new(
            slots::SERIALIZER,
            "orders::serializer",
            move |scope: &dyn Scope| {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(request) = scope.downcast_ref::<RequestScope>() {
                    ids.lock().push(request.id);
                }
                Ok(Arc::new(JsonSerializer) as Arc<dyn Serializer>)
            },
        ))
        .unwrap();

    session.assemble(&mut InMemoryHostRegistry::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The configurer default is resolved first and gets scope 1.
    assert_eq!(*scope_ids.lock(), vec![2]);
}

#[test]
fn test_producer_error_propagates_verbatim() {
    let mut session = session();
    session
        .bind(ProducerBinding::new(
            slots::ENTITY_MANAGER_PROVIDER,
            "orders::persistence",
            |_: &dyn Scope| -> ProducerResult<Arc<dyn EntityManagerProvider>> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "database unreachable",
                )
                .into())
            },
        ))
        .unwrap();

    let err = session.assemble(&mut InMemoryHostRegistry::new()).unwrap_err();
    assert_eq!(err.to_string(), "database unreachable");
    match err {
        SlotwireError::Producer(cause) => {
            let io = cause.downcast_ref::<std::io::Error>().unwrap();
            assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.phase(), SessionPhase::Failed);
}

#[test]
fn test_catalog_drains_once() {
    let mut catalog = AggregateCatalog::new();
    catalog
        .add(AggregateDescriptor::named("OrderAggregate"))
        .unwrap();
    catalog.add(AggregateDescriptor::named("Invoice")).unwrap();

    assert_eq!(catalog.drain().len(), 2);
    assert!(catalog.drain().is_empty());
}

#[test]
fn test_registration_closed_after_assembly() {
    let mut session = session();
    session.assemble(&mut InMemoryHostRegistry::new()).unwrap();

    assert!(matches!(
        session.add_aggregate(AggregateDescriptor::named("Late")),
        Err(BindingError::DiscoveryClosed(_))
    ));
    assert!(matches!(
        session.assemble(&mut InMemoryHostRegistry::new()),
        Err(SlotwireError::Assembly(AssemblyError::AlreadyAssembled))
    ));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_start_twice_is_illegal() {
    let mut session = session();
    let lifecycle = session.assemble(&mut InMemoryHostRegistry::new()).unwrap();

    let another = DefaultConfigurerFactory
        .create(Arc::new(Unscoped))
        .build()
        .unwrap();
    let err = lifecycle.start(another).unwrap_err();
    assert_eq!(
        err,
        LifecycleError::IllegalState {
            operation: "start",
            state: LifecycleState::Started,
        }
    );
}

#[test]
fn test_shutdown_before_start_is_noop() {
    let lifecycle = LifecycleController::new();
    assert!(!lifecycle.shutdown());
    assert_eq!(lifecycle.state(), LifecycleState::NotStarted);
}

#[test]
fn test_double_shutdown_single_teardown() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut session = session();
    session
        .inspect_bean(&OrderProjection { seen: seen.clone() })
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    let lifecycle = session.assemble(&mut host).unwrap();
    let configuration = lifecycle.configuration().unwrap();
    assert!(configuration.handler_configurations()[0].is_subscribed());

    assert!(session.shutdown());
    assert!(!session.shutdown());
    assert!(!configuration.handler_configurations()[0].is_subscribed());
    assert_eq!(lifecycle.state(), LifecycleState::Shutdown);
    assert_eq!(configuration.state(), LifecycleState::Shutdown);

    assert!(matches!(
        host.lookup::<dyn EventBus>(),
        Err(PublicationError::Unavailable(_))
    ));
}

#[test]
fn test_retained_configuration_cannot_restart() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut session = session();
    session
        .inspect_bean(&OrderProjection { seen: seen.clone() })
        .unwrap();

    let mut host = InMemoryHostRegistry::new();
    let lifecycle = session.assemble(&mut host).unwrap();
    let retained = lifecycle.configuration().unwrap();
    let published = host.lookup::<dyn Configuration>().unwrap().unwrap();
    let bus = retained.event_bus();
    assert!(lifecycle.shutdown());

    for configuration in [&retained, &published] {
        assert_eq!(
            configuration.start(),
            Err(LifecycleError::IllegalState {
                operation: "start",
                state: LifecycleState::Shutdown,
            })
        );
        assert!(matches!(
            configuration.shutdown(),
            Err(LifecycleError::IllegalState { .. })
        ));
    }

    assert!(!retained.handler_configurations()[0].is_subscribed());
    bus.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap();
    assert!(seen.lock().is_empty());
}

#[test]
fn test_publish_requires_started_lifecycle() {
    let lifecycle = Arc::new(LifecycleController::new());
    let mut host = InMemoryHostRegistry::new();
    let err =
        PublicationBridge::publish(&mut host, &lifecycle, &Default::default()).unwrap_err();
    assert!(matches!(err, SlotwireError::Lifecycle(_)));
}

// =============================================================================
// Async Discovery and Termination Tests
// =============================================================================

#[tokio::test]
async fn test_discover_then_dispatch_then_terminate() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut session = session();
    let (sender, feed) = session.feed();

    let scanner = {
        let seen = seen.clone();
        tokio::spawn(async move {
            sender
                .aggregate(AggregateDescriptor::named("OrderAggregate"))
                .await
                .unwrap();
            sender.bean(Arc::new(OrderProjection { seen })).await.unwrap();
            sender.bean(Arc::new(Clock)).await.unwrap();
        })
    };

    assert_eq!(session.discover(feed).await.unwrap(), 3);
    scanner.await.unwrap();

    let mut host = InMemoryHostRegistry::new();
    let lifecycle = session.assemble(&mut host).unwrap();
    assert_eq!(session.report().unwrap().handlers, 1);

    let bus = host.lookup::<dyn EventBus>().unwrap().unwrap();
    bus.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap();
    bus.publish(EventMessage::new("OrderShipped", "o-1")).unwrap();
    assert_eq!(*seen.lock(), vec!["OrderPlaced", "OrderShipped"]);

    let (terminate, terminated) = oneshot::channel();
    let waiter = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.shutdown_on(terminated).await })
    };
    terminate.send(()).unwrap();

    assert!(waiter.await.unwrap());
    assert_eq!(lifecycle.state(), LifecycleState::Shutdown);
}

#[tokio::test]
async fn test_watch_signal_shuts_down() {
    let mut session = session();
    let lifecycle = session.assemble(&mut InMemoryHostRegistry::new()).unwrap();

    let (tx, rx) = watch::channel(false);
    let waiter = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.shutdown_on(rx).await })
    };
    tx.send(true).unwrap();

    assert!(waiter.await.unwrap());
    assert!(!lifecycle.shutdown());
}

#[tokio::test]
async fn test_feed_rejects_duplicate_producer() {
    let mut session = session();
    let feed = futures::stream::iter(vec![
        DiscoveryEvent::Producer(ProducerBinding::value(
            slots::COMMAND_BUS,
            "first",
            Arc::new(SimpleCommandBus::new()) as Arc<dyn CommandBus>,
        )),
        DiscoveryEvent::Producer(ProducerBinding::value(
            slots::COMMAND_BUS,
            "second",
            Arc::new(SimpleCommandBus::new()) as Arc<dyn CommandBus>,
        )),
    ]);

    let err = session.discover(feed).await.unwrap_err();
    assert_eq!(
        err,
        BindingError::Duplicate {
            slot: "command-bus".to_string(),
            existing: "first".to_string(),
            rejected: "second".to_string(),
        }
    );
}

#[tokio::test]
async fn test_finished_feed_then_assemble() {
    let mut session = session();
    let feed = from_events(vec![
        DiscoveryEvent::Aggregate(AggregateDescriptor::named("OrderAggregate")),
        DiscoveryEvent::Handler(noop_handler("AuditTrail")),
    ]);
    assert_eq!(session.discover(feed).await.unwrap(), 2);

    let lifecycle = session.assemble(&mut InMemoryHostRegistry::new()).unwrap();
    let configuration = lifecycle.configuration().unwrap();
    assert_eq!(configuration.aggregates().len(), 1);
    assert_eq!(
        configuration.handler_configurations()[0].handler_names(),
        vec!["AuditTrail"]
    );
}

#[test]
fn test_command_round_trip_through_gateway() {
    let mut session = session();
    let mut host = InMemoryHostRegistry::new();
    session.assemble(&mut host).unwrap();

    let bus = host.lookup::<dyn CommandBus>().unwrap().unwrap();
    let handler = |command: &CommandMessage| -> slotwire::CommandResult {
        Ok(Some(format!("accepted {}", command.payload())))
    };
    bus.subscribe("PlaceOrder", Arc::new(handler));

    let gateway = host.lookup::<dyn CommandGateway>().unwrap().unwrap();
    let reply = gateway
        .send(CommandMessage::new("PlaceOrder", "o-1"))
        .unwrap();
    assert_eq!(reply.as_deref(), Some("accepted o-1"));
}
