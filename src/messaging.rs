//! Messaging contracts and the built-in in-memory buses.
//!
//! These are the narrow interfaces the assembled configuration exposes.
//! Real deployments usually bind their own bus implementations through
//! producers; the `Simple*` types are the builder's fallbacks.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::component::Component;

/// A command addressed to a single handler by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    name: String,
    payload: String,
}

impl CommandMessage {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// An event broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    name: String,
    payload: String,
}

impl EventMessage {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Errors raised while dispatching commands or events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler subscribed for the command
    #[error("No handler subscribed for command: {0}")]
    NoHandler(String),

    /// The handler rejected the message
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// Events could not be stored before delivery
    #[error("Event storage failed: {0}")]
    Storage(String),
}

/// Result of a command dispatch: an optional reply payload.
pub type CommandResult = Result<Option<String>, DispatchError>;

/// Handles one kind of command.
pub trait CommandHandler: Send + Sync {
    /// Handle one command.
    fn handle(&self, command: &CommandMessage) -> CommandResult;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandMessage) -> CommandResult + Send + Sync,
{
    fn handle(&self, command: &CommandMessage) -> CommandResult {
        self(command)
    }
}

/// Reacts to published events.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    fn handle(&self, event: &EventMessage) -> Result<(), DispatchError>;
}

impl<F> EventHandler for F
where
    F: Fn(&EventMessage) -> Result<(), DispatchError> + Send + Sync,
{
    fn handle(&self, event: &EventMessage) -> Result<(), DispatchError> {
        self(event)
    }
}

/// Receives every event published on a bus.
pub trait EventSubscriber: Send + Sync {
    /// Receive a published event.
    fn on_event(&self, event: &EventMessage);
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Routes commands to their single subscribed handler.
pub trait CommandBus: Component {
    /// Route `command` names to `handler`.
    fn subscribe(&self, command: &str, handler: Arc<dyn CommandHandler>);

    /// Dispatch to the subscribed handler.
    fn dispatch(&self, command: &CommandMessage) -> CommandResult;
}

/// Convenience entry point for sending commands.
pub trait CommandGateway: Component {
    /// Send a command and wait for its result.
    fn send(&self, command: CommandMessage) -> CommandResult;
}

/// Broadcasts events to subscribers.
pub trait EventBus: Component {
    /// Deliver `event` to every subscriber.
    fn publish(&self, event: EventMessage) -> Result<(), DispatchError>;

    /// Add a subscriber.
    fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId;

    /// Returns `false` if the id was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// In-memory command bus dispatching on the calling thread.
#[derive(Default)]
pub struct SimpleCommandBus {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl SimpleCommandBus {
    /// Create a bus with no handlers.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for SimpleCommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut commands: Vec<&str> = handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("SimpleCommandBus")
            .field("commands", &commands)
            .finish()
    }
}

impl Component for SimpleCommandBus {
    fn name(&self) -> &str {
        "SimpleCommandBus"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CommandBus for SimpleCommandBus {
    fn subscribe(&self, command: &str, handler: Arc<dyn CommandHandler>) {
        if self
            .handlers
            .write()
            .insert(command.to_string(), handler)
            .is_some()
        {
            debug!(command, "replaced command handler subscription");
        }
    }

    fn dispatch(&self, command: &CommandMessage) -> CommandResult {
        let handler = self
            .handlers
            .read()
            .get(command.name())
            .cloned()
            .ok_or_else(|| DispatchError::NoHandler(command.name().to_string()))?;
        handler.handle(command)
    }
}

/// Gateway that forwards to a command bus.
#[derive(Debug)]
pub struct DefaultCommandGateway {
    bus: Arc<dyn CommandBus>,
}

impl DefaultCommandGateway {
    /// Create a gateway dispatching through `bus`.
    pub fn new(bus: Arc<dyn CommandBus>) -> Self {
        Self { bus }
    }
}

impl Component for DefaultCommandGateway {
    fn name(&self) -> &str {
        "DefaultCommandGateway"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CommandGateway for DefaultCommandGateway {
    fn send(&self, command: CommandMessage) -> CommandResult {
        self.bus.dispatch(&command)
    }
}

/// In-memory event bus delivering synchronously to every subscriber.
#[derive(Default)]
pub struct SimpleEventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>>,
    next_id: AtomicU64,
}

impl SimpleEventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver without going through `publish`; used by stores that wrap this bus.
    pub(crate) fn deliver(&self, event: &EventMessage) {
        // Snapshot so subscribers may (un)subscribe while handling.
        let subscribers: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }
}

impl fmt::Debug for SimpleEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Component for SimpleEventBus {
    fn name(&self) -> &str {
        "SimpleEventBus"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl EventBus for SimpleEventBus {
    fn publish(&self, event: EventMessage) -> Result<(), DispatchError> {
        self.deliver(&event);
        Ok(())
    }

    fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &EventMessage) {
            self.seen.lock().push(event.name().to_string());
        }
    }

    #[test]
    fn test_command_bus_dispatch() {
        let bus = SimpleCommandBus::new();
        bus.subscribe(
            "PlaceOrder",
            Arc::new(|cmd: &CommandMessage| -> CommandResult {
                Ok(Some(format!("placed {}", cmd.payload())))
            }),
        );

        let reply = bus.dispatch(&CommandMessage::new("PlaceOrder", "o-1")).unwrap();
        assert_eq!(reply.as_deref(), Some("placed o-1"));
    }

    #[test]
    fn test_command_bus_no_handler() {
        let bus = SimpleCommandBus::new();
        let err = bus.dispatch(&CommandMessage::new("Cancel", "")).unwrap_err();
        assert_eq!(err, DispatchError::NoHandler("Cancel".to_string()));
    }

    #[test]
    fn test_gateway_forwards_to_bus() {
        let bus = Arc::new(SimpleCommandBus::new());
        bus.subscribe(
            "Ping",
            Arc::new(|_: &CommandMessage| -> CommandResult { Ok(Some("pong".to_string())) }),
        );
        let gateway = DefaultCommandGateway::new(bus);

        let reply = gateway.send(CommandMessage::new("Ping", "")).unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));
    }

    #[test]
    fn test_event_bus_subscribe_and_unsubscribe() {
        let bus = SimpleEventBus::new();
        let recorder = Arc::new(Recorder::default());
        let id = bus.subscribe(recorder.clone());

        bus.publish(EventMessage::new("OrderPlaced", "o-1")).unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(EventMessage::new("OrderShipped", "o-1")).unwrap();

        assert_eq!(*recorder.seen.lock(), vec!["OrderPlaced"]);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
