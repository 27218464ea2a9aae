//! Event handling configuration.
//!
//! A `HandlerConfiguration` groups handler registrations under one
//! processor name. When started it subscribes to the event bus and, for
//! every delivered event, instantiates each handler in a fresh scope.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::catalog::HandlerDescriptor;
use crate::infrastructure::TokenStore;
use crate::messaging::{EventBus, EventMessage, EventSubscriber, SubscriptionId};
use crate::scope::ScopeProvider;

/// Default processor name for configurations built from discovered handlers.
pub const DEFAULT_PROCESSOR: &str = "default";

/// A set of handler registrations and its event-bus subscription.
pub struct HandlerConfiguration {
    processor: String,
    handlers: Vec<HandlerDescriptor>,
    subscription: Mutex<Option<Subscription>>,
}

struct Subscription {
    bus: Arc<dyn EventBus>,
    id: SubscriptionId,
}

impl HandlerConfiguration {
    /// Start building a configuration for `processor`.
    pub fn builder(processor: impl Into<String>) -> HandlerConfigurationBuilder {
        HandlerConfigurationBuilder {
            processor: processor.into(),
            handlers: Vec::new(),
        }
    }

    /// The event processor the handlers run under.
    pub fn processor(&self) -> &str {
        &self.processor
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.handlers
    }

    /// Handler names in registration order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check if the handlers are subscribed to a bus.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Subscribe the handlers to `bus`. A second start is ignored.
    pub fn start(
        &self,
        bus: Arc<dyn EventBus>,
        scopes: Arc<dyn ScopeProvider>,
        tokens: Option<Arc<dyn TokenStore>>,
    ) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let position = tokens
            .as_ref()
            .and_then(|t| t.fetch_token(&self.processor))
            .unwrap_or(0);
        let invoker = Arc::new(HandlerInvoker {
            processor: self.processor.clone(),
            handlers: self.handlers.clone(),
            scopes,
            tokens,
            position: AtomicU64::new(position),
        });
        let id = bus.subscribe(invoker);
        debug!(
            processor = %self.processor,
            handlers = self.handlers.len(),
            "handler configuration subscribed"
        );
        *subscription = Some(Subscription { bus, id });
    }

    /// Unsubscribe from the event bus, if subscribed.
    pub fn shutdown(&self) {
        if let Some(Subscription { bus, id }) = self.subscription.lock().take() {
            bus.unsubscribe(id);
            debug!(processor = %self.processor, "handler configuration unsubscribed");
        }
    }
}

impl fmt::Debug for HandlerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfiguration")
            .field("processor", &self.processor)
            .field("handlers", &self.handler_names())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Collects handler registrations before they become a configuration.
#[derive(Debug)]
pub struct HandlerConfigurationBuilder {
    processor: String,
    handlers: Vec<HandlerDescriptor>,
}

impl HandlerConfigurationBuilder {
    /// Append a handler.
    pub fn register(mut self, handler: HandlerDescriptor) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Append handlers in order.
    pub fn register_all(mut self, handlers: impl IntoIterator<Item = HandlerDescriptor>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> HandlerConfiguration {
        HandlerConfiguration {
            processor: self.processor,
            handlers: self.handlers,
            subscription: Mutex::new(None),
        }
    }
}

struct HandlerInvoker {
    processor: String,
    handlers: Vec<HandlerDescriptor>,
    scopes: Arc<dyn ScopeProvider>,
    tokens: Option<Arc<dyn TokenStore>>,
    position: AtomicU64,
}

impl EventSubscriber for HandlerInvoker {
    fn on_event(&self, event: &EventMessage) {
        for descriptor in &self.handlers {
            let scope = self.scopes.open_scope();
            let outcome = descriptor
                .instantiate(scope.as_ref())
                .map_err(|e| e.to_string())
                .and_then(|handler| handler.handle(event).map_err(|e| e.to_string()));
            if let Err(error) = outcome {
                warn!(
                    processor = %self.processor,
                    handler = descriptor.name(),
                    event = event.name(),
                    %error,
                    "event handler failed"
                );
            }
        }
        let position = self.position.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(tokens) = &self.tokens {
            tokens.store_token(&self.processor, position);
        }
    }
}
