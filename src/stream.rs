//! Async discovery feed.
//!
//! Hosts that scan asynchronously push [`DiscoveryEvent`]s through a
//! [`DiscoverySender`]; the session drains the matching stream until every
//! sender is dropped, then accepts the assembly trigger.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::catalog::{AggregateDescriptor, Bean, HandlerDescriptor};
use crate::config::DEFAULT_FEED_BUFFER;
use crate::slot::ProducerBinding;

/// One observation from the host's scanning pass.
pub enum DiscoveryEvent {
    /// A type marked as an aggregate
    Aggregate(AggregateDescriptor),
    /// A producer for a slot
    Producer(ProducerBinding),
    /// A handler already known to be one
    Handler(HandlerDescriptor),
    /// A bean that may expose event handlers
    Bean(Arc<dyn Bean>),
}

impl DiscoveryEvent {
    /// Short label for the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Producer(_) => "producer",
            Self::Handler(_) => "handler",
            Self::Bean(_) => "bean",
        }
    }
}

impl fmt::Debug for DiscoveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate(a) => f.debug_tuple("Aggregate").field(a).finish(),
            Self::Producer(p) => f.debug_tuple("Producer").field(p).finish(),
            Self::Handler(h) => f.debug_tuple("Handler").field(h).finish(),
            Self::Bean(b) => f.debug_tuple("Bean").field(&b.bean_name()).finish(),
        }
    }
}

/// Boxed stream of discovery events.
pub type DiscoveryStream = Pin<Box<dyn Stream<Item = DiscoveryEvent> + Send>>;

/// Sending half of a discovery feed.
#[derive(Debug, Clone)]
pub struct DiscoverySender {
    tx: mpsc::Sender<DiscoveryEvent>,
}

impl DiscoverySender {
    /// Send an event, waiting for capacity.
    ///
    /// Returns the event back if the session stopped listening.
    pub async fn send(&self, event: DiscoveryEvent) -> Result<(), DiscoveryEvent> {
        self.tx.send(event).await.map_err(|e| e.0)
    }

    /// Send an event without waiting.
    pub fn try_send(&self, event: DiscoveryEvent) -> Result<(), DiscoveryEvent> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(v) => v,
            mpsc::error::TrySendError::Closed(v) => v,
        })
    }

    pub async fn aggregate(&self, aggregate: AggregateDescriptor) -> Result<(), DiscoveryEvent> {
        self.send(DiscoveryEvent::Aggregate(aggregate)).await
    }

    pub async fn producer(&self, binding: ProducerBinding) -> Result<(), DiscoveryEvent> {
        self.send(DiscoveryEvent::Producer(binding)).await
    }

    pub async fn handler(&self, handler: HandlerDescriptor) -> Result<(), DiscoveryEvent> {
        self.send(DiscoveryEvent::Handler(handler)).await
    }

    pub async fn bean(&self, bean: Arc<dyn Bean>) -> Result<(), DiscoveryEvent> {
        self.send(DiscoveryEvent::Bean(bean)).await
    }

    /// Check if the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a discovery feed with room for `buffer` pending events.
///
/// # Panics
///
/// Panics if `buffer` is 0; `AssemblyConfig::validate` rejects that value.
///
/// # Example
///
/// ```rust
/// use slotwire::stream::discovery_feed;
/// use slotwire::AggregateDescriptor;
///
/// # async fn example() {
/// let (sender, feed) = discovery_feed(16);
/// sender
///     .aggregate(AggregateDescriptor::named("OrderAggregate"))
///     .await
///     .unwrap();
/// drop(sender);
/// # let _ = feed;
/// # }
/// ```
pub fn discovery_feed(buffer: usize) -> (DiscoverySender, DiscoveryStream) {
    let (tx, rx) = mpsc::channel(buffer);
    let stream: DiscoveryStream = Box::pin(ReceiverStream::new(rx));
    (DiscoverySender { tx }, stream)
}

/// Create a discovery feed with the default buffer size.
pub fn default_feed() -> (DiscoverySender, DiscoveryStream) {
    discovery_feed(DEFAULT_FEED_BUFFER)
}

/// A finished feed that yields `events` in order.
pub fn from_events(events: Vec<DiscoveryEvent>) -> DiscoveryStream {
    Box::pin(tokio_stream::iter(events))
}
