//! One discovery-then-assembly run.
//!
//! An `AssemblySession` owns the slot registry, both catalogs and the
//! lifecycle controller. Registration is accepted while the session is
//! discovering; the single `assemble` call closes discovery, builds and
//! starts the configuration and publishes it into the host.

use std::sync::Arc;

use futures_core::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblyReport, ConfigurationAssembler};
use crate::catalog::{
    AggregateCatalog, AggregateDescriptor, Bean, HandlerCatalog, HandlerDescriptor,
};
use crate::config::{AssemblyConfig, Config};
use crate::error::{AssemblyError, BindingError, BindingResult, SlotwireError, SlotwireResult};
use crate::lifecycle::LifecycleController;
use crate::publication::{HostRegistry, PublicationBridge};
use crate::registry::SlotRegistry;
use crate::scope::{ScopeProvider, Unscoped};
use crate::slot::{ProducerBinding, SlotDescriptor};
use crate::stream::{discovery_feed, DiscoveryEvent, DiscoverySender, DiscoveryStream};

/// Where a session is between discovery and a running configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Discovering,
    Assembling,
    Assembled,
    Failed,
}

/// Collects discoveries, then assembles, starts and publishes once.
///
/// # Example
///
/// ```rust
/// use slotwire::{AggregateDescriptor, AssemblyConfig, AssemblySession, InMemoryHostRegistry};
///
/// let mut session = AssemblySession::new(AssemblyConfig::new().with_name("orders")).unwrap();
/// session
///     .add_aggregate(AggregateDescriptor::named("OrderAggregate"))
///     .unwrap();
///
/// let mut host = InMemoryHostRegistry::new();
/// let lifecycle = session.assemble(&mut host).unwrap();
/// assert!(lifecycle.is_started());
/// assert!(lifecycle.shutdown());
/// ```
#[derive(Debug)]
pub struct AssemblySession {
    config: AssemblyConfig,
    scopes: Arc<dyn ScopeProvider>,
    slots: SlotRegistry,
    aggregates: AggregateCatalog,
    handlers: HandlerCatalog,
    lifecycle: Arc<LifecycleController>,
    phase: SessionPhase,
    report: Option<AssemblyReport>,
}

impl AssemblySession {
    /// Create a session over the standard slot catalogue.
    pub fn new(config: AssemblyConfig) -> SlotwireResult<Self> {
        config.validate().map_err(SlotwireError::Config)?;
        Ok(Self {
            config,
            scopes: Arc::new(Unscoped),
            slots: SlotRegistry::standard(),
            aggregates: AggregateCatalog::new(),
            handlers: HandlerCatalog::new(),
            lifecycle: Arc::new(LifecycleController::new()),
            phase: SessionPhase::Discovering,
            report: None,
        })
    }

    /// Use the host's scopes for producer and handler invocations.
    pub fn with_scopes(mut self, scopes: Arc<dyn ScopeProvider>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Define an additional slot.
    pub fn define_slot(&mut self, descriptor: SlotDescriptor) -> BindingResult<()> {
        self.ensure_discovering(descriptor.name())?;
        self.slots.define(descriptor)
    }

    /// Bind a producer. A second producer for the same slot is rejected.
    pub fn bind(&mut self, binding: ProducerBinding) -> BindingResult<()> {
        self.ensure_discovering(binding.slot())?;
        self.slots.bind(binding)
    }

    /// Record a discovered aggregate.
    pub fn add_aggregate(&mut self, aggregate: AggregateDescriptor) -> BindingResult<()> {
        self.ensure_discovering(aggregate.name())?;
        debug!(aggregate = aggregate.name(), "aggregate discovered");
        self.aggregates.add(aggregate)
    }

    /// Record a discovered event handler.
    pub fn add_handler(&mut self, handler: HandlerDescriptor) -> BindingResult<()> {
        self.ensure_discovering(handler.name())?;
        debug!(handler = handler.name(), "handler discovered");
        self.handlers.add(handler)
    }

    /// Record `bean` as a handler if it exposes one.
    pub fn inspect_bean(&mut self, bean: &dyn Bean) -> BindingResult<bool> {
        self.ensure_discovering(bean.bean_name())?;
        self.handlers.inspect(bean)
    }

    /// Apply one discovery event.
    pub fn accept(&mut self, event: DiscoveryEvent) -> BindingResult<()> {
        match event {
            DiscoveryEvent::Aggregate(aggregate) => self.add_aggregate(aggregate),
            DiscoveryEvent::Producer(binding) => self.bind(binding),
            DiscoveryEvent::Handler(handler) => self.add_handler(handler),
            DiscoveryEvent::Bean(bean) => self.inspect_bean(bean.as_ref()).map(|_| ()),
        }
    }

    /// A feed sized by the session's configuration.
    pub fn feed(&self) -> (DiscoverySender, DiscoveryStream) {
        discovery_feed(self.config.feed_buffer)
    }

    /// Apply events until the feed ends. Returns how many were applied.
    ///
    /// Stops at the first rejected event.
    pub async fn discover<S>(&mut self, mut feed: S) -> BindingResult<usize>
    where
        S: Stream<Item = DiscoveryEvent> + Unpin,
    {
        let mut applied = 0;
        while let Some(event) = feed.next().await {
            self.accept(event)?;
            applied += 1;
        }
        debug!(events = applied, "discovery feed closed");
        Ok(applied)
    }

    /// Build, start and publish the configuration.
    ///
    /// Runs once. On failure the session moves to `Failed` and nothing is
    /// left running: if publication fails after start, the configuration is
    /// shut down again before the error is returned.
    pub fn assemble(
        &mut self,
        host: &mut dyn HostRegistry,
    ) -> SlotwireResult<Arc<LifecycleController>> {
        if self.phase != SessionPhase::Discovering {
            return Err(AssemblyError::AlreadyAssembled.into());
        }
        self.phase = SessionPhase::Assembling;

        match self.run(host) {
            Ok(report) => {
                info!(app = self.config.name(), "application configuration ready");
                self.report = Some(report);
                self.phase = SessionPhase::Assembled;
                Ok(Arc::clone(&self.lifecycle))
            }
            Err(err) => {
                warn!(app = self.config.name(), error = %err, "assembly failed");
                self.phase = SessionPhase::Failed;
                Err(err)
            }
        }
    }

    fn run(&mut self, host: &mut dyn HostRegistry) -> SlotwireResult<AssemblyReport> {
        let (configuration, report) =
            ConfigurationAssembler::new(&self.config, Arc::clone(&self.scopes)).assemble(
                &mut self.slots,
                &mut self.aggregates,
                &mut self.handlers,
            )?;
        self.lifecycle.start(configuration)?;

        if let Err(err) = PublicationBridge::publish(host, &self.lifecycle, &report) {
            self.lifecycle.shutdown();
            return Err(err);
        }
        Ok(report)
    }

    fn ensure_discovering(&self, subject: &str) -> BindingResult<()> {
        if self.phase == SessionPhase::Discovering {
            Ok(())
        } else {
            Err(BindingError::DiscoveryClosed(subject.to_string()))
        }
    }

    /// Shut the configuration down; see [`LifecycleController::shutdown`].
    pub fn shutdown(&self) -> bool {
        self.lifecycle.shutdown()
    }

    /// The current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The controller guarding the assembled configuration.
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// What the assembly used; present once assembled.
    pub fn report(&self) -> Option<&AssemblyReport> {
        self.report.as_ref()
    }

    /// The slot registry.
    pub fn slots(&self) -> &SlotRegistry {
        &self.slots
    }

    /// The session's configuration.
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }
}
