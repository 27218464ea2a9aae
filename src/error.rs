//! Error types for Slotwire.

use std::error::Error as StdError;

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Root error type for Slotwire operations.
#[derive(Error, Debug)]
pub enum SlotwireError {
    /// Discovery-time binding errors
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    /// Assembly errors
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Host registry publication errors
    #[error("Publication error: {0}")]
    Publication(#[from] PublicationError),

    /// A producer or factory failed; carried through untouched.
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// Invalid session configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while slots, producers and descriptors are registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A second producer was bound to an already-bound slot
    #[error("Producer already bound for slot '{slot}' by {existing}; rejected {rejected}")]
    Duplicate {
        slot: String,
        existing: String,
        rejected: String,
    },

    /// No slot with this name is defined
    #[error("Unknown slot: {0}")]
    UnknownSlot(String),

    /// A slot with this name is already defined
    #[error("Slot already defined: {0}")]
    AlreadyDefined(String),

    /// The value type does not match the slot definition
    #[error("Slot '{slot}' holds {expected}, got {actual}")]
    TypeMismatch {
        slot: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Registration attempted after assembly began
    #[error("Discovery is closed; rejected registration of {0}")]
    DiscoveryClosed(String),
}

/// Errors raised while folding slots and catalogs into a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Storage components that cannot be combined
    #[error("Conflicting storage configuration: {0}")]
    ConflictingStorage(String),

    /// A component needs another one that was never configured
    #[error("{component} requires a {dependency}")]
    MissingDependency {
        component: String,
        dependency: &'static str,
    },

    /// The same aggregate was registered twice
    #[error("Aggregate registered twice: {0}")]
    DuplicateAggregate(String),

    /// A handler configuration producer overrode discovered handlers (strict mode)
    #[error("Handler configuration producer discarded {0} discovered handler(s)")]
    DiscardedHandlers(usize),

    /// The slot's producer failed earlier in this assembly
    #[error("Producer for slot '{0}' failed")]
    ProducerFailed(String),

    /// Assembly already ran for this session
    #[error("Assembly already performed")]
    AlreadyAssembled,
}

/// Errors raised by illegal lifecycle transitions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Illegal lifecycle state: cannot {operation} while {state}")]
    IllegalState {
        operation: &'static str,
        state: LifecycleState,
    },
}

/// Errors raised by the host registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicationError {
    /// A value of this type is already lookupable in the host
    #[error("Ambiguous publication: {0} is already published")]
    Ambiguous(&'static str),

    /// The published value can no longer be produced
    #[error("Published value unavailable: {0}")]
    Unavailable(#[from] LifecycleError),
}

/// Failure raised by a producer, default factory or handler factory.
///
/// The original error is kept as-is; `Display` and `source` forward to it.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ProducerError(Box<dyn StdError + Send + Sync + 'static>);

impl ProducerError {
    /// Wrap any error raised by producer code.
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self(err.into())
    }

    /// Borrow the original error as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Unwrap the original error.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.0
    }
}

impl From<std::io::Error> for ProducerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err)
    }
}

impl From<String> for ProducerError {
    fn from(msg: String) -> Self {
        Self::new(msg)
    }
}

impl From<&str> for ProducerError {
    fn from(msg: &str) -> Self {
        Self::new(msg)
    }
}

/// Result type alias for producer invocations.
pub type ProducerResult<T> = Result<T, ProducerError>;

/// Result type alias for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Result type alias for publication operations.
pub type PublicationResult<T> = Result<T, PublicationError>;

/// Result type alias for general Slotwire operations.
pub type SlotwireResult<T> = Result<T, SlotwireError>;
