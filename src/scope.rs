//! Execution scopes handed to producers and factories.
//!
//! The host decides what a scope carries (a request context, a session,
//! pooled resources). The core only opens one per invocation and passes it
//! through without looking inside.

use std::any::Any;
use std::fmt::Debug;

/// Opaque execution context supplied by the host.
pub trait Scope: Send + Sync + Debug {
    /// Downcast to the host's concrete scope type.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait for reading the host's scope type.
pub trait ScopeExt: Scope {
    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<S: Scope + ?Sized> ScopeExt for S {}

/// Opens a fresh scope for each producer or factory invocation.
pub trait ScopeProvider: Send + Sync + Debug {
    /// Open a new scope for one invocation.
    fn open_scope(&self) -> Box<dyn Scope>;
}

/// A scope carrying nothing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scope provider for hosts without ambient resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unscoped;

impl ScopeProvider for Unscoped {
    fn open_scope(&self) -> Box<dyn Scope> {
        Box::new(EmptyScope)
    }
}
