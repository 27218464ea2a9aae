//! Base trait for the runtime components wired into a configuration.
//!
//! Every value that can sit in a slot (buses, serializers, stores) is a
//! `Component`: it has a name for logging and can be downcast to its
//! concrete type.

use std::any::Any;
use std::fmt::Debug;

/// Base trait for all assembled runtime components.
///
/// # Example
///
/// ```rust
/// use slotwire::Component;
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct AuditLog;
///
/// impl Component for AuditLog {
///     fn name(&self) -> &str {
///         "audit-log"
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Component: Send + Sync + Debug {
    /// Returns a short name used in assembly logs.
    fn name(&self) -> &str;

    /// Downcast to concrete type for advanced usage.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait for component type checking.
pub trait ComponentExt: Component {
    /// Check if this component is of type T.
    fn is<T: Component + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to type T.
    fn downcast_ref<T: Component + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<C: Component + ?Sized> ComponentExt for C {}
