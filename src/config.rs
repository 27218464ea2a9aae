//! Configuration for assembly sessions.

/// Base trait for configuration types.
///
/// # Example
///
/// ```rust
/// use slotwire::Config;
///
/// #[derive(Debug, Clone)]
/// struct HostConfig {
///     name: String,
///     workers: u32,
/// }
///
/// impl Config for HostConfig {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.workers == 0 {
///             return Err("workers must be greater than 0".to_string());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Config: Send + Sync {
    /// Returns the configuration name/identifier.
    fn name(&self) -> &str {
        "default"
    }

    /// Returns whether verbose output is enabled.
    fn is_verbose(&self) -> bool {
        false
    }

    /// Validates the configuration.
    ///
    /// Returns Ok(()) if valid, or an error message describing the issue.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Default capacity of the async discovery feed.
pub const DEFAULT_FEED_BUFFER: usize = 100;

/// Settings for one [`AssemblySession`](crate::AssemblySession).
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Application name, attached to assembly log lines
    pub name: String,
    /// Log every aggregate and handler registration at info level
    pub verbose: bool,
    /// Fail assembly instead of warning when a handler configuration
    /// producer discards discovered handlers
    pub strict_handler_override: bool,
    /// Capacity of the async discovery feed
    pub feed_buffer: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            verbose: false,
            strict_handler_override: false,
            feed_buffer: DEFAULT_FEED_BUFFER,
        }
    }
}

impl AssemblyConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the discovery feed capacity.
    pub fn with_feed_buffer(mut self, size: usize) -> Self {
        self.feed_buffer = size;
        self
    }

    /// Enable verbose registration logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Reject handler configuration producers that discard discovered handlers.
    pub fn strict_handler_override(mut self) -> Self {
        self.strict_handler_override = true;
        self
    }
}

impl Config for AssemblyConfig {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            "default"
        } else {
            &self.name
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn validate(&self) -> Result<(), String> {
        if self.feed_buffer == 0 {
            return Err("feed_buffer must be greater than 0".to_string());
        }
        Ok(())
    }
}
