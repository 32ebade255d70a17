//! Configuration for buffers and the producer/consumer harness.
//!
//! Defaults mirror a small demo run: five items, one producer, one consumer,
//! capacity 2, sentinel -1. Values can come from a TOML file and are then
//! overridden by CLI flags.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::{Strategy, DEFAULT_CONCERN};
use crate::error::ConfigError;

/// Shared, runtime-toggleable verbosity flag.
///
/// Listeners read it; nothing in the buffer core does.
#[derive(Debug, Clone, Default)]
pub struct VerboseFlag(Arc<AtomicBool>);

impl VerboseFlag {
    /// Create a flag with an initial value.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self(Arc::new(AtomicBool::new(verbose)))
    }

    /// Current value.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Set the value for every holder of this flag.
    pub fn set(&self, verbose: bool) {
        self.0.store(verbose, Ordering::Relaxed);
    }
}

/// Buffer construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Synchronization strategy.
    pub strategy: Strategy,
    /// Maximum number of items held at once.
    pub capacity: usize,
    /// Concern name change events are published under.
    pub concern: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Channel,
            capacity: 2,
            concern: DEFAULT_CONCERN.to_string(),
        }
    }
}

/// Harness run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Buffer to build.
    pub buffer: BufferConfig,
    /// Number of producer threads.
    pub producers: usize,
    /// Number of consumer threads.
    pub consumers: usize,
    /// Reserved value that stops a consumer. Must not occur in `source`.
    pub sentinel: i64,
    /// Items partitioned across producers.
    pub source: Vec<i64>,
    /// Echo every change notification to stdout.
    pub verbose: bool,
    /// Capture a snapshot after every consumed item, not only at start and end.
    pub trace_snapshots: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            producers: 1,
            consumers: 1,
            sentinel: -1,
            source: vec![1, 2, 3, 4, 5],
            verbose: false,
            trace_snapshots: false,
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] when the document is not valid TOML or
    /// a value has the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// whatever [`from_toml_str`](Self::from_toml_str) returns.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the harness cannot run.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.capacity == 0 {
            return Err(invalid("buffer.capacity", "must be positive"));
        }
        if self.producers == 0 {
            return Err(invalid("producers", "must be at least 1"));
        }
        if self.consumers == 0 {
            return Err(invalid("consumers", "must be at least 1"));
        }
        if self.buffer.concern.trim().is_empty() {
            return Err(invalid("buffer.concern", "cannot be empty"));
        }
        if self.source.contains(&self.sentinel) {
            return Err(invalid(
                "sentinel",
                &format!("{} also appears in source and would stop a consumer early", self.sentinel),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
