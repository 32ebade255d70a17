//! Error types for pcbuf.
//!
//! All errors are strongly typed using thiserror, grouped per subsystem and
//! wrapped by [`PcError`] at the crate boundary.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Blocking buffer operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOp {
    /// Insert at the tail.
    Put,
    /// Remove from the head.
    Take,
}

impl fmt::Display for BufferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => f.write_str("put"),
            Self::Take => f.write_str("take"),
        }
    }
}

/// Errors raised by bounded buffer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The calling thread was interrupted while blocked. The buffer is unchanged.
    #[error("Interrupted while waiting in {op}")]
    InterruptedWait {
        /// Operation that was waiting.
        op: BufferOp,
    },

    /// A buffer cannot hold zero items.
    #[error("Buffer capacity must be positive, got {capacity}")]
    CapacityMisconfiguration {
        /// Rejected capacity.
        capacity: usize,
    },

    /// A thread panicked while holding a buffer lock.
    #[error("Poisoned lock: {context}")]
    Poisoned {
        /// Lock site.
        context: &'static str,
    },

    /// Internal bookkeeping disagreed with itself. Indicates a bug in the buffer.
    #[error("Buffer invariant violated: {context}")]
    Invariant {
        /// What was found inconsistent.
        context: &'static str,
    },

    /// The delegate channel was closed.
    #[error("Buffer channel disconnected during {op}")]
    Disconnected {
        /// Operation that observed the disconnect.
        op: BufferOp,
    },
}

impl BufferError {
    /// Returns true if this error reports an interrupted wait.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::InterruptedWait { .. })
    }
}

/// Error returned by a notification listener.
///
/// The bus contains these; they never reach the publishing thread.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("Observer failed: {message}")]
    #[allow(missing_docs)]
    Failed { message: String },

    #[error("Observer panicked: {message}")]
    #[allow(missing_docs)]
    Panicked { message: String },
}

impl ObserverError {
    /// Creates a listener failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    #[allow(missing_docs)]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    #[allow(missing_docs)]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    #[allow(missing_docs)]
    Parse(#[from] toml::de::Error),
}

/// Top-level error type for pcbuf.
#[derive(Debug, Error)]
pub enum PcError {
    #[error("Buffer error: {0}")]
    #[allow(missing_docs)]
    Buffer(#[from] BufferError),

    #[error("Config error: {0}")]
    #[allow(missing_docs)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn worker '{name}': {source}")]
    #[allow(missing_docs)]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {message}")]
    #[allow(missing_docs)]
    Internal { message: String },
}

impl PcError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a buffer error.
    #[must_use]
    pub const fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error reports an interrupted wait.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Buffer(BufferError::InterruptedWait { .. }))
    }
}

/// Result type alias for pcbuf operations.
pub type PcResult<T> = Result<T, PcError>;
