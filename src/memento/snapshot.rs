use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable capture of buffer and destination contents.
///
/// Both sequences are owned copies; nothing here aliases live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot<T> {
    tag: String,
    created_at: DateTime<Utc>,
    buffer_contents: Vec<T>,
    destination_contents: Vec<T>,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(tag: String, buffer_contents: Vec<T>, destination_contents: Vec<T>) -> Self {
        Self {
            tag,
            created_at: Utc::now(),
            buffer_contents,
            destination_contents,
        }
    }

    /// Caller-supplied tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Capture time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Buffer contents at capture time.
    #[must_use]
    pub fn buffer_contents(&self) -> &[T] {
        &self.buffer_contents
    }

    /// Destination contents at capture time.
    #[must_use]
    pub fn destination_contents(&self) -> &[T] {
        &self.destination_contents
    }
}

impl<T: fmt::Debug> fmt::Display for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot{{tag='{}', created_at={}, buffer={:?}, dest={:?}}}",
            self.tag,
            self.created_at.to_rfc3339(),
            self.buffer_contents,
            self.destination_contents
        )
    }
}
