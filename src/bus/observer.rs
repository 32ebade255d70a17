use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buffer::BufferChange;
use crate::config::VerboseFlag;
use crate::error::ObserverError;

/// Anything published on a [`NotificationBus`](super::NotificationBus).
pub trait Subject: Send + Sync {
    /// Short type label recorded in the event log.
    fn subject_kind(&self) -> &str;
}

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Create a new random observer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A listener: receives the concern name and the published subject.
pub type Observer<S> = Arc<dyn Fn(&str, &S) -> Result<(), ObserverError> + Send + Sync>;

/// Listener that echoes buffer changes to stdout while `verbose` is set.
///
/// The flag is read on every call, so toggling it takes effect immediately.
#[must_use]
pub fn console_observer(verbose: VerboseFlag) -> impl Fn(&str, &BufferChange) -> Result<(), ObserverError> + Send + Sync {
    move |concern, change| {
        if verbose.is_verbose() {
            println!(
                "[queue-observer] concern={concern} subject={} op={} size={}/{} produced={} consumed={}",
                change.strategy.subject_kind(),
                change.op,
                change.size,
                change.capacity,
                change.produced,
                change.consumed,
            );
        }
        Ok(())
    }
}
