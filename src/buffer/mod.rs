//! Bounded FIFO buffers shared between producer and consumer threads.
//!
//! Two strategies implement [`BoundedBuffer`]:
//! - [`ChannelBuffer`] delegates capacity and blocking to a bounded
//!   crossbeam channel;
//! - [`MonitorBuffer`] builds the same behaviour from a `Mutex` and a single
//!   `Condvar`.
//!
//! The strategy is chosen once, through [`build`], and is invisible to callers
//! afterwards. Every successful `put`/`take` publishes a [`BufferChange`] on the
//! buffer's [`NotificationBus`] after the buffer's own lock has been released.

/// Delegating strategy over `crossbeam_channel::bounded`.
pub mod channel;
/// Hand-built monitor strategy.
pub mod monitor;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{NotificationBus, Subject};
use crate::config::BufferConfig;
use crate::error::{BufferError, BufferOp};

pub use channel::ChannelBuffer;
pub use monitor::MonitorBuffer;

/// Concern name buffers publish under unless configured otherwise.
pub const DEFAULT_CONCERN: &str = "queue";

/// Unique identifier for a buffer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(Uuid);

impl BufferId {
    /// Create a new random buffer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Synchronization strategy backing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Delegate to a bounded blocking channel.
    #[default]
    Channel,
    /// Mutex plus condition variable.
    Monitor,
}

impl Strategy {
    /// Name used in event logs and console output.
    #[must_use]
    pub const fn subject_kind(self) -> &'static str {
        match self {
            Self::Channel => "ChannelBuffer",
            Self::Monitor => "MonitorBuffer",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => f.write_str("channel"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" | "blocking" => Ok(Self::Channel),
            "monitor" | "wait" => Ok(Self::Monitor),
            other => Err(format!(
                "unknown strategy '{other}' (expected channel|blocking|monitor|wait)"
            )),
        }
    }
}

/// Occupancy class of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    /// No items; takers block.
    Empty,
    /// Neither empty nor full.
    Partial,
    /// At capacity; putters block.
    Full,
}

impl BufferState {
    /// Classify `size` against `capacity`.
    #[must_use]
    pub const fn classify(size: usize, capacity: usize) -> Self {
        if size == 0 {
            Self::Empty
        } else if size >= capacity {
            Self::Full
        } else {
            Self::Partial
        }
    }
}

/// Immutable record of a completed buffer mutation.
///
/// Observers receive this value instead of the buffer so they never need to
/// call back into it.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferChange {
    pub buffer_id: BufferId,
    pub strategy: Strategy,
    pub op: BufferOp,
    pub size: usize,
    pub capacity: usize,
    pub produced: u64,
    pub consumed: u64,
    pub at: DateTime<Utc>,
}

impl Subject for BufferChange {
    fn subject_kind(&self) -> &str {
        self.strategy.subject_kind()
    }
}

/// Contract shared by both buffer strategies.
///
/// # Blocking
/// `put` blocks while full and `take` blocks while empty. Both fail with
/// [`BufferError::InterruptedWait`] when the calling thread's
/// [`InterruptToken`](crate::interrupt::InterruptToken) is set, and leave the
/// buffer untouched when they do.
pub trait BoundedBuffer<T>: Send + Sync {
    /// Append `item`, waiting for space.
    ///
    /// # Errors
    /// [`BufferError::InterruptedWait`] when interrupted before the item was
    /// stored, [`BufferError::Poisoned`] when a buffer lock is poisoned.
    fn put(&self, item: T) -> Result<(), BufferError>;

    /// Remove the oldest item, waiting for one to arrive.
    ///
    /// # Errors
    /// [`BufferError::InterruptedWait`] when interrupted before an item was
    /// removed, [`BufferError::Poisoned`] when a buffer lock is poisoned.
    fn take(&self) -> Result<T, BufferError>;

    /// Point-in-time copy of the contents, oldest first.
    ///
    /// Under concurrent mutation the copy is not linearizable with respect to
    /// other threads' operations.
    fn snapshot_contents(&self) -> Vec<T>;

    /// Current number of items.
    fn size(&self) -> usize;

    /// Fixed capacity.
    fn capacity(&self) -> usize;

    /// Total successful `put`s since creation.
    fn produced_count(&self) -> u64;

    /// Total successful `take`s since creation.
    fn consumed_count(&self) -> u64;

    /// Identity used in published events.
    fn id(&self) -> BufferId;

    /// Strategy backing this buffer.
    fn strategy(&self) -> Strategy;

    /// Occupancy class derived from `size` and `capacity`.
    fn state(&self) -> BufferState {
        BufferState::classify(self.size(), self.capacity())
    }
}

/// Build a buffer for `config`, publishing to `bus`.
///
/// # Errors
/// Returns [`BufferError::CapacityMisconfiguration`] when the capacity is zero.
pub fn build<T>(
    config: &BufferConfig,
    bus: Arc<NotificationBus>,
) -> Result<Arc<dyn BoundedBuffer<T>>, BufferError>
where
    T: Clone + Send + 'static,
{
    let buffer: Arc<dyn BoundedBuffer<T>> = match config.strategy {
        Strategy::Channel => Arc::new(ChannelBuffer::new(config.capacity, config.concern.clone(), bus)?),
        Strategy::Monitor => Arc::new(MonitorBuffer::new(config.capacity, config.concern.clone(), bus)?),
    };
    tracing::debug!(
        buffer_id = %buffer.id(),
        strategy = %config.strategy,
        capacity = config.capacity,
        concern = %config.concern,
        "buffer created"
    );
    Ok(buffer)
}

/// Shared publishing half of both strategies.
#[derive(Debug)]
pub(crate) struct Publisher {
    id: BufferId,
    strategy: Strategy,
    concern: String,
    bus: Arc<NotificationBus>,
}

impl Publisher {
    pub(crate) fn new(strategy: Strategy, concern: String, bus: Arc<NotificationBus>) -> Self {
        Self {
            id: BufferId::new(),
            strategy,
            concern,
            bus,
        }
    }

    pub(crate) const fn id(&self) -> BufferId {
        self.id
    }

    /// Must be called without any buffer lock held.
    pub(crate) fn publish(&self, op: BufferOp, size: usize, capacity: usize, produced: u64, consumed: u64) {
        let change = BufferChange {
            buffer_id: self.id,
            strategy: self.strategy,
            op,
            size,
            capacity,
            produced,
            consumed,
            at: Utc::now(),
        };
        self.bus.notify_change(&self.concern, &change);
    }
}

pub(crate) fn check_capacity(capacity: usize) -> Result<usize, BufferError> {
    if capacity == 0 {
        return Err(BufferError::CapacityMisconfiguration { capacity });
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parses_aliases() {
        assert_eq!("blocking".parse::<Strategy>().unwrap(), Strategy::Channel);
        assert_eq!("WAIT".parse::<Strategy>().unwrap(), Strategy::Monitor);
        assert_eq!("monitor".parse::<Strategy>().unwrap(), Strategy::Monitor);
        assert!("spin".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_state_classification() {
        assert_eq!(BufferState::classify(0, 2), BufferState::Empty);
        assert_eq!(BufferState::classify(1, 2), BufferState::Partial);
        assert_eq!(BufferState::classify(2, 2), BufferState::Full);
        assert_eq!(BufferState::classify(1, 1), BufferState::Full);
    }

    #[test]
    fn test_build_rejects_zero_capacity() {
        let bus = Arc::new(NotificationBus::new());
        for strategy in [Strategy::Channel, Strategy::Monitor] {
            let cfg = BufferConfig {
                strategy,
                capacity: 0,
                ..BufferConfig::default()
            };
            let err = build::<i64>(&cfg, Arc::clone(&bus)).err();
            assert_eq!(err, Some(BufferError::CapacityMisconfiguration { capacity: 0 }));
        }
    }

    #[test]
    fn test_build_selects_strategy() {
        let bus = Arc::new(NotificationBus::new());
        for strategy in [Strategy::Channel, Strategy::Monitor] {
            let cfg = BufferConfig {
                strategy,
                capacity: 3,
                ..BufferConfig::default()
            };
            let buffer = build::<i64>(&cfg, Arc::clone(&bus)).unwrap();
            assert_eq!(buffer.strategy(), strategy);
            assert_eq!(buffer.capacity(), 3);
            assert_eq!(buffer.state(), BufferState::Empty);
        }
    }
}
