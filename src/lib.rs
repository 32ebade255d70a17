//! # pcbuf - bounded producer/consumer buffers
//!
//! A fixed-capacity FIFO buffer shared by producer and consumer threads, with
//! two interchangeable synchronization strategies, a notification bus for
//! change events and an append-only snapshot store for auditing.
//!
//! ## Core Concepts
//!
//! - **BoundedBuffer**: blocking `put`/`take` with interruption support
//! - **Strategy**: `Channel` (delegates to a bounded crossbeam channel) or
//!   `Monitor` (mutex + condition variable)
//! - **NotificationBus**: per-concern listeners invoked synchronously after each mutation
//! - **SnapshotStore**: immutable, timestamped copies of buffer and destination state
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use pcbuf::{buffer, BufferConfig, NotificationBus, Strategy};
//!
//! let bus = Arc::new(NotificationBus::new());
//! let cfg = BufferConfig { strategy: Strategy::Monitor, capacity: 4, ..BufferConfig::default() };
//! let buf = buffer::build::<u32>(&cfg, Arc::clone(&bus))?;
//!
//! buf.put(1)?;
//! buf.put(2)?;
//! assert_eq!(buf.take()?, 1);
//! assert_eq!(buf.snapshot_contents(), vec![2]);
//! assert_eq!(bus.event_log().len(), 3);
//! # Ok::<(), pcbuf::BufferError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod bus;
pub mod config;
pub mod error;
pub mod harness;
pub mod interrupt;
pub mod logging;
pub mod memento;

// Re-export primary types at crate root for convenience
pub use buffer::{BoundedBuffer, BufferChange, BufferId, BufferState, ChannelBuffer, MonitorBuffer, Strategy};
pub use bus::{console_observer, BusEvent, NotificationBus, Observer, ObserverId, Subject};
pub use config::{BufferConfig, HarnessConfig, VerboseFlag};
pub use error::{BufferError, BufferOp, ConfigError, ObserverError, PcError, PcResult};
pub use harness::{Destination, RunReport, WorkerOutcome, WorkerReport, WorkerRole};
pub use interrupt::{spawn_worker, InterruptToken, Worker};
pub use memento::{Snapshot, SnapshotStore};
