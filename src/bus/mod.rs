//! Notification bus for buffer state changes.
//!
//! Listeners register per named concern and are invoked synchronously, in
//! registration order, on the publishing thread. A failing listener is
//! contained here and never reaches `put`/`take`.

/// Listener types and the console listener.
pub mod observer;
/// The bus itself and its event log.
pub mod registry;

pub use observer::{console_observer, Observer, ObserverId, Subject};
pub use registry::{BusEvent, NotificationBus};
