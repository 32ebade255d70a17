use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::buffer::BufferChange;
use crate::error::ObserverError;

use super::observer::{Observer, ObserverId, Subject};

/// One entry of the bus event log.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEvent {
    pub concern: String,
    pub at: DateTime<Utc>,
    pub subject_kind: String,
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.at.to_rfc3339(), self.concern, self.subject_kind)
    }
}

struct Listener<S> {
    id: ObserverId,
    callback: Observer<S>,
    // Cleared by removal; checked before every call.
    active: AtomicBool,
}

struct BusState<S> {
    observers: HashMap<String, Vec<Arc<Listener<S>>>>,
    log: Vec<BusEvent>,
}

/// Per-concern listener registry with an append-only event log.
///
/// Listeners run on the publishing thread after the bus lock has been
/// released, so a listener may itself add or remove observers. Removal is
/// immediate: once `remove_observer` returns the listener is never invoked
/// again, even by a notification already in progress. A call that had
/// already started when the removal happened runs to completion.
pub struct NotificationBus<S = BufferChange> {
    state: Mutex<BusState<S>>,
    failures: AtomicU64,
}

static GLOBAL: OnceLock<Arc<NotificationBus>> = OnceLock::new();

impl NotificationBus<BufferChange> {
    /// Process-wide bus, created on first use.
    ///
    /// Components in this crate always take an explicit bus; this exists for
    /// callers that want a single shared instance without threading it through.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }
}

impl<S: Subject> NotificationBus<S> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                observers: HashMap::new(),
                log: Vec::new(),
            }),
            failures: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState<S>> {
        // Listeners never run under this lock, so poisoning can only come from
        // a panic in the bus itself; the state is still consistent.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `listener` for `concern`, after any already registered.
    pub fn add_observer<F>(&self, concern: impl Into<String>, listener: F) -> ObserverId
    where
        F: Fn(&str, &S) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let id = ObserverId::new();
        let concern = concern.into();
        tracing::debug!(%concern, observer_id = %id, "observer added");
        self.lock()
            .observers
            .entry(concern)
            .or_default()
            .push(Arc::new(Listener {
                id,
                callback: Arc::new(listener),
                active: AtomicBool::new(true),
            }));
        id
    }

    /// Remove a listener. Returns false if it was not registered for `concern`.
    pub fn remove_observer(&self, concern: &str, id: ObserverId) -> bool {
        let mut state = self.lock();
        let Some(list) = state.observers.get_mut(concern) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| {
            if l.id == id {
                l.active.store(false, Ordering::SeqCst);
                return false;
            }
            true
        });
        let removed = list.len() != before;
        if list.is_empty() {
            state.observers.remove(concern);
        }
        tracing::debug!(%concern, observer_id = %id, removed, "observer removed");
        removed
    }

    /// Number of listeners registered for `concern`.
    #[must_use]
    pub fn observer_count(&self, concern: &str) -> usize {
        self.lock().observers.get(concern).map_or(0, Vec::len)
    }

    /// Record an event for `concern` and invoke its listeners in order.
    ///
    /// Listener errors and panics are logged and counted, never returned.
    pub fn notify_change(&self, concern: &str, subject: &S) {
        let listeners: Vec<Arc<Listener<S>>> = {
            let mut state = self.lock();
            state.log.push(BusEvent {
                concern: concern.to_string(),
                at: Utc::now(),
                subject_kind: subject.subject_kind().to_string(),
            });
            state
                .observers
                .get(concern)
                .map(|list| list.iter().map(Arc::clone).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            if !listener.active.load(Ordering::SeqCst) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (listener.callback)(concern, subject)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => ObserverError::Panicked {
                    message: panic_message(payload.as_ref()),
                },
            };
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%concern, observer_id = %listener.id, error = %failure, "observer failed");
        }
    }

    /// Copy of the full event log, oldest first.
    #[must_use]
    pub fn event_log(&self) -> Vec<BusEvent> {
        self.lock().log.clone()
    }

    /// Total listener failures contained so far.
    #[must_use]
    pub fn observer_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl<S: Subject> Default for NotificationBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for NotificationBus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("NotificationBus");
        if let Ok(state) = self.state.try_lock() {
            d.field("concerns", &state.observers.len())
                .field("events", &state.log.len());
        }
        d.field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
