//! Per-thread interruption.
//!
//! Rust threads cannot be interrupted from outside, so blocking buffer calls
//! consult the calling thread's [`InterruptToken`] instead. A token is sticky:
//! once interrupted it stays interrupted, and the thread observes that state
//! through [`InterruptToken::is_interrupted`] after a wait has been aborted.
//!
//! Two wake paths exist because the buffer strategies block differently:
//! - channel waits `Select` on [`InterruptToken::signal`], which disconnects
//!   on interrupt;
//! - condition-variable waits register a [`Wake`] for the duration of the wait.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{PcError, PcResult};

/// Something parked on a condition variable that an interrupt must rouse.
pub trait Wake: Send + Sync {
    /// Wakes every waiter. Implementations must take the lock the waiters
    /// wait under before notifying.
    fn wake(&self);
}

thread_local! {
    static CURRENT: RefCell<Option<InterruptToken>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct Inner {
    interrupted: AtomicBool,
    signal_tx: Mutex<Option<Sender<()>>>,
    signal_rx: Receiver<()>,
    wakers: Mutex<HashMap<u64, Arc<dyn Wake>>>,
    next_waker: AtomicU64,
}

impl std::fmt::Debug for dyn Wake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Wake")
    }
}

/// Interruption flag shared between a thread and whoever may interrupt it.
#[derive(Debug, Clone)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

impl InterruptToken {
    /// Create a fresh, uninterrupted token.
    #[must_use]
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(Inner {
                interrupted: AtomicBool::new(false),
                signal_tx: Mutex::new(Some(signal_tx)),
                signal_rx,
                wakers: Mutex::new(HashMap::new()),
                next_waker: AtomicU64::new(0),
            }),
        }
    }

    /// The calling thread's token, created on first use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|slot| slot.borrow_mut().get_or_insert_with(Self::new).clone())
    }

    /// Install `token` as the calling thread's token.
    pub fn install(token: Self) {
        CURRENT.with(|slot| *slot.borrow_mut() = Some(token));
    }

    /// Set the flag and wake any wait the owning thread is blocked in.
    ///
    /// Idempotent.
    pub fn interrupt(&self) {
        if self.inner.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping the only sender disconnects `signal_rx`, which readies every
        // `Select` that includes it.
        if let Ok(mut tx) = self.inner.signal_tx.lock() {
            tx.take();
        }

        // Copy out first: `wake` takes foreign locks, and a waiter may hold one of
        // those while registering.
        let wakers: Vec<Arc<dyn Wake>> = match self.inner.wakers.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        for waker in wakers {
            waker.wake();
        }
        tracing::debug!(thread = ?thread::current().name(), "interrupt delivered");
    }

    /// Whether [`interrupt`](Self::interrupt) has been called.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Receiver that disconnects once the token is interrupted.
    ///
    /// Never yields a message; only its disconnect is meaningful.
    #[must_use]
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal_rx
    }

    /// Register `waker` until the returned guard is dropped.
    ///
    /// Callers must re-check [`is_interrupted`](Self::is_interrupted) after
    /// registering and before waiting.
    #[must_use]
    pub fn register_waker(&self, waker: Arc<dyn Wake>) -> WakerRegistration {
        let key = self.inner.next_waker.fetch_add(1, Ordering::Relaxed);
        match self.inner.wakers.lock() {
            Ok(mut map) => {
                map.insert(key, waker);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key, waker);
            }
        }
        WakerRegistration {
            inner: Arc::clone(&self.inner),
            key,
        }
    }
}

impl Default for InterruptToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a [`Wake`] registered on a token. Deregisters on drop.
#[derive(Debug)]
pub struct WakerRegistration {
    inner: Arc<Inner>,
    key: u64,
}

impl Drop for WakerRegistration {
    fn drop(&mut self) {
        match self.inner.wakers.lock() {
            Ok(mut map) => {
                map.remove(&self.key);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.key);
            }
        }
    }
}

/// A spawned thread together with the token that interrupts it.
#[derive(Debug)]
pub struct Worker<R> {
    name: String,
    token: InterruptToken,
    handle: JoinHandle<R>,
}

impl<R> Worker<R> {
    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token installed in the worker thread.
    #[must_use]
    pub const fn token(&self) -> &InterruptToken {
        &self.token
    }

    /// Interrupt the worker.
    pub fn interrupt(&self) {
        self.token.interrupt();
    }

    /// Whether the thread has finished running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to finish.
    ///
    /// # Errors
    /// Returns [`PcError::Internal`] when the worker panicked.
    pub fn join(self) -> PcResult<R> {
        let name = self.name;
        self.handle
            .join()
            .map_err(|_| PcError::internal(format!("worker '{name}' panicked")))
    }
}

/// Spawn a named thread with its own interrupt token installed.
///
/// # Errors
/// Returns [`PcError::Spawn`] when the OS refuses to create the thread.
pub fn spawn_worker<F, R>(name: impl Into<String>, f: F) -> PcResult<Worker<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let name = name.into();
    let token = InterruptToken::new();
    let thread_token = token.clone();
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            InterruptToken::install(thread_token);
            f()
        })
        .map_err(|source| PcError::Spawn {
            name: name.clone(),
            source,
        })?;

    Ok(Worker {
        name,
        token,
        handle,
    })
}
