use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::bus::NotificationBus;
use crate::error::{BufferError, BufferOp};
use crate::interrupt::{InterruptToken, Wake, WakerRegistration};

use super::{check_capacity, BoundedBuffer, BufferId, Publisher, Strategy};

#[derive(Debug)]
struct State<T> {
    queue: VecDeque<T>,
    produced: u64,
    consumed: u64,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    // Serves both "not full" and "not empty"; every mutation uses notify_all.
    changed: Condvar,
}

impl<T: Send> Wake for Shared<T> {
    fn wake(&self) {
        // Holding the lock orders this notify after the waiter's flag check.
        let _guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.changed.notify_all();
    }
}

/// Monitor-style buffer: one `Mutex` over a plain `VecDeque`, one `Condvar`.
#[derive(Debug)]
pub struct MonitorBuffer<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
    publisher: Publisher,
}

impl<T> MonitorBuffer<T>
where
    T: Clone + Send + 'static,
{
    /// Create a buffer holding at most `capacity` items.
    ///
    /// # Errors
    /// Returns [`BufferError::CapacityMisconfiguration`] when `capacity` is zero.
    pub fn new(capacity: usize, concern: impl Into<String>, bus: Arc<NotificationBus>) -> Result<Self, BufferError> {
        let capacity = check_capacity(capacity)?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    produced: 0,
                    consumed: 0,
                }),
                changed: Condvar::new(),
            }),
            capacity,
            publisher: Publisher::new(Strategy::Monitor, concern.into(), bus),
        })
    }

    fn lock(&self, context: &'static str) -> Result<MutexGuard<'_, State<T>>, BufferError> {
        self.shared.state.lock().map_err(|_| BufferError::Poisoned { context })
    }

    fn lock_for_read(&self) -> MutexGuard<'_, State<T>> {
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Wait until `blocked` is false, re-checking after every wake.
    ///
    /// The waker is registered lazily, on the first iteration that would
    /// actually sleep, and the flag is re-checked after registering.
    fn wait_while<'a, F>(
        &'a self,
        mut state: MutexGuard<'a, State<T>>,
        op: BufferOp,
        token: &InterruptToken,
        registration: &mut Option<WakerRegistration>,
        blocked: F,
    ) -> Result<MutexGuard<'a, State<T>>, BufferError>
    where
        F: Fn(&State<T>) -> bool,
    {
        loop {
            if token.is_interrupted() {
                return Err(BufferError::InterruptedWait { op });
            }
            if !blocked(&*state) {
                return Ok(state);
            }
            if registration.is_none() {
                let waker: Arc<dyn Wake> = self.shared.clone();
                *registration = Some(token.register_waker(waker));
                continue;
            }
            state = self
                .shared
                .changed
                .wait(state)
                .map_err(|_| BufferError::Poisoned { context: "monitor_buffer.wait" })?;
        }
    }
}

impl<T> BoundedBuffer<T> for MonitorBuffer<T>
where
    T: Clone + Send + 'static,
{
    fn put(&self, item: T) -> Result<(), BufferError> {
        let token = InterruptToken::current();
        let mut registration = None;
        let capacity = self.capacity;

        let state = self.lock("monitor_buffer.put")?;
        let mut state = self.wait_while(state, BufferOp::Put, &token, &mut registration, |s| {
            s.queue.len() >= capacity
        })?;

        state.queue.push_back(item);
        state.produced += 1;
        let (size, produced, consumed) = (state.queue.len(), state.produced, state.consumed);
        self.shared.changed.notify_all();
        drop(state);
        drop(registration);

        self.publisher.publish(BufferOp::Put, size, capacity, produced, consumed);
        Ok(())
    }

    fn take(&self) -> Result<T, BufferError> {
        let token = InterruptToken::current();
        let mut registration = None;

        let state = self.lock("monitor_buffer.take")?;
        let mut state = self.wait_while(state, BufferOp::Take, &token, &mut registration, |s| {
            s.queue.is_empty()
        })?;

        // wait_while only returns once the queue is non-empty.
        let Some(item) = state.queue.pop_front() else {
            return Err(BufferError::Invariant {
                context: "monitor_buffer.take resumed with an empty queue",
            });
        };
        state.consumed += 1;
        let (size, produced, consumed) = (state.queue.len(), state.produced, state.consumed);
        self.shared.changed.notify_all();
        drop(state);
        drop(registration);

        self.publisher.publish(BufferOp::Take, size, self.capacity, produced, consumed);
        Ok(item)
    }

    fn snapshot_contents(&self) -> Vec<T> {
        self.lock_for_read().queue.iter().cloned().collect()
    }

    fn size(&self) -> usize {
        self.lock_for_read().queue.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn produced_count(&self) -> u64 {
        self.lock_for_read().produced
    }

    fn consumed_count(&self) -> u64 {
        self.lock_for_read().consumed
    }

    fn id(&self) -> BufferId {
        self.publisher.id()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Monitor
    }
}
