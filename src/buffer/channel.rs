use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{bounded, Receiver, Select, Sender, TryRecvError, TrySendError};

use crate::bus::NotificationBus;
use crate::error::{BufferError, BufferOp};
use crate::interrupt::InterruptToken;

use super::{check_capacity, BoundedBuffer, BufferId, Publisher, Strategy};

/// Buffer that delegates capacity and blocking to `crossbeam_channel::bounded`.
///
/// A channel cannot be inspected without receiving, so a ledger mirrors its
/// contents for [`snapshot_contents`](BoundedBuffer::snapshot_contents).
/// Waiting happens on the channel with no lock held; the transfer itself is a
/// `try_send`/`try_recv` made under the ledger lock, so the ledger always
/// holds exactly what the channel holds.
#[derive(Debug)]
pub struct ChannelBuffer<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    ledger: Mutex<VecDeque<T>>,
    produced: AtomicU64,
    consumed: AtomicU64,
    publisher: Publisher,
}

impl<T> ChannelBuffer<T>
where
    T: Clone + Send,
{
    /// Create a buffer holding at most `capacity` items.
    ///
    /// # Errors
    /// Returns [`BufferError::CapacityMisconfiguration`] when `capacity` is zero.
    pub fn new(capacity: usize, concern: impl Into<String>, bus: Arc<NotificationBus>) -> Result<Self, BufferError> {
        let capacity = check_capacity(capacity)?;
        let (tx, rx) = bounded::<T>(capacity);
        Ok(Self {
            tx,
            rx,
            capacity,
            ledger: Mutex::new(VecDeque::with_capacity(capacity)),
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            publisher: Publisher::new(Strategy::Channel, concern.into(), bus),
        })
    }

    fn ledger(&self) -> Result<MutexGuard<'_, VecDeque<T>>, BufferError> {
        self.ledger.lock().map_err(|_| BufferError::Poisoned {
            context: "channel_buffer.ledger",
        })
    }

    fn ledger_for_read(&self) -> MutexGuard<'_, VecDeque<T>> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Block until the channel reports `op` ready or `token` is interrupted.
    ///
    /// Readiness is only a hint; the caller retries its `try_*` call.
    fn wait_ready(&self, op: BufferOp, token: &InterruptToken) -> Result<(), BufferError> {
        let mut sel = Select::new();
        let data_idx = match op {
            BufferOp::Put => sel.send(&self.tx),
            BufferOp::Take => sel.recv(&self.rx),
        };
        let interrupt_idx = sel.recv(token.signal());
        // Only a disconnect can ready the signal channel.
        let ready = sel.ready();
        if ready == interrupt_idx || token.is_interrupted() {
            return Err(BufferError::InterruptedWait { op });
        }
        debug_assert_eq!(ready, data_idx);
        Ok(())
    }
}

impl<T> BoundedBuffer<T> for ChannelBuffer<T>
where
    T: Clone + Send,
{
    fn put(&self, item: T) -> Result<(), BufferError> {
        let token = InterruptToken::current();
        if token.is_interrupted() {
            return Err(BufferError::InterruptedWait { op: BufferOp::Put });
        }

        let (size, produced, consumed) = loop {
            let mut ledger = self.ledger()?;
            match self.tx.try_send(item.clone()) {
                Ok(()) => {
                    ledger.push_back(item);
                    let produced = self.produced.fetch_add(1, Ordering::SeqCst) + 1;
                    break (ledger.len(), produced, self.consumed.load(Ordering::SeqCst));
                }
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    return Err(BufferError::Disconnected { op: BufferOp::Put });
                }
            }
            drop(ledger);
            self.wait_ready(BufferOp::Put, &token)?;
        };

        self.publisher.publish(BufferOp::Put, size, self.capacity, produced, consumed);
        Ok(())
    }

    fn take(&self) -> Result<T, BufferError> {
        let token = InterruptToken::current();
        if token.is_interrupted() {
            return Err(BufferError::InterruptedWait { op: BufferOp::Take });
        }

        let (item, size, produced, consumed) = loop {
            let mut ledger = self.ledger()?;
            match self.rx.try_recv() {
                Ok(item) => {
                    ledger.pop_front();
                    let consumed = self.consumed.fetch_add(1, Ordering::SeqCst) + 1;
                    break (item, ledger.len(), self.produced.load(Ordering::SeqCst), consumed);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(BufferError::Disconnected { op: BufferOp::Take });
                }
            }
            drop(ledger);
            self.wait_ready(BufferOp::Take, &token)?;
        };

        self.publisher.publish(BufferOp::Take, size, self.capacity, produced, consumed);
        Ok(item)
    }

    fn snapshot_contents(&self) -> Vec<T> {
        self.ledger_for_read().iter().cloned().collect()
    }

    fn size(&self) -> usize {
        self.ledger_for_read().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn produced_count(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    fn consumed_count(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    fn id(&self) -> BufferId {
        self.publisher.id()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;

    fn buffer(capacity: usize) -> ChannelBuffer<i64> {
        ChannelBuffer::new(capacity, "queue", Arc::new(NotificationBus::new())).unwrap()
    }

    #[test]
    fn test_fifo_and_counters() {
        let buf = buffer(4);
        for v in [10, 20, 30] {
            buf.put(v).unwrap();
        }
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.take().unwrap(), 10);
        assert_eq!(buf.take().unwrap(), 20);
        assert_eq!(buf.produced_count(), 3);
        assert_eq!(buf.consumed_count(), 2);
        assert_eq!(buf.size(), 1);
    }

    #[test]
    fn test_snapshot_tracks_ledger_order() {
        let buf = buffer(4);
        buf.put(1).unwrap();
        buf.put(2).unwrap();
        buf.put(3).unwrap();
        buf.take().unwrap();
        assert_eq!(buf.snapshot_contents(), vec![2, 3]);
        assert_eq!(buf.ledger.lock().unwrap().len(), 2);
        assert_eq!(buf.rx.len(), 2);
    }

    #[test]
    fn test_blocked_put_interrupted_mid_wait_keeps_ledger_in_step() {
        let buf = Arc::new(buffer(1));
        buf.put(1).unwrap();

        let worker_buf = Arc::clone(&buf);
        let worker = crate::interrupt::spawn_worker("channel-blocked-put", move || worker_buf.put(2)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        worker.interrupt();

        assert!(worker.join().unwrap().unwrap_err().is_interrupted());
        assert_eq!(buf.snapshot_contents(), vec![1]);
        assert_eq!(buf.rx.len(), 1);
        assert_eq!(buf.take().unwrap(), 1);
        assert!(buf.snapshot_contents().is_empty());
        assert!(buf.rx.is_empty());
    }

    #[test]
    fn test_interrupted_put_leaves_ledger_clean() {
        let buf = Arc::new(buffer(1));
        buf.put(1).unwrap();

        let worker_buf = Arc::clone(&buf);
        let worker = crate::interrupt::spawn_worker("channel-put", move || {
            InterruptToken::current().interrupt();
            let err = worker_buf.put(2).unwrap_err();
            (err, InterruptToken::current().is_interrupted())
        })
        .unwrap();
        let (err, still_set) = worker.join().unwrap();

        assert!(err.is_interrupted());
        assert!(still_set);
        assert_eq!(buf.snapshot_contents(), vec![1]);
        assert_eq!(buf.produced_count(), 1);
        assert_eq!(buf.ledger.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_publishes_each_mutation() {
        let bus = Arc::new(NotificationBus::new());
        let buf = ChannelBuffer::new(2, "q", Arc::clone(&bus)).unwrap();
        buf.put(7_i64).unwrap();
        buf.take().unwrap();
        let log = bus.event_log();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|e| e.concern == "q" && e.subject_kind == "ChannelBuffer"));
    }
}
