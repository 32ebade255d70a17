use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pcbuf::harness::{consume, produce, Destination};
use pcbuf::{
    buffer, spawn_worker, BoundedBuffer, BufferConfig, BufferState, NotificationBus, ObserverError, Strategy,
    WorkerOutcome,
};

const STRATEGIES: [Strategy; 2] = [Strategy::Channel, Strategy::Monitor];

fn make(strategy: Strategy, capacity: usize) -> (Arc<dyn BoundedBuffer<i64>>, Arc<NotificationBus>) {
    let bus = Arc::new(NotificationBus::new());
    let cfg = BufferConfig {
        strategy,
        capacity,
        ..BufferConfig::default()
    };
    (buffer::build(&cfg, Arc::clone(&bus)).unwrap(), bus)
}

#[test]
fn single_producer_single_consumer_small_capacity() {
    for strategy in STRATEGIES {
        let (buf, _bus) = make(strategy, 2);
        let destination = Arc::new(Destination::new());

        let c_buf = Arc::clone(&buf);
        let c_dest = Arc::clone(&destination);
        let consumer = spawn_worker("consumer", move || consume(c_buf.as_ref(), &c_dest, &-1, None)).unwrap();

        let p_buf = Arc::clone(&buf);
        let producer = spawn_worker("producer", move || produce(p_buf.as_ref(), vec![1, 2, 3, 4, 5])).unwrap();

        assert_eq!(producer.join().unwrap(), WorkerOutcome::Completed { items: 5 });
        buf.put(-1).unwrap();
        assert_eq!(consumer.join().unwrap(), WorkerOutcome::Completed { items: 5 });

        let got: HashSet<i64> = destination.snapshot().into_iter().collect();
        assert_eq!(got, (1..=5).collect::<HashSet<_>>(), "{strategy}");
        // Single producer, single consumer: FIFO is observable end to end.
        assert_eq!(destination.snapshot(), vec![1, 2, 3, 4, 5], "{strategy}");
    }
}

#[test]
fn capacity_one_second_put_blocks_until_take() {
    for strategy in STRATEGIES {
        let (buf, _bus) = make(strategy, 1);

        let p_buf = Arc::clone(&buf);
        let producer = spawn_worker("producer", move || {
            p_buf.put(1).unwrap();
            let before_second = Instant::now();
            p_buf.put(2).unwrap();
            before_second.elapsed()
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(buf.size(), 1, "{strategy}: second put must still be blocked");
        assert_eq!(buf.state(), BufferState::Full);
        assert_eq!(buf.produced_count(), 1);

        let start = Instant::now();
        assert_eq!(buf.take().unwrap(), 1);
        let blocked_for = producer.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2), "{strategy}");
        assert!(blocked_for >= Duration::from_millis(50), "{strategy}: blocked {blocked_for:?}");
        assert_eq!(buf.take().unwrap(), 2);
        assert_eq!(buf.produced_count(), 2);
        assert_eq!(buf.consumed_count(), 2);
    }
}

#[test]
fn take_on_empty_blocks_until_put() {
    for strategy in STRATEGIES {
        let (buf, _bus) = make(strategy, 4);

        let c_buf = Arc::clone(&buf);
        let consumer = spawn_worker("consumer", move || {
            let start = Instant::now();
            let item = c_buf.take().unwrap();
            (item, start.elapsed())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(200));
        assert!(!consumer.is_finished(), "{strategy}: take returned without a put");
        buf.put(42).unwrap();

        let (item, waited) = consumer.join().unwrap();
        assert_eq!(item, 42);
        assert!(waited >= Duration::from_millis(200), "{strategy}: waited {waited:?}");
    }
}

#[test]
fn empty_buffer_consumer_stops_on_sentinel_with_nothing_consumed() {
    for strategy in STRATEGIES {
        let (buf, _bus) = make(strategy, 2);
        let destination = Arc::new(Destination::new());

        let c_buf = Arc::clone(&buf);
        let c_dest = Arc::clone(&destination);
        let consumer = spawn_worker("consumer", move || consume(c_buf.as_ref(), &c_dest, &-1, None)).unwrap();

        thread::sleep(Duration::from_millis(200));
        buf.put(-1).unwrap();

        assert_eq!(consumer.join().unwrap(), WorkerOutcome::Completed { items: 0 });
        assert!(destination.is_empty());
        assert_eq!(buf.size(), 0);
    }
}

#[test]
fn snapshot_contents_is_independent_copy() {
    for strategy in STRATEGIES {
        let (buf, _bus) = make(strategy, 4);
        buf.put(1).unwrap();
        buf.put(2).unwrap();

        let snap = buf.snapshot_contents();
        buf.take().unwrap();
        buf.put(3).unwrap();

        assert_eq!(snap, vec![1, 2], "{strategy}");
        assert_eq!(buf.snapshot_contents(), vec![2, 3], "{strategy}");
    }
}

#[test]
fn failing_observer_does_not_break_put_or_take() {
    for strategy in STRATEGIES {
        let (buf, bus) = make(strategy, 2);
        bus.add_observer("queue", |_, _| Err(ObserverError::failed("always")));
        bus.add_observer("queue", |_, _| panic!("observer bug"));

        buf.put(1).unwrap();
        buf.put(2).unwrap();
        assert_eq!(buf.take().unwrap(), 1);

        assert_eq!(bus.observer_failures(), 6, "{strategy}");
        assert_eq!(bus.event_log().len(), 3, "{strategy}");
    }
}

#[test]
fn published_changes_carry_counters_and_identity() {
    for strategy in STRATEGIES {
        let (buf, bus) = make(strategy, 3);
        let sink = Arc::new(Mutex::new(Vec::new()));
        bus.add_observer("queue", pcbuf::harness::recording_observer(Arc::clone(&sink)));

        buf.put(5).unwrap();
        buf.put(6).unwrap();
        buf.take().unwrap();

        let changes = sink.lock().unwrap().clone();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.buffer_id == buf.id() && c.strategy == strategy));
        let last = changes.last().unwrap();
        assert_eq!((last.produced, last.consumed, last.size, last.capacity), (2, 1, 1, 3));
        assert_eq!(bus.event_log()[0].subject_kind, strategy.subject_kind());
    }
}

#[test]
fn size_stays_within_capacity_under_contention() {
    for strategy in STRATEGIES {
        let capacity = 3;
        let (buf, bus) = make(strategy, capacity);
        let max_seen = Arc::new(AtomicU64::new(0));
        let m = Arc::clone(&max_seen);
        bus.add_observer("queue", move |_, change| {
            m.fetch_max(change.size as u64, Ordering::SeqCst);
            Ok(())
        });

        let mut producers = Vec::new();
        for p in 0..3_i64 {
            let b = Arc::clone(&buf);
            producers.push(spawn_worker(format!("p{p}"), move || produce(b.as_ref(), (0..200).map(|i| p * 1000 + i))).unwrap());
        }
        let mut consumers = Vec::new();
        for c in 0..2 {
            let b = Arc::clone(&buf);
            let d = Arc::new(Destination::new());
            consumers.push((
                spawn_worker(format!("c{c}"), {
                    let d = Arc::clone(&d);
                    move || consume(b.as_ref(), &d, &-1, None)
                })
                .unwrap(),
                d,
            ));
        }

        for _ in 0..20 {
            assert!(buf.size() <= capacity);
            thread::sleep(Duration::from_millis(1));
        }
        for p in producers {
            assert_eq!(p.join().unwrap(), WorkerOutcome::Completed { items: 200 });
        }
        for _ in 0..consumers.len() {
            buf.put(-1).unwrap();
        }
        let mut total = 0;
        for (worker, dest) in consumers {
            total += worker.join().unwrap().items();
            assert_eq!(dest.len(), dest.snapshot().len());
        }

        assert_eq!(total, 600);
        assert!(max_seen.load(Ordering::SeqCst) <= capacity as u64);
        // Quiescent: produced - consumed == size.
        assert_eq!(buf.produced_count() - buf.consumed_count(), buf.size() as u64);
        assert_eq!(buf.size(), 0);
    }
}

fn join_within<R>(worker: pcbuf::Worker<R>, limit: Duration) -> R {
    let deadline = Instant::now() + limit;
    while !worker.is_finished() {
        assert!(Instant::now() < deadline, "worker '{}' did not stop in {limit:?}", worker.name());
        thread::sleep(Duration::from_millis(5));
    }
    worker.join().unwrap()
}

#[test]
fn snapshot_never_exceeds_capacity_under_contention() {
    for strategy in STRATEGIES {
        let capacity = 1;
        let (buf, _bus) = make(strategy, capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let (b, s) = (Arc::clone(&buf), Arc::clone(&stop));
        let watcher = spawn_worker("watcher", move || {
            let mut worst = 0;
            while !s.load(Ordering::SeqCst) {
                worst = worst.max(b.snapshot_contents().len());
                worst = worst.max(b.size());
            }
            worst
        })
        .unwrap();

        let mut producers = Vec::new();
        for p in 0..2_i64 {
            let b = Arc::clone(&buf);
            producers.push(spawn_worker(format!("p{p}"), move || produce(b.as_ref(), (1..=20_000).map(|i| p * 100_000 + i))).unwrap());
        }
        let mut consumers = Vec::new();
        for c in 0..2 {
            let b = Arc::clone(&buf);
            let d = Arc::new(Destination::new());
            consumers.push(spawn_worker(format!("c{c}"), move || consume(b.as_ref(), &d, &-1, None)).unwrap());
        }

        for p in producers {
            assert_eq!(p.join().unwrap(), WorkerOutcome::Completed { items: 20_000 });
        }
        for _ in 0..consumers.len() {
            buf.put(-1).unwrap();
        }
        let total: usize = consumers.into_iter().map(|c| c.join().unwrap().items()).sum();
        stop.store(true, Ordering::SeqCst);

        assert_eq!(total, 40_000, "{strategy}");
        let worst = watcher.join().unwrap();
        assert!(worst <= capacity, "{strategy}: snapshot held {worst} items at capacity {capacity}");
    }
}

#[test]
fn observer_may_read_the_buffer_it_is_notified_by() {
    for strategy in STRATEGIES {
        let (buf, bus) = make(strategy, 2);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (weak, sink) = (Arc::downgrade(&buf), Arc::clone(&seen));
        bus.add_observer("queue", move |_, _| {
            if let Some(buf) = weak.upgrade() {
                sink.lock().unwrap().push((buf.size(), buf.snapshot_contents()));
            }
            Ok(())
        });

        let b = Arc::clone(&buf);
        let worker = spawn_worker("reentrant", move || {
            b.put(1).unwrap();
            b.take().unwrap()
        })
        .unwrap();

        assert_eq!(join_within(worker, Duration::from_secs(2)), 1, "{strategy}");
        assert_eq!(*seen.lock().unwrap(), vec![(1, vec![1]), (0, vec![])], "{strategy}");
        assert_eq!(bus.observer_failures(), 0);
    }
}
