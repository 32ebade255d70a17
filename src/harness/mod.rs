//! Producer/consumer orchestration over a shared buffer.
//!
//! A run partitions a static input across producer threads, lets consumer
//! threads drain the buffer into a shared destination, and shuts consumers
//! down with one sentinel each once every producer has finished. The consumer
//! count is fixed before the sentinels are sent.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

use crate::buffer::{self, BoundedBuffer, BufferChange, Strategy};
use crate::bus::{console_observer, NotificationBus};
use crate::config::{HarnessConfig, VerboseFlag};
use crate::error::{BufferError, PcResult};
use crate::interrupt::{spawn_worker, Worker};
use crate::memento::SnapshotStore;

/// Thread-safe append-only sink consumers write into.
#[derive(Debug)]
pub struct Destination<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Clone> Destination<T> {
    /// Create an empty destination.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append one item.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Copy of the current contents, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().clone()
    }

    /// Number of items appended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> Default for Destination<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Producer,
    Consumer,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// How a worker loop ended. `items` counts successful puts or consumed
/// non-sentinel takes.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Completed { items: usize },
    Interrupted { items: usize },
    Failed { items: usize, error: String },
}

impl WorkerOutcome {
    /// Items handled before the loop ended.
    #[must_use]
    pub const fn items(&self) -> usize {
        match self {
            Self::Completed { items } | Self::Interrupted { items } | Self::Failed { items, .. } => *items,
        }
    }

    fn from_error(items: usize, err: &BufferError) -> Self {
        if err.is_interrupted() {
            Self::Interrupted { items }
        } else {
            Self::Failed {
                items,
                error: err.to_string(),
            }
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub name: String,
    pub role: WorkerRole,
    pub outcome: WorkerOutcome,
}

/// Result of a completed run.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub capacity: usize,
    pub destination: Vec<i64>,
    pub produced: u64,
    pub consumed: u64,
    pub final_size: usize,
    pub workers: Vec<WorkerReport>,
    pub observer_failures: u64,
    pub elapsed_ms: u64,
}

/// Split `source` round-robin into `parts` lists: item `i` goes to `i % parts`.
///
/// Returns no lists when `parts` is zero.
#[must_use]
pub fn partition<T: Clone>(source: &[T], parts: usize) -> Vec<Vec<T>> {
    let mut out: Vec<Vec<T>> = (0..parts).map(|_| Vec::new()).collect();
    if parts == 0 {
        return out;
    }
    for (i, item) in source.iter().enumerate() {
        out[i % parts].push(item.clone());
    }
    out
}

/// Put every item, stopping at the first failure.
pub fn produce<T, I>(buffer: &dyn BoundedBuffer<T>, items: I) -> WorkerOutcome
where
    I: IntoIterator<Item = T>,
{
    let mut done = 0;
    for item in items {
        if let Err(err) = buffer.put(item) {
            tracing::warn!(items = done, error = %err, "producer stopped");
            return WorkerOutcome::from_error(done, &err);
        }
        done += 1;
    }
    WorkerOutcome::Completed { items: done }
}

/// Take until `sentinel` arrives, appending everything else to `destination`.
///
/// With `tracer` set, captures a snapshot after every appended item.
pub fn consume<T>(
    buffer: &dyn BoundedBuffer<T>,
    destination: &Destination<T>,
    sentinel: &T,
    tracer: Option<&SnapshotStore<T>>,
) -> WorkerOutcome
where
    T: Clone + PartialEq,
{
    let mut done = 0;
    loop {
        let item = match buffer.take() {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(items = done, error = %err, "consumer stopped");
                return WorkerOutcome::from_error(done, &err);
            }
        };
        if item == *sentinel {
            return WorkerOutcome::Completed { items: done };
        }
        destination.push(item);
        done += 1;

        if let Some(store) = tracer {
            let tag = format!("{}:{done}", std::thread::current().name().unwrap_or("consumer"));
            store.save_snapshot(tag, buffer.snapshot_contents(), destination.snapshot());
        }
    }
}

/// Execute one full run described by `config`.
///
/// Saves a `"start"` snapshot before any worker starts and an `"end"` snapshot
/// after every worker has been joined.
///
/// # Errors
/// Fails on invalid configuration, when a worker cannot be spawned or panics,
/// or when the calling thread is interrupted while pushing sentinels.
pub fn run(
    config: &HarnessConfig,
    bus: &Arc<NotificationBus>,
    store: &Arc<SnapshotStore<i64>>,
) -> PcResult<RunReport> {
    config.validate()?;
    let started = Instant::now();

    let buffer: Arc<dyn BoundedBuffer<i64>> = buffer::build(&config.buffer, Arc::clone(bus))?;
    tracing::info!(
        strategy = %config.buffer.strategy,
        capacity = config.buffer.capacity,
        producers = config.producers,
        consumers = config.consumers,
        "run starting"
    );

    let verbose = VerboseFlag::new(config.verbose);
    let console = config
        .verbose
        .then(|| bus.add_observer(config.buffer.concern.clone(), console_observer(verbose)));

    let destination = Arc::new(Destination::new());
    store.save_snapshot("start", buffer.snapshot_contents(), destination.snapshot());

    let outcome = drive(config, &buffer, &destination, store);

    if let Some(id) = console {
        bus.remove_observer(&config.buffer.concern, id);
    }
    let workers = outcome?;

    store.save_snapshot("end", buffer.snapshot_contents(), destination.snapshot());

    let report = RunReport {
        strategy: buffer.strategy(),
        capacity: buffer.capacity(),
        destination: destination.snapshot(),
        produced: buffer.produced_count(),
        consumed: buffer.consumed_count(),
        final_size: buffer.size(),
        workers,
        observer_failures: bus.observer_failures(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        consumed_items = report.destination.len(),
        elapsed_ms = report.elapsed_ms,
        "run finished"
    );
    Ok(report)
}

/// Spawn, feed and join every worker.
///
/// Any early return interrupts every worker not yet joined, so none is left
/// blocked on a buffer nobody will touch again.
fn drive(
    config: &HarnessConfig,
    buffer: &Arc<dyn BoundedBuffer<i64>>,
    destination: &Arc<Destination<i64>>,
    store: &Arc<SnapshotStore<i64>>,
) -> PcResult<Vec<WorkerReport>> {
    let mut consumers: Vec<Worker<WorkerOutcome>> = Vec::with_capacity(config.consumers);
    for idx in 0..config.consumers {
        let buffer = Arc::clone(buffer);
        let destination = Arc::clone(destination);
        let tracer = config.trace_snapshots.then(|| Arc::clone(store));
        let sentinel = config.sentinel;
        let spawned = spawn_worker(format!("pcbuf-consumer-{idx}"), move || {
            consume(buffer.as_ref(), &destination, &sentinel, tracer.as_deref())
        });
        match spawned {
            Ok(worker) => consumers.push(worker),
            Err(err) => {
                interrupt_all(&consumers);
                return Err(err);
            }
        }
    }

    let mut producers: Vec<Worker<WorkerOutcome>> = Vec::with_capacity(config.producers);
    for (idx, part) in partition(&config.source, config.producers).into_iter().enumerate() {
        let buffer = Arc::clone(buffer);
        let spawned = spawn_worker(format!("pcbuf-producer-{idx}"), move || produce(buffer.as_ref(), part));
        match spawned {
            Ok(worker) => producers.push(worker),
            Err(err) => {
                interrupt_all(&producers);
                interrupt_all(&consumers);
                return Err(err);
            }
        }
    }

    let mut workers = Vec::with_capacity(config.producers + config.consumers);
    let mut pending = producers.into_iter();
    while let Some(worker) = pending.next() {
        match join_report(worker, WorkerRole::Producer) {
            Ok(report) => workers.push(report),
            Err(err) => {
                interrupt_all(&pending.collect::<Vec<_>>());
                interrupt_all(&consumers);
                return Err(err);
            }
        }
    }

    tracing::debug!(count = config.consumers, sentinel = config.sentinel, "sending sentinels");
    for _ in 0..config.consumers {
        if let Err(err) = buffer.put(config.sentinel) {
            interrupt_all(&consumers);
            return Err(err.into());
        }
    }

    let mut pending = consumers.into_iter();
    while let Some(worker) = pending.next() {
        match join_report(worker, WorkerRole::Consumer) {
            Ok(report) => workers.push(report),
            Err(err) => {
                // A failed consumer leaves its sentinel for one of the others.
                interrupt_all(&pending.collect::<Vec<_>>());
                return Err(err);
            }
        }
    }
    Ok(workers)
}

fn interrupt_all<R>(workers: &[Worker<R>]) {
    for worker in workers {
        worker.interrupt();
    }
}

fn join_report(worker: Worker<WorkerOutcome>, role: WorkerRole) -> PcResult<WorkerReport> {
    let name = worker.name().to_string();
    let outcome = worker.join()?;
    tracing::debug!(worker = %name, %role, items = outcome.items(), "worker joined");
    Ok(WorkerReport { name, role, outcome })
}

/// Listener that keeps `BufferChange` payloads, for inspecting runs in tests
/// and tools.
#[must_use]
pub fn recording_observer(
    sink: Arc<Mutex<Vec<BufferChange>>>,
) -> impl Fn(&str, &BufferChange) -> Result<(), crate::error::ObserverError> + Send + Sync {
    move |_, change| {
        sink.lock()
            .map_err(|_| crate::error::ObserverError::failed("recording sink poisoned"))?
            .push(change.clone());
        Ok(())
    }
}
