use std::sync::{Arc, Mutex, MutexGuard};

use super::snapshot::Snapshot;

/// Append-only, insertion-ordered collection of [`Snapshot`]s.
#[derive(Debug)]
pub struct SnapshotStore<T> {
    snapshots: Mutex<Vec<Arc<Snapshot<T>>>>,
}

impl<T> SnapshotStore<T> {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Snapshot<T>>>> {
        // Appends are single pushes; a poisoned guard still holds a valid Vec.
        match self.snapshots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Capture `buffer_contents` and `destination_contents` under `tag`.
    pub fn save_snapshot(
        &self,
        tag: impl Into<String>,
        buffer_contents: Vec<T>,
        destination_contents: Vec<T>,
    ) -> Arc<Snapshot<T>> {
        let snapshot = Arc::new(Snapshot::new(tag.into(), buffer_contents, destination_contents));
        self.lock().push(Arc::clone(&snapshot));
        tracing::trace!(tag = snapshot.tag(), "snapshot saved");
        snapshot
    }

    /// All snapshots in creation order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Arc<Snapshot<T>>> {
        self.lock().clone()
    }

    /// All snapshots in creation order, for replaying a run's history.
    #[must_use]
    pub fn replay(&self) -> Vec<Arc<Snapshot<T>>> {
        self.snapshots()
    }

    /// Most recent snapshot carrying `tag`.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<Arc<Snapshot<T>>> {
        self.lock().iter().rev().find(|s| s.tag() == tag).cloned()
    }

    /// Number of snapshots captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
