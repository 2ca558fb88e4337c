// src/scene.rs
//
// Authoritative snapshot of the scene. One writer (the pipeline) publishes
// complete, immutable snapshots; any number of readers fetch the latest
// without blocking the writer. A reader can never observe tracks and
// relationships from different inference cycles: the lock guards only the
// Arc swap, never a partially built value.

use crate::relations::Relationship;
use crate::tracker::TrackedObject;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Immutable, versioned view of all tracked objects and their stable
/// relationships.
#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    /// Monotonically increasing publish counter.
    pub version: u64,
    pub timestamp_ms: f64,
    pub tracks: Vec<TrackedObject>,
    pub relationships: Vec<Relationship>,
}

impl SceneSnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            timestamp_ms: 0.0,
            tracks: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

pub struct SceneModel {
    current: RwLock<Arc<SceneSnapshot>>,
    version: AtomicU64,
}

impl Default for SceneModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneModel {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(SceneSnapshot::empty())),
            version: AtomicU64::new(0),
        }
    }

    /// Atomically replace the published snapshot. Single-writer: only the
    /// pipeline calls this, once per frame.
    pub fn publish(
        &self,
        tracks: Vec<TrackedObject>,
        relationships: Vec<Relationship>,
        timestamp_ms: f64,
    ) -> Arc<SceneSnapshot> {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(SceneSnapshot {
            version,
            timestamp_ms,
            tracks,
            relationships,
        });
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::clone(&snapshot);
        snapshot
    }

    /// Latest complete snapshot. Non-blocking in practice: the write lock is
    /// only ever held for the pointer swap above.
    pub fn current(&self) -> Arc<SceneSnapshot> {
        let slot = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&slot)
    }
}
