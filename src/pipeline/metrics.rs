// src/pipeline/metrics.rs
//
// Per-process observability for the scene pipeline. Counters are shared
// atomics so consumers can hold a clone and read without touching the
// pipeline itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SceneMetrics {
    pub frames_processed: Arc<AtomicU64>,
    /// Source frames skipped in favor of recency (frame-id gaps).
    pub frames_dropped: Arc<AtomicU64>,
    pub detections_accepted: Arc<AtomicU64>,
    /// Malformed + below-floor + over-cap + unparseable, from ingest.
    pub detections_rejected: Arc<AtomicU64>,
    pub tracks_spawned: Arc<AtomicU64>,
    pub tracks_lost: Arc<AtomicU64>,
    pub duplicate_pairs: Arc<AtomicU64>,
    pub relationships_established: Arc<AtomicU64>,
    pub relationships_retracted: Arc<AtomicU64>,
    pub track_time_us: Arc<AtomicU64>,
    pub infer_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for SceneMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            detections_accepted: Arc::new(AtomicU64::new(0)),
            detections_rejected: Arc::new(AtomicU64::new(0)),
            tracks_spawned: Arc::new(AtomicU64::new(0)),
            tracks_lost: Arc::new(AtomicU64::new(0)),
            duplicate_pairs: Arc::new(AtomicU64::new(0)),
            relationships_established: Arc::new(AtomicU64::new(0)),
            relationships_retracted: Arc::new(AtomicU64::new(0)),
            track_time_us: Arc::new(AtomicU64::new(0)),
            infer_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set(&self, counter: &AtomicU64, value: u64) {
        counter.store(value, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            fps: self.fps(),
            detections_accepted: self.detections_accepted.load(Ordering::Relaxed),
            detections_rejected: self.detections_rejected.load(Ordering::Relaxed),
            tracks_spawned: self.tracks_spawned.load(Ordering::Relaxed),
            tracks_lost: self.tracks_lost.load(Ordering::Relaxed),
            duplicate_pairs: self.duplicate_pairs.load(Ordering::Relaxed),
            relationships_established: self.relationships_established.load(Ordering::Relaxed),
            relationships_retracted: self.relationships_retracted.load(Ordering::Relaxed),
            last_track_time_us: self.track_time_us.load(Ordering::Relaxed),
            last_infer_time_us: self.infer_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub fps: f64,
    pub detections_accepted: u64,
    pub detections_rejected: u64,
    pub tracks_spawned: u64,
    pub tracks_lost: u64,
    pub duplicate_pairs: u64,
    pub relationships_established: u64,
    pub relationships_retracted: u64,
    pub last_track_time_us: u64,
    pub last_infer_time_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = SceneMetrics::new();
        let held = metrics.clone();
        metrics.inc(&metrics.frames_processed);
        metrics.add(&metrics.detections_accepted, 3);
        assert_eq!(held.frames_processed.load(Ordering::Relaxed), 1);
        assert_eq!(held.summary().detections_accepted, 3);
    }
}
