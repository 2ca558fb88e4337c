// src/tracker.rs
//
// IoU-based multi-object tracker. Assigns persistent identities to
// per-frame detections, absorbs detector flicker through a miss counter,
// and smooths box geometry for the relationship engine downstream.
//
// Design:
//   - Greedy IoU matching, same-label pairs only (sufficient for <50
//     objects per frame; a full optimal assignment would only help under
//     heavy occlusion)
//   - Ties on IoU resolve toward the older track (lower id)
//   - Tracks survive miss_threshold consecutive missed frames before
//     eviction, so a single dropped detection never kills an identity
//   - Bounded box history per track feeds the velocity estimate

use crate::types::{BoundingBox, Detection, TrackId, TrackerConfig};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// One historical observation of a track's geometry.
#[derive(Debug, Clone, Copy)]
pub struct BoxObservation {
    pub bbox: BoundingBox,
    pub timestamp_ms: f64,
}

/// A persistent scene object. Owned by the tracker; snapshots carry clones.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: TrackId,
    /// Majority vote over the recent label ring. With same-label matching
    /// this is stable by construction, but the vote keeps the field honest
    /// if the matching policy is ever loosened.
    pub label: String,
    /// Exponentially smoothed toward each matched detection.
    pub bbox: BoundingBox,
    /// Exponentially smoothed detection confidence.
    pub confidence: f32,
    pub last_seen_ms: f64,
    pub consecutive_misses: u32,
    history: VecDeque<BoxObservation>,
    label_votes: VecDeque<String>,
}

impl TrackedObject {
    fn new(id: TrackId, det: &Detection, history_len: usize) -> Self {
        let mut history = VecDeque::with_capacity(history_len);
        history.push_back(BoxObservation {
            bbox: det.bbox,
            timestamp_ms: det.timestamp_ms,
        });
        let mut label_votes = VecDeque::with_capacity(history_len);
        label_votes.push_back(det.label.clone());
        Self {
            id,
            label: det.label.clone(),
            bbox: det.bbox,
            confidence: det.confidence,
            last_seen_ms: det.timestamp_ms,
            consecutive_misses: 0,
            history,
            label_votes,
        }
    }

    /// Hand-built track for crate-internal tests that need exact geometry
    /// without driving the matching pipeline.
    #[cfg(test)]
    pub(crate) fn for_tests(id: TrackId, label: &str, bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(
            id,
            &Detection {
                label: label.to_string(),
                confidence,
                bbox,
                timestamp_ms: 0.0,
            },
            10,
        )
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    /// Estimated center velocity in normalized units per second, from the
    /// ends of the history window. Zero until two observations exist.
    pub fn velocity(&self) -> (f32, f32) {
        if self.history.len() < 2 {
            return (0.0, 0.0);
        }
        let first = self.history.front().expect("len checked");
        let last = self.history.back().expect("len checked");
        let dt = (last.timestamp_ms - first.timestamp_ms) / 1000.0;
        if dt < 0.01 {
            return (0.0, 0.0);
        }
        let (fx, fy) = first.bbox.center();
        let (lx, ly) = last.bbox.center();
        ((lx - fx) / dt as f32, (ly - fy) / dt as f32)
    }

    pub fn history(&self) -> impl Iterator<Item = &BoxObservation> {
        self.history.iter()
    }

    fn update_with_detection(&mut self, det: &Detection, alpha: f32, history_len: usize) {
        self.bbox = BoundingBox::new(
            alpha * det.bbox.x_min + (1.0 - alpha) * self.bbox.x_min,
            alpha * det.bbox.y_min + (1.0 - alpha) * self.bbox.y_min,
            alpha * det.bbox.x_max + (1.0 - alpha) * self.bbox.x_max,
            alpha * det.bbox.y_max + (1.0 - alpha) * self.bbox.y_max,
        );
        self.confidence = alpha * det.confidence + (1.0 - alpha) * self.confidence;
        self.last_seen_ms = det.timestamp_ms;
        self.consecutive_misses = 0;

        self.history.push_back(BoxObservation {
            bbox: self.bbox,
            timestamp_ms: det.timestamp_ms,
        });
        while self.history.len() > history_len {
            self.history.pop_front();
        }

        self.label_votes.push_back(det.label.clone());
        while self.label_votes.len() > history_len {
            self.label_votes.pop_front();
        }
        self.label = self.majority_label();
    }

    fn mark_missed(&mut self) {
        self.consecutive_misses += 1;
    }

    /// Most common label in the vote ring (first seen wins a tie).
    fn majority_label(&self) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for vote in &self.label_votes {
            *counts.entry(vote.as_str()).or_insert(0) += 1;
        }
        let mut best: Option<(&str, usize)> = None;
        for vote in &self.label_votes {
            let count = counts[vote.as_str()];
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((vote.as_str(), count)),
            }
        }
        best.map(|(label, _)| label.to_string())
            .unwrap_or_else(|| self.label.clone())
    }
}

/// Lifecycle notifications collected during `update`, drained by the
/// pipeline for its event bus. Eviction is a normal event, not an error.
#[derive(Debug, Clone)]
pub enum TrackLifecycle {
    Spawned {
        id: TrackId,
        label: String,
    },
    Lost {
        id: TrackId,
        label: String,
        misses: u32,
    },
}

pub struct SceneTracker {
    config: TrackerConfig,
    tracks: Vec<TrackedObject>,
    next_id: TrackId,
    duplicate_pairs: u64,
    lifecycle: Vec<TrackLifecycle>,
}

impl SceneTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
            duplicate_pairs: 0,
            lifecycle: Vec::new(),
        }
    }

    /// Process one frame of filtered detections. Returns the updated active
    /// set by value; callers never mutate tracker state directly.
    ///
    /// An empty detection set simply ages every track through the miss path.
    pub fn update(&mut self, detections: &[Detection], timestamp_ms: f64) -> Vec<TrackedObject> {
        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; detections.len()];

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if det.label != track.label {
                    continue;
                }
                let score = track.bbox.iou(&det.bbox);
                if score >= self.config.iou_match_threshold {
                    pairs.push((ti, di, score));
                }
            }
        }

        // Highest IoU first; equal scores go to the lower track id.
        pairs.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.tracks[a.0].id.cmp(&self.tracks[b.0].id))
                .then_with(|| a.1.cmp(&b.1))
        });

        for (ti, di, _score) in &pairs {
            if matched_tracks[*ti] || matched_dets[*di] {
                continue;
            }
            matched_tracks[*ti] = true;
            matched_dets[*di] = true;
            self.tracks[*ti].update_with_detection(
                &detections[*di],
                self.config.smoothing_alpha,
                self.config.history_len,
            );
        }

        for (ti, matched) in matched_tracks.iter().enumerate() {
            if !matched {
                self.tracks[ti].mark_missed();
            }
        }

        let miss_threshold = self.config.miss_threshold;
        let lifecycle = &mut self.lifecycle;
        self.tracks.retain(|t| {
            if t.consecutive_misses > miss_threshold {
                info!(
                    "Track {} ({}) lost after {} missed frames",
                    t.id, t.label, t.consecutive_misses
                );
                lifecycle.push(TrackLifecycle::Lost {
                    id: t.id,
                    label: t.label.clone(),
                    misses: t.consecutive_misses,
                });
                return false;
            }
            true
        });

        for (di, matched) in matched_dets.iter().enumerate() {
            if !matched {
                let det = &detections[di];
                let track = TrackedObject::new(self.next_id, det, self.config.history_len);
                info!(
                    "New track {} spawned: {} at ({:.2},{:.2})",
                    track.id,
                    track.label,
                    track.center().0,
                    track.center().1
                );
                self.lifecycle.push(TrackLifecycle::Spawned {
                    id: track.id,
                    label: track.label.clone(),
                });
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        self.scan_duplicates(timestamp_ms);

        self.tracks.clone()
    }

    /// Same-label track pairs whose boxes all but coincide are two detector
    /// hits on one physical object. Flagged here as a diagnostic; the
    /// relationship engine excludes such pairs independently.
    fn scan_duplicates(&mut self, timestamp_ms: f64) {
        for i in 0..self.tracks.len() {
            for j in (i + 1)..self.tracks.len() {
                let (a, b) = (&self.tracks[i], &self.tracks[j]);
                if a.label != b.label {
                    continue;
                }
                let overlap = a.bbox.iou(&b.bbox);
                if overlap > self.config.duplicate_iou {
                    self.duplicate_pairs += 1;
                    debug!(
                        "Duplicate detection pair at t={:.0}ms: tracks {} and {} ({}) IoU {:.2}",
                        timestamp_ms, a.id, b.id, a.label, overlap
                    );
                }
            }
        }
    }

    pub fn drain_lifecycle(&mut self) -> Vec<TrackLifecycle> {
        std::mem::take(&mut self.lifecycle)
    }

    /// Total duplicate same-label pairs observed since startup.
    pub fn duplicate_pairs(&self) -> u64 {
        self.duplicate_pairs
    }

    pub fn active_tracks(&self) -> &[TrackedObject] {
        &self.tracks
    }

    pub fn get_track(&self, id: TrackId) -> Option<&TrackedObject> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.lifecycle.clear();
        // next_id deliberately keeps counting: ids are never reused.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: 0.8,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            timestamp_ms: 0.0,
        }
    }

    fn det_at(label: &str, x1: f32, y1: f32, x2: f32, y2: f32, ts: f64) -> Detection {
        Detection {
            timestamp_ms: ts,
            ..det(label, x1, y1, x2, y2)
        }
    }

    #[test]
    fn test_track_persists_under_smooth_motion() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        let mut id = None;
        // Slide right by 0.02 per frame; IoU with the previous box stays
        // well above the match threshold.
        for i in 0..20 {
            let x = 0.1 + i as f32 * 0.02;
            let tracks = tracker.update(&[det("cup", x, 0.4, x + 0.2, 0.6)], i as f64 * 33.3);
            assert_eq!(tracks.len(), 1);
            match id {
                None => id = Some(tracks[0].id),
                Some(expected) => assert_eq!(tracks[0].id, expected),
            }
        }
    }

    #[test]
    fn test_eviction_exactly_after_miss_threshold() {
        let config = TrackerConfig::default();
        let threshold = config.miss_threshold;
        let mut tracker = SceneTracker::new(config);
        tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 0.0);

        // Exactly `threshold` missed frames: still alive.
        for i in 0..threshold {
            let tracks = tracker.update(&[], (i + 1) as f64 * 33.3);
            assert_eq!(tracks.len(), 1, "must survive miss {}", i + 1);
        }
        // The frame immediately after: evicted.
        let tracks = tracker.update(&[], (threshold + 1) as f64 * 33.3);
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_single_missed_frame_never_evicts() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 0.0);
        tracker.update(&[], 33.3);
        let tracks = tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 66.6);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].consecutive_misses, 0);
    }

    #[test]
    fn test_labels_never_match_across_classes() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 0.0);
        // Same geometry, different label: spawns a second track.
        let tracks = tracker.update(&[det("bowl", 0.4, 0.4, 0.6, 0.6)], 33.3);
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_iou_tie_goes_to_lower_track_id() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        // Two co-located same-label tracks (detector double-fire).
        let tracks = tracker.update(
            &[
                det("cup", 0.4, 0.4, 0.6, 0.6),
                det("cup", 0.4, 0.4, 0.6, 0.6),
            ],
            0.0,
        );
        assert_eq!(tracks.len(), 2);
        let low_id = tracks.iter().map(|t| t.id).min().unwrap();

        // One detection matching both tracks with identical IoU.
        let tracks = tracker.update(&[det_at("cup", 0.4, 0.4, 0.6, 0.6, 33.3)], 33.3);
        let winner = tracks.iter().find(|t| t.consecutive_misses == 0).unwrap();
        assert_eq!(winner.id, low_id);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let config = TrackerConfig::default();
        let threshold = config.miss_threshold;
        let mut tracker = SceneTracker::new(config);
        let first = tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 0.0)[0].id;
        for i in 0..=threshold {
            tracker.update(&[], (i + 1) as f64 * 33.3);
        }
        assert!(tracker.active_tracks().is_empty());

        let second = tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 999.0)[0].id;
        assert!(second > first);
    }

    #[test]
    fn test_box_smoothing_blends_toward_detection() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        tracker.update(&[det("cup", 0.0, 0.0, 0.2, 0.2)], 0.0);
        let tracks = tracker.update(&[det_at("cup", 0.1, 0.0, 0.3, 0.2, 33.3)], 33.3);
        // alpha 0.6 toward the new box: 0.6*0.1 + 0.4*0.0
        assert!((tracks[0].bbox.x_min - 0.06).abs() < 1e-6);
        assert!((tracks[0].bbox.x_max - 0.26).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_from_history() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        // 0.03 units right per 33.3ms frame is ~0.9 units/s, minus the EMA
        // lag on the smoothed centers.
        for i in 0..10 {
            let x = 0.1 + i as f32 * 0.03;
            tracker.update(&[det_at("cup", x, 0.4, x + 0.2, 0.6, i as f64 * 33.3)], i as f64 * 33.3);
        }
        let (vx, vy) = tracker.active_tracks()[0].velocity();
        assert!(vx > 0.5, "expected rightward velocity, got {}", vx);
        assert!(vy.abs() < 0.05);
    }

    #[test]
    fn test_duplicate_pair_diagnostic_increments() {
        let mut tracker = SceneTracker::new(TrackerConfig::default());
        tracker.update(
            &[
                det("cup", 0.40, 0.40, 0.60, 0.60),
                det("cup", 0.401, 0.401, 0.601, 0.601),
            ],
            0.0,
        );
        assert_eq!(tracker.duplicate_pairs(), 1);
    }

    #[test]
    fn test_lifecycle_events_drained() {
        let config = TrackerConfig::default();
        let threshold = config.miss_threshold;
        let mut tracker = SceneTracker::new(config);
        tracker.update(&[det("cup", 0.4, 0.4, 0.6, 0.6)], 0.0);
        let events = tracker.drain_lifecycle();
        assert!(matches!(events.as_slice(), [TrackLifecycle::Spawned { .. }]));

        for i in 0..=threshold {
            tracker.update(&[], (i + 1) as f64 * 33.3);
        }
        let events = tracker.drain_lifecycle();
        assert!(events
            .iter()
            .any(|e| matches!(e, TrackLifecycle::Lost { .. })));
        assert!(tracker.drain_lifecycle().is_empty());
    }
}
