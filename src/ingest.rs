// src/ingest.rs
//
// Normalizes raw detector output into canonical Detection records.
// Everything downstream of this boundary operates on typed, validated data.
// A malformed detection is dropped and counted, never propagated as an
// error that halts the pipeline.

use crate::types::{Detection, IngestConfig, RawDetection};
use serde_json::Value;
use tracing::{debug, warn};

/// Per-reason drop counters, exposed through the pipeline metrics summary.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct IngestStats {
    /// Failed geometric or confidence sanity checks.
    pub malformed: u64,
    /// Valid but below the confidence floor.
    pub below_floor: u64,
    /// Dropped by the per-frame object cap.
    pub over_cap: u64,
    /// Raw records that did not deserialize at all.
    pub unparseable: u64,
}

pub struct DetectionIngest {
    config: IngestConfig,
    stats: IngestStats,
}

impl DetectionIngest {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            stats: IngestStats::default(),
        }
    }

    /// Filter and normalize one frame of raw detections.
    pub fn ingest(&mut self, raw: &[RawDetection], timestamp_ms: f64) -> Vec<Detection> {
        let mut accepted: Vec<Detection> = Vec::with_capacity(raw.len());
        let mut malformed = 0u64;
        let mut below_floor = 0u64;

        for det in raw {
            if det.label.is_empty()
                || !det.confidence.is_finite()
                || !(0.0..=1.0).contains(&det.confidence)
            {
                malformed += 1;
                debug!(label = %det.label, confidence = det.confidence, "dropping malformed detection");
                continue;
            }

            let bbox = det.bounding_box().clamp_unit();
            if bbox.is_degenerate() {
                malformed += 1;
                debug!(label = %det.label, "dropping degenerate box");
                continue;
            }

            if det.confidence < self.config.confidence_floor {
                below_floor += 1;
                continue;
            }

            accepted.push(Detection {
                label: det.label.clone(),
                confidence: det.confidence,
                bbox,
                timestamp_ms,
            });
        }

        if malformed > 0 {
            warn!(
                "Dropped {} malformed detection(s) this frame ({} total)",
                malformed,
                self.stats.malformed + malformed
            );
        }
        self.stats.malformed += malformed;
        self.stats.below_floor += below_floor;

        if accepted.len() > self.config.max_objects {
            accepted.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            self.stats.over_cap += (accepted.len() - self.config.max_objects) as u64;
            accepted.truncate(self.config.max_objects);
        }

        accepted
    }

    /// Ingest straight from an untyped JSON array. Records that do not
    /// deserialize are counted and skipped; a non-array payload yields
    /// nothing.
    pub fn ingest_json(&mut self, payload: &Value, timestamp_ms: f64) -> Vec<Detection> {
        let items = match payload.as_array() {
            Some(items) => items,
            None => {
                warn!("Detector payload is not an array; ignoring frame");
                self.stats.unparseable += 1;
                return Vec::new();
            }
        };

        let mut raw: Vec<RawDetection> = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawDetection>(item.clone()) {
                Ok(det) => raw.push(det),
                Err(err) => {
                    self.stats.unparseable += 1;
                    debug!("Skipping unparseable detection record: {}", err);
                }
            }
        }

        self.ingest(&raw, timestamp_ms)
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(label: &str, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_confidence_floor_filters() {
        let mut ingest = DetectionIngest::new(IngestConfig::default());
        let out = ingest.ingest(
            &[
                raw("book", 0.9, [0.1, 0.1, 0.3, 0.3]),
                raw("cup", 0.2, [0.4, 0.4, 0.5, 0.5]),
            ],
            0.0,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "book");
        assert_eq!(ingest.stats().below_floor, 1);
        assert_eq!(ingest.stats().malformed, 0);
    }

    #[test]
    fn test_degenerate_and_malformed_dropped_not_fatal() {
        let mut ingest = DetectionIngest::new(IngestConfig::default());
        let out = ingest.ingest(
            &[
                raw("book", 0.9, [0.3, 0.3, 0.1, 0.5]),     // inverted x
                raw("cup", f32::NAN, [0.1, 0.1, 0.2, 0.2]), // bad confidence
                raw("", 0.8, [0.1, 0.1, 0.2, 0.2]),         // empty label
                raw("table", 0.8, [0.2, 0.2, 0.8, 0.6]),
            ],
            0.0,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "table");
        assert_eq!(ingest.stats().malformed, 3);
    }

    #[test]
    fn test_boxes_clamped_to_unit_square() {
        let mut ingest = DetectionIngest::new(IngestConfig::default());
        let out = ingest.ingest(&[raw("sofa", 0.8, [-0.1, 0.2, 1.3, 0.9])], 0.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.x_min, 0.0);
        assert_eq!(out[0].bbox.x_max, 1.0);
    }

    #[test]
    fn test_box_degenerate_only_after_clamping() {
        // Entirely outside the frame: clamps to a zero-width sliver, dropped.
        let mut ingest = DetectionIngest::new(IngestConfig::default());
        let out = ingest.ingest(&[raw("bird", 0.9, [1.2, 0.1, 1.5, 0.4])], 0.0);
        assert!(out.is_empty());
        assert_eq!(ingest.stats().malformed, 1);
    }

    #[test]
    fn test_object_cap_keeps_highest_confidence() {
        let mut ingest = DetectionIngest::new(IngestConfig {
            max_objects: 2,
            ..IngestConfig::default()
        });
        let out = ingest.ingest(
            &[
                raw("a", 0.5, [0.0, 0.0, 0.1, 0.1]),
                raw("b", 0.9, [0.2, 0.2, 0.3, 0.3]),
                raw("c", 0.7, [0.4, 0.4, 0.5, 0.5]),
            ],
            0.0,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "b");
        assert_eq!(out[1].label, "c");
        assert_eq!(ingest.stats().over_cap, 1);
    }

    #[test]
    fn test_ingest_json_skips_bad_records() {
        let mut ingest = DetectionIngest::new(IngestConfig::default());
        let payload = json!([
            {"class": "book", "confidence": 0.9, "bbox": [0.1, 0.1, 0.3, 0.3]},
            {"class": "cup"},
            "not an object"
        ]);
        let out = ingest.ingest_json(&payload, 5.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp_ms, 5.0);
        assert_eq!(ingest.stats().unparseable, 2);
    }
}
