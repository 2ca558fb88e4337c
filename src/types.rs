// src/types.rs

use serde::{Deserialize, Serialize};

/// Persistent identity of a tracked object. Allocated monotonically by the
/// tracker and never reused while the process runs.
pub type TrackId = u64;

/// Axis-aligned bounding box in normalized [0,1] image coordinates,
/// origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) * 0.5,
            (self.y_min + self.y_max) * 0.5,
        )
    }

    pub fn diagonal(&self) -> f32 {
        (self.width().powi(2) + self.height().powi(2)).sqrt()
    }

    /// Clamp all coordinates into the unit square.
    pub fn clamp_unit(&self) -> Self {
        Self {
            x_min: self.x_min.clamp(0.0, 1.0),
            y_min: self.y_min.clamp(0.0, 1.0),
            x_max: self.x_max.clamp(0.0, 1.0),
            y_max: self.y_max.clamp(0.0, 1.0),
        }
    }

    /// A box with non-finite coordinates or zero/negative extent carries no
    /// usable geometry.
    pub fn is_degenerate(&self) -> bool {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return true;
        }
        self.x_max <= self.x_min || self.y_max <= self.y_min
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Overlap of the horizontal extents as a fraction of the narrower box.
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f32 {
        let overlap = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
        let base = self.width().min(other.width());
        if base > 0.0 {
            overlap / base
        } else {
            0.0
        }
    }

    /// Overlap of the vertical extents as a fraction of the shorter box.
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        let overlap = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
        let base = self.height().min(other.height());
        if base > 0.0 {
            overlap / base
        } else {
            0.0
        }
    }

    /// Fully contained in `other`, allowing `margin` of slack on every edge.
    pub fn contained_in(&self, other: &BoundingBox, margin: f32) -> bool {
        self.x_min >= other.x_min - margin
            && self.y_min >= other.y_min - margin
            && self.x_max <= other.x_max + margin
            && self.y_max <= other.y_max + margin
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Canonical per-frame detection record. Produced by `DetectionIngest` from
/// raw detector output; everything downstream operates on this typed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub timestamp_ms: f64,
}

/// Loosely-typed detection as emitted by the external detector. `bbox` is
/// `[x_min, y_min, x_max, y_max]`; extra fields (center, area, class ids)
/// are ignored. Validation happens in `DetectionIngest`, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "class")]
    pub label: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl RawDetection {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.bbox[0], self.bbox[1], self.bbox[2], self.bbox[3])
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub tracker: TrackerConfig,
    pub relations: RelationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Detections below this confidence are dropped before tracking.
    pub confidence_floor: f32,
    /// Hard cap on detections per frame; highest-confidence kept first.
    pub max_objects: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.35,
            max_objects: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU to match a detection to an existing track.
    pub iou_match_threshold: f32,
    /// Consecutive missed frames a track survives; evicted once exceeded.
    pub miss_threshold: u32,
    /// Ring-buffer length of per-track box history (velocity estimation).
    pub history_len: usize,
    /// Exponential smoothing weight toward the new box / confidence.
    pub smoothing_alpha: f32,
    /// Same-label track pairs above this IoU are flagged as duplicate
    /// detections of one physical object.
    pub duplicate_iou: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_match_threshold: 0.3,
            miss_threshold: 5,
            history_len: 10,
            smoothing_alpha: 0.6,
            duplicate_iou: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Max air gap between a subject's bottom edge and a surface's top edge
    /// for "on".
    pub on_tolerance: f32,
    /// Minimum horizontal-center separation for left-of / right-of.
    pub horizontal_tolerance: f32,
    /// Minimum extent overlap (fraction of the smaller box) required by the
    /// directional kinds.
    pub axis_overlap_min: f32,
    /// Slack allowed on every edge for "inside" containment.
    pub inside_margin: f32,
    /// Base center-distance radius for "next-to"; widened to the larger
    /// object's diagonal when that is bigger.
    pub proximity_radius: f32,
    /// Consecutive cycles a candidate must hold before publication.
    pub stability_window: u32,
    /// Consecutive failed cycles before a published relationship is retracted.
    pub miss_window: u32,
    /// Pairs above this IoU are duplicate detections, never related.
    pub duplicate_iou: f32,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            on_tolerance: 0.03,
            horizontal_tolerance: 0.05,
            axis_overlap_min: 0.3,
            inside_margin: 0.01,
            proximity_radius: 0.15,
            stability_window: 3,
            miss_window: 2,
            duplicate_iou: 0.9,
        }
    }
}
