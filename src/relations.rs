// src/relations.rs
//
// Qualitative spatial relationships between tracked objects.
//
// Per ordered pair of tracks, the geometry classifies into at most one
// candidate kind (priority: on > inside > above/below > left-of/right-of >
// next-to), so a pair can never carry contradictory claims. A candidate is
// only published after holding for stability_window consecutive cycles, and
// a published relationship is only retracted after miss_window consecutive
// failing cycles. Same hysteresis shape as the tracker's miss counter,
// applied to relationship flicker instead of detection flicker.

use crate::tracker::TrackedObject;
use crate::types::{RelationConfig, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    On,
    Inside,
    Above,
    Below,
    LeftOf,
    RightOf,
    NextTo,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Inside => "inside",
            Self::Above => "above",
            Self::Below => "below",
            Self::LeftOf => "left-of",
            Self::RightOf => "right-of",
            Self::NextTo => "next-to",
        }
    }
}

/// A published spatial fact: subject `kind` object.
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub subject: TrackId,
    pub object: TrackId,
    pub kind: RelationKind,
    pub confidence: f32,
    /// Consecutive inference cycles this relationship has held.
    pub stable_for: u32,
}

/// Promotion/retraction notifications for the pipeline event bus.
#[derive(Debug, Clone)]
pub enum RelationLifecycle {
    Established {
        subject: TrackId,
        object: TrackId,
        kind: RelationKind,
    },
    Retracted {
        subject: TrackId,
        object: TrackId,
        kind: RelationKind,
    },
}

/// Classify the geometry of one ordered pair into at most one kind.
///
/// "On" accepts both a small air gap (subject bottom within `on_tolerance`
/// above the object's top edge) and interpenetration: detector boxes of a
/// resting object routinely extend past the supporting surface's top edge,
/// so the test is bottom-at-or-below-the-top-edge with the subject's top
/// still above it, horizontally centered over the surface.
pub(crate) fn classify_pair(
    a_bbox: &crate::types::BoundingBox,
    a_label: &str,
    b_bbox: &crate::types::BoundingBox,
    b_label: &str,
    config: &RelationConfig,
) -> Option<RelationKind> {
    let (acx, _) = a_bbox.center();

    let rests_on = a_bbox.y_max >= b_bbox.y_min - config.on_tolerance
        && a_bbox.y_min < b_bbox.y_min
        && acx >= b_bbox.x_min
        && acx <= b_bbox.x_max;
    // Identical classes only stack when the boxes are vertically disjoint;
    // overlapping same-class boxes are far more likely one flickering object
    // than a "chair on chair" arrangement.
    let vertically_disjoint = a_bbox.y_max <= b_bbox.y_min || a_bbox.y_min >= b_bbox.y_max;
    if rests_on && (a_label != b_label || vertically_disjoint) {
        return Some(RelationKind::On);
    }

    if a_bbox.contained_in(b_bbox, config.inside_margin) {
        return Some(RelationKind::Inside);
    }

    if a_bbox.horizontal_overlap(b_bbox) > config.axis_overlap_min {
        if a_bbox.y_max < b_bbox.y_min - config.on_tolerance {
            return Some(RelationKind::Above);
        }
        if a_bbox.y_min > b_bbox.y_max + config.on_tolerance {
            return Some(RelationKind::Below);
        }
    }

    if a_bbox.vertical_overlap(b_bbox) > config.axis_overlap_min {
        let (bcx, _) = b_bbox.center();
        if (acx - bcx).abs() > config.horizontal_tolerance {
            return Some(if acx < bcx {
                RelationKind::LeftOf
            } else {
                RelationKind::RightOf
            });
        }
    }

    // Proximity radius widens for large objects: two touching sofas have
    // distant centers but are still "next to" each other.
    let radius = config
        .proximity_radius
        .max(a_bbox.diagonal().max(b_bbox.diagonal()));
    if a_bbox.center_distance(b_bbox) <= radius {
        return Some(RelationKind::NextTo);
    }

    None
}

#[derive(Debug, Default)]
struct PairState {
    published: Option<RelationKind>,
    /// Kind currently accumulating toward promotion, with its streak.
    candidate: Option<(RelationKind, u32)>,
    /// Consecutive cycles the published kind has failed to hold.
    misses: u32,
    /// Consecutive cycles the published kind has held (frozen during the
    /// tolerated miss cycles).
    stable_for: u32,
}

impl PairState {
    fn is_idle(&self) -> bool {
        self.published.is_none() && self.candidate.is_none()
    }
}

pub struct RelationshipEngine {
    config: RelationConfig,
    pairs: HashMap<(TrackId, TrackId), PairState>,
    lifecycle: Vec<RelationLifecycle>,
}

impl RelationshipEngine {
    pub fn new(config: RelationConfig) -> Self {
        Self {
            config,
            pairs: HashMap::new(),
            lifecycle: Vec::new(),
        }
    }

    /// Run one inference cycle over the active track set and return the
    /// published relationship set. Promotion/retraction state is engine
    /// internal; callers see only stable relationships.
    pub fn infer(&mut self, tracks: &[TrackedObject]) -> Vec<Relationship> {
        // Forget pairs whose participants left the scene.
        let live: HashMap<TrackId, &TrackedObject> = tracks.iter().map(|t| (t.id, t)).collect();
        self.pairs
            .retain(|(s, o), _| live.contains_key(s) && live.contains_key(o));

        for a in tracks {
            for b in tracks {
                if a.id == b.id {
                    continue;
                }

                // Near-identical boxes are duplicate detections of one
                // object, not two related objects; the tracker carries the
                // diagnostic counter for these.
                let geometry = if a.bbox.iou(&b.bbox) > self.config.duplicate_iou {
                    None
                } else {
                    classify_pair(&a.bbox, &a.label, &b.bbox, &b.label, &self.config)
                };

                self.step_pair(a.id, b.id, geometry);
            }
        }

        self.pairs.retain(|_, state| !state.is_idle());

        let mut published: Vec<Relationship> = Vec::new();
        for ((subject, object), state) in &self.pairs {
            let kind = match state.published {
                Some(kind) => kind,
                None => continue,
            };
            let (sub, obj) = match (live.get(subject), live.get(object)) {
                (Some(s), Some(o)) => (s, o),
                _ => continue,
            };
            let stability = (state.stable_for as f32 / self.config.stability_window as f32).min(1.0);
            published.push(Relationship {
                subject: *subject,
                object: *object,
                kind,
                confidence: harmonic_mean(sub.confidence, obj.confidence) * stability,
                stable_for: state.stable_for,
            });
        }
        published.sort_by(|a, b| (a.subject, a.object).cmp(&(b.subject, b.object)));
        published
    }

    /// Advance one pair's hysteresis state by one cycle.
    fn step_pair(&mut self, subject: TrackId, object: TrackId, geometry: Option<RelationKind>) {
        let stability_window = self.config.stability_window;
        let miss_window = self.config.miss_window;
        let state = self.pairs.entry((subject, object)).or_default();

        match state.published {
            Some(current) if geometry == Some(current) => {
                state.misses = 0;
                state.stable_for += 1;
                state.candidate = None;
            }
            Some(current) => {
                state.misses += 1;

                let promoted = advance_candidate(&mut state.candidate, geometry, stability_window);
                if let Some(kind) = promoted {
                    debug!(
                        "Relationship ({} -> {}) replaced: {} -> {}",
                        subject,
                        object,
                        current.as_str(),
                        kind.as_str()
                    );
                    self.lifecycle.push(RelationLifecycle::Retracted {
                        subject,
                        object,
                        kind: current,
                    });
                    self.lifecycle.push(RelationLifecycle::Established {
                        subject,
                        object,
                        kind,
                    });
                    state.published = Some(kind);
                    state.stable_for = stability_window;
                    state.misses = 0;
                    state.candidate = None;
                } else if state.misses >= miss_window {
                    info!(
                        "Relationship retracted: {} {} {} (failed {} cycles)",
                        subject,
                        current.as_str(),
                        object,
                        state.misses
                    );
                    self.lifecycle.push(RelationLifecycle::Retracted {
                        subject,
                        object,
                        kind: current,
                    });
                    state.published = None;
                    state.stable_for = 0;
                    state.misses = 0;
                }
            }
            None => {
                let promoted = advance_candidate(&mut state.candidate, geometry, stability_window);
                if let Some(kind) = promoted {
                    info!(
                        "Relationship established: {} {} {}",
                        subject,
                        kind.as_str(),
                        object
                    );
                    self.lifecycle.push(RelationLifecycle::Established {
                        subject,
                        object,
                        kind,
                    });
                    state.published = Some(kind);
                    state.stable_for = stability_window;
                    state.candidate = None;
                }
            }
        }
    }

    pub fn drain_lifecycle(&mut self) -> Vec<RelationLifecycle> {
        std::mem::take(&mut self.lifecycle)
    }
}

/// Feed one cycle's geometry into the candidate streak. Returns the kind to
/// promote once the streak reaches the stability window, exactly on that
/// cycle and never later.
fn advance_candidate(
    candidate: &mut Option<(RelationKind, u32)>,
    geometry: Option<RelationKind>,
    stability_window: u32,
) -> Option<RelationKind> {
    match geometry {
        None => {
            *candidate = None;
            None
        }
        Some(kind) => {
            let streak = match candidate {
                Some((current, streak)) if *current == kind => {
                    *streak += 1;
                    *streak
                }
                _ => {
                    *candidate = Some((kind, 1));
                    1
                }
            };
            if streak >= stability_window {
                Some(kind)
            } else {
                None
            }
        }
    }
}

fn harmonic_mean(a: f32, b: f32) -> f32 {
    if a + b > 0.0 {
        2.0 * a * b / (a + b)
    } else {
        0.0
    }
}
