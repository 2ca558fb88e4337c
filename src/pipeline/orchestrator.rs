// src/pipeline/orchestrator.rs
//
// Drives ingest → track → infer → publish once per frame, sequentially:
// each stage depends on the state the previous frame left behind, so
// frames are never processed in parallel. Consumers hold the SceneModel
// (or a SceneQuery) and read snapshots without ever blocking this loop.

use crate::ingest::DetectionIngest;
use crate::pipeline::event_bus::{EventBus, SceneEvent};
use crate::pipeline::metrics::SceneMetrics;
use crate::query::SceneQuery;
use crate::relations::{RelationLifecycle, RelationshipEngine};
use crate::scene::{SceneModel, SceneSnapshot};
use crate::source::DetectionSource;
use crate::tracker::{SceneTracker, TrackLifecycle};
use crate::types::{Config, Detection, RawDetection};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const MAX_PENDING_EVENTS: usize = 256;

pub struct ScenePipeline {
    ingest: DetectionIngest,
    tracker: SceneTracker,
    engine: RelationshipEngine,
    scene: Arc<SceneModel>,
    events: EventBus,
    metrics: SceneMetrics,
    frame_id: u64,
    last_source_frame: Option<u64>,
}

impl ScenePipeline {
    pub fn new(config: Config) -> Self {
        Self {
            ingest: DetectionIngest::new(config.ingest),
            tracker: SceneTracker::new(config.tracker),
            engine: RelationshipEngine::new(config.relations),
            scene: Arc::new(SceneModel::new()),
            events: EventBus::new(MAX_PENDING_EVENTS),
            metrics: SceneMetrics::new(),
            frame_id: 0,
            last_source_frame: None,
        }
    }

    /// Shared handle for snapshot readers.
    pub fn scene(&self) -> Arc<SceneModel> {
        Arc::clone(&self.scene)
    }

    pub fn query(&self) -> SceneQuery {
        SceneQuery::new(self.scene())
    }

    pub fn metrics(&self) -> SceneMetrics {
        self.metrics.clone()
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain()
    }

    /// Process one frame of raw detections and publish the snapshot.
    /// Malformed detections are dropped inside ingest; nothing here fails.
    pub fn process_frame(
        &mut self,
        raw: &[RawDetection],
        timestamp_ms: f64,
    ) -> Arc<SceneSnapshot> {
        let detections = self.ingest.ingest(raw, timestamp_ms);
        self.advance(detections, timestamp_ms)
    }

    /// Same as `process_frame`, straight from an untyped JSON payload.
    pub fn process_json_frame(&mut self, payload: &Value, timestamp_ms: f64) -> Arc<SceneSnapshot> {
        let detections = self.ingest.ingest_json(payload, timestamp_ms);
        self.advance(detections, timestamp_ms)
    }

    fn advance(&mut self, detections: Vec<Detection>, timestamp_ms: f64) -> Arc<SceneSnapshot> {
        self.frame_id += 1;

        self.metrics
            .add(&self.metrics.detections_accepted, detections.len() as u64);
        let ingest_stats = self.ingest.stats();
        self.metrics.set(
            &self.metrics.detections_rejected,
            ingest_stats.malformed
                + ingest_stats.below_floor
                + ingest_stats.over_cap
                + ingest_stats.unparseable,
        );

        let track_start = Instant::now();
        let tracks = self.tracker.update(&detections, timestamp_ms);
        self.metrics.set(
            &self.metrics.track_time_us,
            track_start.elapsed().as_micros() as u64,
        );
        self.metrics
            .set(&self.metrics.duplicate_pairs, self.tracker.duplicate_pairs());

        for event in self.tracker.drain_lifecycle() {
            match event {
                TrackLifecycle::Spawned { id, label } => {
                    self.metrics.inc(&self.metrics.tracks_spawned);
                    self.events.publish(SceneEvent::TrackSpawned {
                        frame_id: self.frame_id,
                        id,
                        label,
                    });
                }
                TrackLifecycle::Lost { id, label, misses } => {
                    self.metrics.inc(&self.metrics.tracks_lost);
                    self.events.publish(SceneEvent::TrackLost {
                        frame_id: self.frame_id,
                        id,
                        label,
                        misses,
                    });
                }
            }
        }

        let infer_start = Instant::now();
        let relationships = self.engine.infer(&tracks);
        self.metrics.set(
            &self.metrics.infer_time_us,
            infer_start.elapsed().as_micros() as u64,
        );

        for event in self.engine.drain_lifecycle() {
            match event {
                RelationLifecycle::Established {
                    subject,
                    object,
                    kind,
                } => {
                    self.metrics.inc(&self.metrics.relationships_established);
                    self.events.publish(SceneEvent::RelationshipEstablished {
                        frame_id: self.frame_id,
                        subject,
                        object,
                        kind,
                    });
                }
                RelationLifecycle::Retracted {
                    subject,
                    object,
                    kind,
                } => {
                    self.metrics.inc(&self.metrics.relationships_retracted);
                    self.events.publish(SceneEvent::RelationshipRetracted {
                        frame_id: self.frame_id,
                        subject,
                        object,
                        kind,
                    });
                }
            }
        }

        let snapshot = self.scene.publish(tracks, relationships, timestamp_ms);
        self.metrics.inc(&self.metrics.frames_processed);
        debug!(
            "Frame {} published: snapshot v{} with {} track(s), {} relationship(s)",
            self.frame_id,
            snapshot.version,
            snapshot.tracks.len(),
            snapshot.relationships.len()
        );
        snapshot
    }

    /// Consume a detection source until it ends or becomes unavailable.
    /// A source error is the pipeline-halt signal and propagates to the
    /// caller; per-frame data problems never do. Returns frames processed.
    pub fn run(&mut self, source: &mut dyn DetectionSource) -> Result<u64> {
        let mut processed = 0u64;
        loop {
            let frame = source
                .next_frame()
                .context("detection source unavailable")?;
            let frame = match frame {
                Some(frame) => frame,
                None => break,
            };

            // Sources favor recency over completeness; account for frames
            // they skipped instead of queueing.
            if let Some(last) = self.last_source_frame {
                if frame.frame_id > last + 1 {
                    self.metrics
                        .add(&self.metrics.frames_dropped, frame.frame_id - last - 1);
                }
            }
            self.last_source_frame = Some(frame.frame_id);

            self.process_frame(&frame.detections, frame.timestamp_ms);
            processed += 1;
        }
        info!("Detection source drained after {} frame(s)", processed);
        Ok(processed)
    }
}
