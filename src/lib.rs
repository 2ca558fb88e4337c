// src/lib.rs
//
// Spatial reasoning core: turns a stream of per-frame object detections
// into a stable, queryable model of the scene.
//
// Signal flow:
//   Raw detections → ingest (validate/filter) → tracker (persistent ids)
//     → relations (stable spatial facts) → scene (published snapshot)
//     → query (read-only consumer, e.g. a conversation layer)
//
// Orchestrated per frame by pipeline::ScenePipeline. Detection itself,
// depth estimation, and language generation live outside this crate.

mod config;
pub mod ingest;
pub mod pipeline;
pub mod query;
pub mod relations;
pub mod scene;
pub mod source;
pub mod tracker;
pub mod types;

// Re-exports for ergonomic access from embedding applications.
pub use ingest::{DetectionIngest, IngestStats};
pub use pipeline::{EventBus, MetricsSummary, SceneEvent, SceneMetrics, ScenePipeline};
pub use query::{SceneFact, SceneQuery, SceneSummary};
pub use relations::{RelationKind, Relationship, RelationshipEngine};
pub use scene::{SceneModel, SceneSnapshot};
pub use source::{find_dump_files, DetectionSource, FrameDetections, ReplaySource};
pub use tracker::{SceneTracker, TrackedObject};
pub use types::{BoundingBox, Config, Detection, RawDetection, TrackId};
