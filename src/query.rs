// src/query.rs
//
// Read-only view for the conversation layer. Every call reads the latest
// complete snapshot; nothing here can mutate tracker or inference state.
// Facts are structured tuples; phrasing them is the caller's job.

use crate::relations::{RelationKind, Relationship};
use crate::scene::{SceneModel, SceneSnapshot};
use crate::tracker::TrackedObject;
use crate::types::TrackId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One relationship fact, resolved to labels for downstream phrasing.
#[derive(Debug, Clone, Serialize)]
pub struct SceneFact {
    pub subject_label: String,
    pub kind: RelationKind,
    pub object_label: String,
    pub confidence: f32,
}

/// Aggregate view of the current snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SceneSummary {
    pub version: u64,
    pub timestamp_ms: f64,
    pub total_objects: usize,
    pub label_counts: BTreeMap<String, usize>,
    /// Highest-confidence objects first, capped at five.
    pub most_confident: Vec<(TrackId, String, f32)>,
}

#[derive(Clone)]
pub struct SceneQuery {
    scene: Arc<SceneModel>,
}

impl SceneQuery {
    pub fn new(scene: Arc<SceneModel>) -> Self {
        Self { scene }
    }

    pub fn snapshot(&self) -> Arc<SceneSnapshot> {
        self.scene.current()
    }

    /// All tracked objects, optionally restricted to one class label.
    pub fn find_objects(&self, class_filter: Option<&str>) -> Vec<TrackedObject> {
        let snapshot = self.scene.current();
        snapshot
            .tracks
            .iter()
            .filter(|t| class_filter.map_or(true, |label| t.label == label))
            .cloned()
            .collect()
    }

    /// Every published relationship the track participates in, as subject
    /// or object.
    pub fn relationships_of(&self, track_id: TrackId) -> Vec<Relationship> {
        let snapshot = self.scene.current();
        snapshot
            .relationships
            .iter()
            .filter(|r| r.subject == track_id || r.object == track_id)
            .cloned()
            .collect()
    }

    /// All current facts as (subject, kind, object, confidence) tuples.
    pub fn describe_scene(&self) -> Vec<SceneFact> {
        let snapshot = self.scene.current();
        let labels: BTreeMap<TrackId, &str> = snapshot
            .tracks
            .iter()
            .map(|t| (t.id, t.label.as_str()))
            .collect();

        snapshot
            .relationships
            .iter()
            .filter_map(|r| {
                let subject_label = labels.get(&r.subject)?;
                let object_label = labels.get(&r.object)?;
                Some(SceneFact {
                    subject_label: subject_label.to_string(),
                    kind: r.kind,
                    object_label: object_label.to_string(),
                    confidence: r.confidence,
                })
            })
            .collect()
    }

    /// "Where is the book": each matching object with every fact it
    /// participates in.
    pub fn locate(&self, label: &str) -> Vec<(TrackedObject, Vec<Relationship>)> {
        self.find_objects(Some(label))
            .into_iter()
            .map(|t| {
                let relationships = self.relationships_of(t.id);
                (t, relationships)
            })
            .collect()
    }

    pub fn summary(&self) -> SceneSummary {
        let snapshot = self.scene.current();

        let mut label_counts: BTreeMap<String, usize> = BTreeMap::new();
        for track in &snapshot.tracks {
            *label_counts.entry(track.label.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<(TrackId, String, f32)> = snapshot
            .tracks
            .iter()
            .map(|t| (t.id, t.label.clone(), t.confidence))
            .collect();
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(5);

        SceneSummary {
            version: snapshot.version,
            timestamp_ms: snapshot.timestamp_ms,
            total_objects: snapshot.tracks.len(),
            label_counts,
            most_confident: ranked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn model_with_scene() -> Arc<SceneModel> {
        let model = Arc::new(SceneModel::new());
        let tracks = vec![
            TrackedObject::for_tests(1, "book", BoundingBox::new(0.40, 0.50, 0.60, 0.70), 0.9),
            TrackedObject::for_tests(2, "table", BoundingBox::new(0.30, 0.55, 0.70, 0.60), 0.8),
            TrackedObject::for_tests(3, "cup", BoundingBox::new(0.62, 0.42, 0.72, 0.56), 0.7),
        ];
        let relationships = vec![
            Relationship {
                subject: 1,
                object: 2,
                kind: RelationKind::On,
                confidence: 0.85,
                stable_for: 4,
            },
            Relationship {
                subject: 3,
                object: 2,
                kind: RelationKind::On,
                confidence: 0.74,
                stable_for: 3,
            },
        ];
        model.publish(tracks, relationships, 100.0);
        model
    }

    #[test]
    fn test_find_objects_with_and_without_filter() {
        let query = SceneQuery::new(model_with_scene());
        assert_eq!(query.find_objects(None).len(), 3);
        let books = query.find_objects(Some("book"));
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, 1);
        assert!(query.find_objects(Some("sofa")).is_empty());
    }

    #[test]
    fn test_relationships_of_covers_both_roles() {
        let query = SceneQuery::new(model_with_scene());
        // The table participates in both facts, as object.
        assert_eq!(query.relationships_of(2).len(), 2);
        assert_eq!(query.relationships_of(1).len(), 1);
        assert!(query.relationships_of(99).is_empty());
    }

    #[test]
    fn test_describe_scene_resolves_labels() {
        let query = SceneQuery::new(model_with_scene());
        let facts = query.describe_scene();
        assert!(facts.iter().any(|f| {
            f.subject_label == "book"
                && f.kind == RelationKind::On
                && f.object_label == "table"
                && f.confidence > 0.0
        }));
    }

    #[test]
    fn test_locate_groups_facts_per_object() {
        let query = SceneQuery::new(model_with_scene());
        let located = query.locate("cup");
        assert_eq!(located.len(), 1);
        let (track, relationships) = &located[0];
        assert_eq!(track.id, 3);
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationKind::On);
    }

    #[test]
    fn test_summary_counts_and_ranking() {
        let query = SceneQuery::new(model_with_scene());
        let summary = query.summary();
        assert_eq!(summary.total_objects, 3);
        assert_eq!(summary.label_counts["book"], 1);
        assert_eq!(summary.most_confident[0].1, "book");
        assert_eq!(summary.version, 1);
    }

    #[test]
    fn test_empty_scene_answers_cleanly() {
        let query = SceneQuery::new(Arc::new(SceneModel::new()));
        assert!(query.find_objects(None).is_empty());
        assert!(query.describe_scene().is_empty());
        assert_eq!(query.summary().total_objects, 0);
    }
}
