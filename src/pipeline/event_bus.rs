// src/pipeline/event_bus.rs
//
// Decoupled lifecycle notifications. The embedding application drains
// these instead of reaching into tracker or engine state.

use crate::relations::RelationKind;
use crate::types::TrackId;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum SceneEvent {
    TrackSpawned {
        frame_id: u64,
        id: TrackId,
        label: String,
    },
    TrackLost {
        frame_id: u64,
        id: TrackId,
        label: String,
        misses: u32,
    },
    RelationshipEstablished {
        frame_id: u64,
        subject: TrackId,
        object: TrackId,
        kind: RelationKind,
    },
    RelationshipRetracted {
        frame_id: u64,
        subject: TrackId,
        object: TrackId,
        kind: RelationKind,
    },
}

pub struct EventBus {
    events: VecDeque<SceneEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: SceneEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawned(frame_id: u64) -> SceneEvent {
        SceneEvent::TrackSpawned {
            frame_id,
            id: frame_id,
            label: "cup".to_string(),
        }
    }

    #[test]
    fn test_drain_empties_bus_in_order() {
        let mut bus = EventBus::new(16);
        bus.publish(spawned(1));
        bus.publish(spawned(2));
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SceneEvent::TrackSpawned { frame_id: 1, .. }));
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut bus = EventBus::new(2);
        bus.publish(spawned(1));
        bus.publish(spawned(2));
        bus.publish(spawned(3));
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SceneEvent::TrackSpawned { frame_id: 2, .. }));
    }
}
