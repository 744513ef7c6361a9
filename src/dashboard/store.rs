//! Merged entity collection.

use crate::types::{Event, EventId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::types::SourceKind;

/// Result of applying one delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub upserted: usize,
    pub evicted: usize,
}

/// Events merged from every live query, keyed by identity.
///
/// Each query's latest result set is remembered so that an event leaves
/// the collection once no query delivers it any more.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<EventId, Event>,
    membership: HashMap<SourceKind, HashSet<EventId>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any prior event with the same identity.
    pub fn upsert(&mut self, event: Event) -> Option<Event> {
        self.entities.insert(event.id.clone(), event)
    }

    /// Apply a complete result set from one query.
    ///
    /// Every delivered event is upserted. Events this query delivered last
    /// time but not now are evicted unless another query still holds them.
    pub fn apply_snapshot(&mut self, kind: SourceKind, events: Vec<Event>) -> ApplyStats {
        let current: HashSet<EventId> = events.iter().map(|e| e.id.clone()).collect();
        let previous = self.membership.insert(kind, current).unwrap_or_default();

        let mut stats = ApplyStats {
            upserted: events.len(),
            evicted: 0,
        };
        for event in events {
            self.upsert(event);
        }

        for id in previous {
            if self.held_by_any(&id) {
                continue;
            }
            if self.entities.remove(&id).is_some() {
                debug!(event = %id, ?kind, "evicted");
                stats.evicted += 1;
            }
        }

        stats
    }

    fn held_by_any(&self, id: &EventId) -> bool {
        self.membership.values().any(|ids| ids.contains(id))
    }

    /// Current identity → event mapping.
    pub fn snapshot(&self) -> &HashMap<EventId, Event> {
        &self.entities
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identities from a query's latest result set.
    pub fn members_of(&self, kind: SourceKind) -> Option<&HashSet<EventId>> {
        self.membership.get(&kind)
    }
}
