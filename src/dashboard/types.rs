//! Dashboard types.

use crate::source::Predicate;
use crate::types::{Event, EventId, Viewer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an aggregator.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Re-project on this interval even without new data, so events
    /// move from upcoming to attended as their time passes.
    /// Default: None (time-crossing is picked up on the next delivery)
    pub refresh_interval: Option<Duration>,

    /// Name given to delivery threads.
    pub thread_name: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: None,
            thread_name: "eventboard-delivery".to_string(),
        }
    }
}

/// The live queries a dashboard opens, one per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Events the viewer is registered for.
    Attending,
    /// Events the viewer hosts.
    Hosting,
    /// Events where the viewer sits on the organizing committee.
    Committee,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Attending,
        SourceKind::Hosting,
        SourceKind::Committee,
    ];

    /// The source predicate for this kind and viewer.
    pub fn predicate(self, viewer: &Viewer) -> Predicate {
        match self {
            SourceKind::Attending => Predicate::AttendeesContain(viewer.attendee_id.clone()),
            SourceKind::Hosting => Predicate::HostEquals(viewer.host_id.clone()),
            SourceKind::Committee => Predicate::CommitteeContains(viewer.attendee_id.clone()),
        }
    }
}

/// Latest known state of one live query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Nothing delivered yet.
    Pending,
    /// Last delivery was a result set.
    Live,
    /// Last delivery was an error, or the query could not be opened.
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    pub kind: SourceKind,
    pub status: SourceStatus,
}

/// Dashboard roles, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Hosted,
    Organizing,
    Upcoming,
    Attended,
}

/// Four disjoint views of the merged collection, each ordered by
/// (date, id).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleViews {
    pub hosted: Vec<Event>,
    pub organizing: Vec<Event>,
    pub upcoming: Vec<Event>,
    pub attended: Vec<Event>,
}

/// Per-role totals for the stats summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub hosted: usize,
    pub organizing: usize,
    pub upcoming: usize,
    pub attended: usize,
}

impl RoleViews {
    pub fn get(&self, role: Role) -> &[Event] {
        match role {
            Role::Hosted => &self.hosted,
            Role::Organizing => &self.organizing,
            Role::Upcoming => &self.upcoming,
            Role::Attended => &self.attended,
        }
    }

    /// The single role an event was placed in, if any.
    pub fn role_of(&self, id: &EventId) -> Option<Role> {
        [Role::Hosted, Role::Organizing, Role::Upcoming, Role::Attended]
            .into_iter()
            .find(|role| self.get(*role).iter().any(|e| &e.id == id))
    }

    pub fn ids(&self, role: Role) -> Vec<&str> {
        self.get(role).iter().map(|e| e.id.as_str()).collect()
    }

    pub fn counts(&self) -> RoleCounts {
        RoleCounts {
            hosted: self.hosted.len(),
            organizing: self.organizing.len(),
            upcoming: self.upcoming.len(),
            attended: self.attended.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.hosted.len() + self.organizing.len() + self.upcoming.len() + self.attended.len()
    }
}

/// What a dashboard listener receives after every recomputation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    /// Increments with every published update.
    pub revision: u64,
    /// Every query has delivered (or failed) at least once.
    pub fully_loaded: bool,
    pub views: RoleViews,
    /// Number of events in the merged collection, related to the viewer
    /// or not.
    pub merged: usize,
    pub sources: Vec<SourceState>,
    /// Documents skipped by the last delivery because they failed decode.
    pub rejected: usize,
}

impl DashboardUpdate {
    pub fn status(&self, kind: SourceKind) -> Option<&SourceStatus> {
        self.sources
            .iter()
            .find(|state| state.kind == kind)
            .map(|state| &state.status)
    }

    /// Whether any query is currently failing.
    pub fn has_failures(&self) -> bool {
        self.sources
            .iter()
            .any(|state| matches!(state.status, SourceStatus::Failed { .. }))
    }
}
